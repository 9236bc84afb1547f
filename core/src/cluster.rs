//! # Cluster Ports
//!
//! The engine never talks to a cluster directly. It goes through two **ports**:
//!
//! * [`ScanJobClient`]: list / create / update / delete of scan jobs;
//! * [`EventRecorder`]: human-facing events attached to a target.
//!
//! [`memory::InMemoryCluster`] implements both for tests and offline runs. Every mutation
//! issued by the reconcilers goes through [`retry::MutationExecutor`].

use std::fmt;

use async_trait::async_trait;
use autoscan_common::cluster::{OwnerRef, ScanJob};
use autoscan_common::error::ClientError;
use chrono::{DateTime, Utc};

pub mod memory;
pub mod retry;

pub use memory::InMemoryCluster;
pub use retry::MutationExecutor;

#[async_trait]
pub trait ScanJobClient: Send + Sync {
    /// Every live job owned by `owner`, in no particular order.
    async fn list_owned(&self, owner: &OwnerRef) -> Result<Vec<ScanJob>, ClientError>;

    /// Fails with [`ClientError::Conflict`] if a job with the same key already exists.
    async fn create(&self, job: &ScanJob) -> Result<(), ClientError>;

    async fn update(&self, job: &ScanJob) -> Result<(), ClientError>;

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), ClientError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Normal => f.write_str("Normal"),
            EventType::Warning => f.write_str("Warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub owner: OwnerRef,
    pub event_type: EventType,
    /// Short CamelCase reason, e.g. `ScanJobCreated`.
    pub reason: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, event: Event);
}

/// Reasons attached to recorded events.
pub mod reason {
    pub const CREATED: &str = "ScanJobCreated";
    pub const UPDATED: &str = "ScanJobUpdated";
    pub const RETRIGGERED: &str = "ScanJobRetriggered";
    pub const DELETED: &str = "ScanJobDeleted";
    pub const MUTATION_FAILED: &str = "ScanJobMutationFailed";
    pub const TEMPLATE_FAILED: &str = "TemplateRenderFailed";
    pub const LIST_FAILED: &str = "ScanJobListFailed";
}
