//! In-process bookkeeping of every tracked *(target, scan type)* pair.
//!
//! The tracker is observational only: decisions are always taken from the live scan jobs, never
//! from here.

use std::collections::BTreeMap;
use std::sync::Mutex;

use autoscan_common::cluster::{OwnerRef, TargetRef};
use chrono::{DateTime, Utc};

use crate::scheduler::PairState;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    pub target: TargetRef,
    pub scan_type: String,
}

impl PairKey {
    pub fn new(target: TargetRef, scan_type: impl Into<String>) -> Self {
        Self {
            target,
            scan_type: scan_type.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairStatus {
    /// State observed before the last transition.
    pub observed: PairState,
    /// Trigger time after the last transition, if the job exists.
    pub last_triggered: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

#[derive(Debug, Default)]
pub struct ScheduleTracker {
    pairs: Mutex<BTreeMap<PairKey, PairStatus>>,
}

impl ScheduleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(
        &self,
        key: PairKey,
        observed: PairState,
        last_triggered: DateTime<Utc>,
    ) {
        self.lock().insert(
            key,
            PairStatus {
                observed,
                last_triggered: Some(last_triggered),
                last_error: None,
                consecutive_failures: 0,
            },
        );
    }

    pub fn record_failure(&self, key: PairKey, observed: PairState, error: String) {
        let mut pairs = self.lock();
        let status = pairs.entry(key).or_insert(PairStatus {
            observed,
            last_triggered: None,
            last_error: None,
            consecutive_failures: 0,
        });
        status.observed = observed;
        status.last_error = Some(error);
        status.consecutive_failures = status.consecutive_failures.saturating_add(1);
    }

    pub fn forget(&self, key: &PairKey) {
        self.lock().remove(key);
    }

    /// Drops every pair of `owner`, used when the owning resource is gone.
    pub fn forget_owner(&self, owner: &OwnerRef) {
        self.lock().retain(|key, _| &key.target.owner != owner);
    }

    pub fn get(&self, key: &PairKey) -> Option<PairStatus> {
        self.lock().get(key).cloned()
    }

    pub fn snapshot(&self) -> Vec<(PairKey, PairStatus)> {
        self.lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<PairKey, PairStatus>> {
        self.pairs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
