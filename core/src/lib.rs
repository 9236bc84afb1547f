//! # autoscan-core
//!
//! The reconciliation engine of the auto-discovery controller.
//!
//! Leaf-first:
//! * [`inclusion`] and [`template`]: pure building blocks;
//! * [`policy`] and [`desired`]: the compiled policy and what it asks for, per target;
//! * [`scheduler`]: the per-pair state machine;
//! * [`reconciler`]: one pass over one work key, through the [`cluster`] ports;
//! * [`cache`], [`queue`] and [`controller`]: event intake, workers and requeues.

pub mod cache;
pub mod clock;
pub mod cluster;
pub mod controller;
pub mod desired;
pub mod inclusion;
pub mod policy;
pub mod queue;
pub mod reconciler;
pub mod scheduler;
pub mod template;
pub mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::Controller;
pub use policy::Policy;
