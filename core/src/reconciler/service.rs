//! Service targets: one per TCP port, rechecked every passive reconcile interval.

use std::time::Duration;

use autoscan_common::cluster::TargetKind;

use super::TargetBinding;
use crate::cache::Resolved;
use crate::policy::Policy;

pub struct ServiceBinding;

impl TargetBinding for ServiceBinding {
    const KIND: TargetKind = TargetKind::Service;

    /// Existing services come back after the passive interval, deleted ones never do.
    fn resync_after(policy: &Policy, resolved: &Resolved) -> Option<Duration> {
        if resolved.targets.is_empty() {
            None
        } else {
            Some(policy.passive_reconcile_interval())
        }
    }
}
