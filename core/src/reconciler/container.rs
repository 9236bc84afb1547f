//! Container targets: one per image running in a namespace.
//!
//! There is no passive recheck. The repeat interval is checked opportunistically whenever an
//! event touches the image.

use std::time::Duration;

use autoscan_common::cluster::TargetKind;

use super::TargetBinding;
use crate::cache::Resolved;
use crate::policy::Policy;

pub struct ContainerBinding;

impl TargetBinding for ContainerBinding {
    const KIND: TargetKind = TargetKind::Container;

    fn resync_after(_policy: &Policy, _resolved: &Resolved) -> Option<Duration> {
        None
    }
}
