//! Observed cluster state and the records the controller persists back into it.

pub mod event;
pub mod resources;
pub mod scan_job;
pub mod target;

pub use event::ClusterEvent;
pub use resources::{
    ClusterSnapshot, ContainerStatus, Namespace, ObjectMeta, Pod, PodPhase, Protocol, Service,
    ServicePort,
};
pub use scan_job::{
    DesiredScanSpec, MANAGED_BY_LABEL, MANAGED_BY_VALUE, ScanJob, TARGET_KIND_LABEL,
};
pub use target::{ContainerTarget, OwnerRef, PodInfo, ServiceTarget, Target, TargetKind, TargetRef};
