//! Change notifications delivered by the cluster-state collaborator.

use super::resources::{ClusterSnapshot, Namespace, Pod, Service};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEvent {
    NamespaceApplied(Namespace),
    NamespaceDeleted { name: String },
    ServiceApplied(Service),
    ServiceDeleted { namespace: String, name: String },
    PodApplied(Pod),
    PodDeleted { namespace: String, name: String },
}

impl ClusterEvent {
    pub fn namespace(&self) -> &str {
        match self {
            ClusterEvent::NamespaceApplied(ns) => ns.name(),
            ClusterEvent::NamespaceDeleted { name } => name,
            ClusterEvent::ServiceApplied(svc) => &svc.metadata.namespace,
            ClusterEvent::ServiceDeleted { namespace, .. } => namespace,
            ClusterEvent::PodApplied(pod) => &pod.metadata.namespace,
            ClusterEvent::PodDeleted { namespace, .. } => namespace,
        }
    }
}

impl ClusterSnapshot {
    /// Replays the snapshot as the initial list of a watch: namespaces first.
    pub fn into_events(self) -> Vec<ClusterEvent> {
        let mut events: Vec<ClusterEvent> = Vec::new();
        events.extend(self.namespaces.into_iter().map(ClusterEvent::NamespaceApplied));
        events.extend(self.services.into_iter().map(ClusterEvent::ServiceApplied));
        events.extend(self.pods.into_iter().map(ClusterEvent::PodApplied));
        events
    }
}
