//! # Cluster Cache
//!
//! The controller's local view of the observed resources. It is fed by [`ClusterEvent`]s and
//! answers two questions:
//!
//! 1. **Which work keys does this event touch?** ([`ClusterCache::apply`])
//! 2. **What are the current targets of this key?** ([`ClusterCache::resolve`])
//!
//! A work key is an [`OwnerRef`]: a service for service targets, an image id within a
//! namespace for container targets.

use std::collections::{BTreeMap, BTreeSet};

use autoscan_common::cluster::{
    ClusterEvent, ContainerTarget, Namespace, OwnerRef, Pod, PodInfo, Protocol, Service,
    ServiceTarget, Target, TargetKind,
};

type ObjectKey = (String, String);

/// Everything a reconcile pass needs to know about one key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolved {
    pub namespace: Option<Namespace>,
    /// Empty when the owning resource is gone.
    pub targets: Vec<Target>,
}

#[derive(Debug, Default)]
pub struct ClusterCache {
    namespaces: BTreeMap<String, Namespace>,
    services: BTreeMap<ObjectKey, Service>,
    pods: BTreeMap<ObjectKey, Pod>,
}

impl ClusterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one change and returns the keys whose targets may have changed.
    pub fn apply(&mut self, event: ClusterEvent) -> Vec<OwnerRef> {
        match event {
            ClusterEvent::NamespaceApplied(ns) => {
                let name: String = ns.name().to_string();
                self.namespaces.insert(name.clone(), ns);
                self.keys_in_namespace(&name)
            }
            ClusterEvent::NamespaceDeleted { name } => {
                self.namespaces.remove(&name);
                self.keys_in_namespace(&name)
            }
            ClusterEvent::ServiceApplied(svc) => {
                let owner = OwnerRef::service(&svc.metadata.namespace, &svc.metadata.name);
                self.services.insert(object_key(&owner), svc);
                vec![owner]
            }
            ClusterEvent::ServiceDeleted { namespace, name } => {
                self.services.remove(&(namespace.clone(), name.clone()));
                vec![OwnerRef::service(namespace, name)]
            }
            ClusterEvent::PodApplied(pod) => {
                let key: ObjectKey = (pod.metadata.namespace.clone(), pod.metadata.name.clone());
                let mut keys: BTreeSet<OwnerRef> = image_keys(&pod).collect();
                if let Some(previous) = self.pods.insert(key, pod) {
                    keys.extend(image_keys(&previous));
                }
                keys.into_iter().collect()
            }
            ClusterEvent::PodDeleted { namespace, name } => {
                let Some(previous) = self.pods.remove(&(namespace, name)) else {
                    return Vec::new();
                };
                let keys: BTreeSet<OwnerRef> = image_keys(&previous).collect();
                keys.into_iter().collect()
            }
        }
    }

    /// Every key currently known, services first.
    pub fn keys(&self) -> Vec<OwnerRef> {
        let mut keys: Vec<OwnerRef> = self
            .services
            .keys()
            .map(|(ns, name)| OwnerRef::service(ns, name))
            .collect();
        let images: BTreeSet<OwnerRef> = self.pods.values().flat_map(image_keys).collect();
        keys.extend(images);
        keys
    }

    pub fn namespace(&self, name: &str) -> Option<&Namespace> {
        self.namespaces.get(name)
    }

    pub fn resolve(&self, owner: &OwnerRef) -> Resolved {
        let targets: Vec<Target> = match owner.kind {
            TargetKind::Service => self
                .service_targets(owner)
                .into_iter()
                .map(Target::Service)
                .collect(),
            TargetKind::Container => self
                .container_target(owner)
                .map(Target::Container)
                .into_iter()
                .collect(),
        };
        Resolved {
            namespace: self.namespaces.get(&owner.namespace).cloned(),
            targets,
        }
    }

    /// One target per TCP port of the service.
    fn service_targets(&self, owner: &OwnerRef) -> Vec<ServiceTarget> {
        let Some(svc) = self.services.get(&object_key(owner)) else {
            return Vec::new();
        };
        svc.ports
            .iter()
            .filter(|port| port.protocol == Protocol::Tcp)
            .map(|port| ServiceTarget::from_service(svc, port))
            .collect()
    }

    /// The image `owner.name` as run by the running pods of `owner.namespace`.
    fn container_target(&self, owner: &OwnerRef) -> Option<ContainerTarget> {
        let mut target: Option<ContainerTarget> = None;

        let running = self
            .pods
            .range((owner.namespace.clone(), String::new())..)
            .take_while(|((ns, _), _)| *ns == owner.namespace)
            .map(|(_, pod)| pod)
            .filter(|pod| pod.is_running());

        for pod in running {
            let Some((container, _)) = pod
                .started_containers()
                .find(|(_, image_id)| *image_id == owner.name)
            else {
                continue;
            };
            let info = PodInfo {
                name: pod.metadata.name.clone(),
                annotations: pod.metadata.annotations.clone(),
            };
            match target.as_mut() {
                Some(existing) => existing.pods.push(info),
                None => {
                    target = Some(ContainerTarget {
                        namespace: owner.namespace.clone(),
                        container_name: container.name.clone(),
                        image: container.image.clone(),
                        image_id: owner.name.clone(),
                        pods: vec![info],
                    })
                }
            }
        }

        target
    }

    fn keys_in_namespace(&self, namespace: &str) -> Vec<OwnerRef> {
        self.keys()
            .into_iter()
            .filter(|key| key.namespace == namespace)
            .collect()
    }
}

fn object_key(owner: &OwnerRef) -> ObjectKey {
    (owner.namespace.clone(), owner.name.clone())
}

fn image_keys(pod: &Pod) -> impl Iterator<Item = OwnerRef> + '_ {
    pod.started_containers()
        .map(|(_, image_id)| OwnerRef::container(&pod.metadata.namespace, image_id))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
