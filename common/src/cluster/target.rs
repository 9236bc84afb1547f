//! # Scan Targets
//!
//! A **target** is one concrete thing a scan can point at:
//! * a **service port** (`default/web:80`), or
//! * a **container image** running in a namespace (`ns1/sha256:...`).
//!
//! Targets are derived from observed resources and are never persisted. The resource that
//! produced them (service, or image within a namespace) is their [`OwnerRef`] and owns the
//! scan jobs created for them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::resources::{Service, ServicePort};
use crate::utils::naming;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Service,
    Container,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Service => f.write_str("service"),
            TargetKind::Container => f.write_str("container"),
        }
    }
}

/// The resource owning a set of targets, and the unit of work of a reconcile pass.
///
/// `name` is the service name for services and the image id for containers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: TargetKind,
    pub namespace: String,
    pub name: String,
}

impl OwnerRef {
    pub fn service(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::Service,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn container(namespace: impl Into<String>, image_id: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::Container,
            namespace: namespace.into(),
            name: image_id.into(),
        }
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetRef {
    pub owner: OwnerRef,
    /// Set for service targets only.
    pub port: Option<u16>,
}

impl TargetRef {
    pub fn kind(&self) -> TargetKind {
        self.owner.kind
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.owner, port),
            None => write!(f, "{}", self.owner),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    pub namespace: String,
    pub service_name: String,
    pub port: ServicePort,
    pub annotations: BTreeMap<String, String>,
}

impl ServiceTarget {
    pub fn from_service(service: &Service, port: &ServicePort) -> Self {
        Self {
            namespace: service.metadata.namespace.clone(),
            service_name: service.metadata.name.clone(),
            port: port.clone(),
            annotations: service.metadata.annotations.clone(),
        }
    }

    /// In-cluster DNS name of the service.
    pub fn host_name(&self) -> String {
        format!("{}.{}.svc", self.service_name, self.namespace)
    }

    /// `https` for ports named like it or the usual TLS ports, `http` otherwise.
    pub fn host_type(&self) -> &'static str {
        let port = &self.port;
        if port.name.to_ascii_lowercase().contains("https") || matches!(port.port, 443 | 8443) {
            "https"
        } else {
            "http"
        }
    }
}

/// A pod running a container target, with the annotations read by the inclusion rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodInfo {
    pub name: String,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerTarget {
    pub namespace: String,
    pub container_name: String,
    pub image: String,
    pub image_id: String,
    /// Sorted by name, never empty for an observed target.
    pub pods: Vec<PodInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Service(ServiceTarget),
    Container(ContainerTarget),
}

impl Target {
    pub fn kind(&self) -> TargetKind {
        match self {
            Target::Service(_) => TargetKind::Service,
            Target::Container(_) => TargetKind::Container,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            Target::Service(svc) => &svc.namespace,
            Target::Container(container) => &container.namespace,
        }
    }

    pub fn owner(&self) -> OwnerRef {
        match self {
            Target::Service(svc) => OwnerRef::service(&svc.namespace, &svc.service_name),
            Target::Container(c) => OwnerRef::container(&c.namespace, &c.image_id),
        }
    }

    pub fn target_ref(&self) -> TargetRef {
        let port: Option<u16> = match self {
            Target::Service(svc) => Some(svc.port.port),
            Target::Container(_) => None,
        };
        TargetRef {
            owner: self.owner(),
            port,
        }
    }

    /// Name of the scan job created for this target.
    pub fn job_name(&self) -> String {
        match self {
            Target::Service(svc) => naming::service_job_name(&svc.service_name, svc.port.port),
            Target::Container(c) => naming::container_job_name(&c.image, &c.image_id),
        }
    }
}
