//! Per-kind rendering contexts and the field schema each one exposes.

use autoscan_common::cluster::{ContainerTarget, ServiceTarget, TargetKind};

pub const SERVICE_FIELDS: &[&str] = &[
    "Cluster.Name",
    "Namespace.Name",
    "Service.Name",
    "Service.Namespace",
    "Host.Name",
    "Host.Port",
    "Host.Type",
];

pub const CONTAINER_FIELDS: &[&str] = &[
    "Cluster.Name",
    "Namespace.Name",
    "Container.Name",
    "Container.Image",
    "Container.ImageID",
    "Container.Pod",
    "Container.Namespace",
    "ImageID",
];

pub fn schema(kind: TargetKind) -> &'static [&'static str] {
    match kind {
        TargetKind::Service => SERVICE_FIELDS,
        TargetKind::Container => CONTAINER_FIELDS,
    }
}

/// Read-only view a template is rendered against.
///
/// `path` is the dotted field path without the leading dot. `None` means the field does not
/// exist for this kind.
pub trait TemplateContext {
    fn lookup(&self, path: &str) -> Option<String>;
}

pub struct ServiceContext<'a> {
    cluster: &'a str,
    target: &'a ServiceTarget,
}

impl<'a> ServiceContext<'a> {
    pub fn new(cluster: &'a str, target: &'a ServiceTarget) -> Self {
        Self { cluster, target }
    }
}

impl TemplateContext for ServiceContext<'_> {
    fn lookup(&self, path: &str) -> Option<String> {
        let target = self.target;
        let value: String = match path {
            "Cluster.Name" => self.cluster.to_string(),
            "Namespace.Name" | "Service.Namespace" => target.namespace.clone(),
            "Service.Name" => target.service_name.clone(),
            "Host.Name" => target.host_name(),
            "Host.Port" => target.port.port.to_string(),
            "Host.Type" => target.host_type().to_string(),
            _ => return None,
        };
        Some(value)
    }
}

pub struct ContainerContext<'a> {
    cluster: &'a str,
    target: &'a ContainerTarget,
    pod: &'a str,
}

impl<'a> ContainerContext<'a> {
    /// `pod` is the representative pod exposed as `.Container.Pod`.
    pub fn new(cluster: &'a str, target: &'a ContainerTarget, pod: &'a str) -> Self {
        Self {
            cluster,
            target,
            pod,
        }
    }
}

impl TemplateContext for ContainerContext<'_> {
    fn lookup(&self, path: &str) -> Option<String> {
        let target = self.target;
        let value: String = match path {
            "Cluster.Name" => self.cluster.to_string(),
            "Namespace.Name" | "Container.Namespace" => target.namespace.clone(),
            "Container.Name" => target.container_name.clone(),
            "Container.Image" => target.image.clone(),
            "Container.ImageID" | "ImageID" => target.image_id.clone(),
            "Container.Pod" => self.pod.to_string(),
            _ => return None,
        };
        Some(value)
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
