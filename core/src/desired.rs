//! # Desired-State Builder
//!
//! Pure function from *(target, namespace, policy)* to the scan job that **should** exist.

use std::collections::BTreeMap;

use autoscan_common::cluster::{
    DesiredScanSpec, MANAGED_BY_LABEL, MANAGED_BY_VALUE, Namespace, TARGET_KIND_LABEL, Target,
};
use autoscan_common::error::TemplateError;

use crate::inclusion;
use crate::policy::{CompiledScanConfig, Policy};
use crate::template::{self, ContainerContext, ServiceContext, TemplateContext};

/// Result of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Included(DesiredScanSpec),
    Excluded,
}

impl BuildOutcome {
    pub fn is_included(&self) -> bool {
        matches!(self, BuildOutcome::Included(_))
    }

    pub fn into_spec(self) -> Option<DesiredScanSpec> {
        match self {
            BuildOutcome::Included(spec) => Some(spec),
            BuildOutcome::Excluded => None,
        }
    }
}

/// Builds the desired scan job of `target`.
///
/// Excluded targets (by markers, mode, or a disabled discovery kind) build nothing. A template
/// error means the target cannot be judged this pass and is left alone by the caller.
pub fn build(
    target: &Target,
    namespace: Option<&Namespace>,
    policy: &Policy,
) -> Result<BuildOutcome, TemplateError> {
    let discovery = policy.discovery(target.kind());
    if !discovery.enabled || !inclusion::is_included(target, namespace, policy.mode()) {
        return Ok(BuildOutcome::Excluded);
    }

    let cluster: &str = policy.cluster_name();
    let spec: DesiredScanSpec = match target {
        Target::Service(svc) => {
            let ctx = ServiceContext::new(cluster, svc);
            render_spec(target, &discovery.scan, &ctx)?
        }
        Target::Container(container) => {
            let included: Vec<String> =
                inclusion::included_pods(container, namespace, policy.mode());
            let pod: &str = included
                .first()
                .map(String::as_str)
                .or_else(|| container.pods.first().map(|p| p.name.as_str()))
                .unwrap_or_default();
            let ctx = ContainerContext::new(cluster, container, pod);
            render_spec(target, &discovery.scan, &ctx)?
        }
    };

    Ok(BuildOutcome::Included(spec))
}

fn render_spec(
    target: &Target,
    scan: &CompiledScanConfig,
    ctx: &dyn TemplateContext,
) -> Result<DesiredScanSpec, TemplateError> {
    let parameters: Vec<String> = template::render(&scan.parameters, ctx)?;
    let annotations: BTreeMap<String, String> = template::render_map(&scan.annotations, ctx)?;
    let mut labels: BTreeMap<String, String> = template::render_map(&scan.labels, ctx)?;

    labels
        .entry(TARGET_KIND_LABEL.to_string())
        .or_insert_with(|| target.kind().to_string());
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());

    Ok(DesiredScanSpec {
        name: target.job_name(),
        namespace: target.namespace().to_string(),
        target: target.target_ref(),
        scan_type: scan.scan_type.clone(),
        parameters,
        annotations,
        labels,
        repeat_interval: scan.repeat_interval,
    })
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inclusion::{ENABLED_MARKER, IGNORE_MARKER};
    use autoscan_common::cluster::{
        ContainerTarget, PodInfo, Service, ServicePort, ServiceTarget, TargetKind,
    };
    use autoscan_common::config::AutoDiscoveryConfig;

    fn policy(extra: &str) -> Policy {
        let yaml = format!(
            r#"
cluster:
  name: test-cluster
serviceAutoDiscovery:
  scanConfig:
    scanType: nmap
    repeatInterval: 1h
    labels:
      team: "{{{{ .Namespace.Name }}}}"
      {MANAGED_BY_LABEL}: someone-else
    parameters: ["-p", "{{{{.Host.Port}}}}", "{{{{.Service.Name}}}}.{{{{.Service.Namespace}}}}.svc"]
containerAutoDiscovery:
  scanConfig:
    scanType: trivy-image
    annotations:
      testAnnotation: "{{{{.Namespace.Name}}}}"
      pod: "{{{{ .Container.Pod }}}}"
    parameters: ["{{{{ .ImageID }}}}"]
{extra}
"#
        );
        Policy::from_config(AutoDiscoveryConfig::from_yaml(&yaml).unwrap()).unwrap()
    }

    fn web(annotations: &[(&str, &str)]) -> Target {
        let mut svc = Service::new("default", "web").with_port(ServicePort::tcp("http", 80));
        for (k, v) in annotations {
            svc = svc.with_annotation(*k, *v);
        }
        Target::Service(ServiceTarget::from_service(&svc, &svc.ports[0]))
    }

    fn container_in_ns1() -> Target {
        let opted_in: BTreeMap<String, String> =
            [(ENABLED_MARKER.to_string(), "true".to_string())].into();
        Target::Container(ContainerTarget {
            namespace: "ns1".into(),
            container_name: "app".into(),
            image: "nginx:1.25".into(),
            image_id: "sha256:abc".into(),
            pods: vec![
                PodInfo {
                    name: "a-pod".into(),
                    annotations: BTreeMap::new(),
                },
                PodInfo {
                    name: "b-pod".into(),
                    annotations: opted_in,
                },
            ],
        })
    }

    #[test]
    fn no_opt_in_means_no_spec() {
        let outcome = build(&web(&[]), None, &policy("")).unwrap();
        assert_eq!(outcome, BuildOutcome::Excluded);
        assert!(!outcome.is_included());
    }

    #[test]
    fn renders_service_spec() {
        let target = web(&[(ENABLED_MARKER, "true")]);
        let spec = build(&target, None, &policy("")).unwrap().into_spec().unwrap();

        assert_eq!(spec.name, "web-port-80");
        assert_eq!(spec.namespace, "default");
        assert_eq!(spec.scan_type, "nmap");
        assert_eq!(spec.parameters, vec!["-p", "80", "web.default.svc"]);
        assert_eq!(spec.target, target.target_ref());
        assert_eq!(spec.labels["team"], "default");
        assert_eq!(spec.labels[MANAGED_BY_LABEL], MANAGED_BY_VALUE);
        assert_eq!(spec.labels[TARGET_KIND_LABEL], TargetKind::Service.to_string());
    }

    #[test]
    fn renders_container_spec_with_included_pod() {
        let spec = build(&container_in_ns1(), None, &policy(""))
            .unwrap()
            .into_spec()
            .unwrap();

        assert_eq!(spec.annotations["testAnnotation"], "ns1");
        assert_eq!(spec.annotations["pod"], "b-pod");
        assert_eq!(spec.parameters, vec!["sha256:abc"]);
        assert!(spec.name.starts_with("scan-nginx-at-"));
    }

    #[test]
    fn disabled_kind_excludes_everything() {
        let enabled = policy("resourceInclusion:\n  mode: all\n");
        assert!(build(&web(&[]), None, &enabled).unwrap().is_included());

        let disabled = Policy::from_config(
            AutoDiscoveryConfig::from_yaml(
                "cluster:\n  name: c\nserviceAutoDiscovery:\n  enabled: false\nresourceInclusion:\n  mode: all\n",
            )
            .unwrap(),
        )
        .unwrap();
        let opted_in = web(&[(ENABLED_MARKER, "true")]);
        assert!(!build(&opted_in, None, &disabled).unwrap().is_included());
    }

    #[test]
    fn excluded_by_marker_in_all_mode() {
        let policy = policy("resourceInclusion:\n  mode: all\n");
        let target = web(&[(IGNORE_MARKER, "true")]);
        assert_eq!(build(&target, None, &policy).unwrap(), BuildOutcome::Excluded);
    }
}
