//! # Compiled Policy
//!
//! The validated, **immutable** form of an [`AutoDiscoveryConfig`]. Every template is parsed
//! and checked against its kind's schema exactly once, here. A `Policy` that exists is a
//! policy that can render.
//!
//! Shared between reconcilers and workers as `Arc<Policy>`.

use std::collections::BTreeMap;
use std::time::Duration;

use autoscan_common::cluster::TargetKind;
use autoscan_common::config::{AutoDiscoveryConfig, ControllerConfig, InclusionMode, ScanConfig};
use autoscan_common::error::{ConfigValidationError, TemplateError, ValidationProblem};

use crate::template::Template;

#[derive(Debug, Clone)]
pub struct Policy {
    cluster_name: String,
    mode: InclusionMode,
    passive_reconcile_interval: Duration,
    service: DiscoveryPolicy,
    container: DiscoveryPolicy,
    controller: ControllerConfig,
}

/// Discovery settings of one target kind.
#[derive(Debug, Clone)]
pub struct DiscoveryPolicy {
    pub enabled: bool,
    pub scan: CompiledScanConfig,
}

#[derive(Debug, Clone)]
pub struct CompiledScanConfig {
    pub scan_type: String,
    pub repeat_interval: Duration,
    pub parameters: Vec<Template>,
    pub annotations: BTreeMap<String, Template>,
    pub labels: BTreeMap<String, Template>,
}

impl Policy {
    /// Validates the document and compiles every template, reporting all problems at once.
    pub fn from_config(config: AutoDiscoveryConfig) -> Result<Self, ConfigValidationError> {
        config.validate()?;

        let mut problems: Vec<ValidationProblem> = Vec::new();
        let service: CompiledScanConfig = compile_scan_config(
            "serviceAutoDiscovery.scanConfig",
            TargetKind::Service,
            &config.service_auto_discovery.scan_config,
            &mut problems,
        );
        let container: CompiledScanConfig = compile_scan_config(
            "containerAutoDiscovery.scanConfig",
            TargetKind::Container,
            &config.container_auto_discovery.scan_config,
            &mut problems,
        );
        if !problems.is_empty() {
            return Err(ConfigValidationError::Invalid(problems));
        }

        Ok(Self {
            cluster_name: config.cluster.name,
            mode: config.resource_inclusion.mode,
            passive_reconcile_interval: config.service_auto_discovery.passive_reconcile_interval,
            service: DiscoveryPolicy {
                enabled: config.service_auto_discovery.enabled,
                scan: service,
            },
            container: DiscoveryPolicy {
                enabled: config.container_auto_discovery.enabled,
                scan: container,
            },
            controller: config.controller,
        })
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub fn mode(&self) -> InclusionMode {
        self.mode
    }

    /// Forced recheck period of service targets. Containers have none.
    pub fn passive_reconcile_interval(&self) -> Duration {
        self.passive_reconcile_interval
    }

    pub fn discovery(&self, kind: TargetKind) -> &DiscoveryPolicy {
        match kind {
            TargetKind::Service => &self.service,
            TargetKind::Container => &self.container,
        }
    }

    pub fn controller(&self) -> &ControllerConfig {
        &self.controller
    }
}

fn compile_scan_config(
    prefix: &str,
    kind: TargetKind,
    scan: &ScanConfig,
    problems: &mut Vec<ValidationProblem>,
) -> CompiledScanConfig {
    let mut compile = |field: String, source: &str| -> Option<Template> {
        match Template::parse(source).and_then(|t| t.check_fields(kind).map(|()| t)) {
            Ok(template) => Some(template),
            Err(e) => {
                problems.push(ValidationProblem::new(field, describe(&e)));
                None
            }
        }
    };

    let parameters: Vec<Template> = scan
        .parameters
        .iter()
        .enumerate()
        .filter_map(|(i, source)| compile(format!("{prefix}.parameters[{i}]"), source))
        .collect();
    let annotations: BTreeMap<String, Template> = scan
        .annotations
        .iter()
        .filter_map(|(key, source)| {
            compile(format!("{prefix}.annotations.{key}"), source).map(|t| (key.clone(), t))
        })
        .collect();
    let labels: BTreeMap<String, Template> = scan
        .labels
        .iter()
        .filter_map(|(key, source)| {
            compile(format!("{prefix}.labels.{key}"), source).map(|t| (key.clone(), t))
        })
        .collect();

    CompiledScanConfig {
        scan_type: scan.scan_type.clone(),
        repeat_interval: scan.repeat_interval,
        parameters,
        annotations,
        labels,
    }
}

fn describe(error: &TemplateError) -> String {
    match error {
        TemplateError::Malformed {
            position, reason, ..
        } => format!("malformed template at byte {position}: {reason}"),
        TemplateError::UndefinedField { field, .. } => {
            format!("field '.{field}' is not available for this target kind")
        }
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
