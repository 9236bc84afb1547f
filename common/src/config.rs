//! # Auto-Discovery Policy
//!
//! The policy document is loaded **once** at start-up and never mutated afterwards.
//! Both reconcilers share it by reference.
//!
//! ```yaml
//! cluster:
//!   name: production
//! serviceAutoDiscovery:
//!   passiveReconcileInterval: 1m
//!   scanConfig:
//!     scanType: nmap
//!     repeatInterval: 168h
//!     parameters: ["-p", "{{ .Host.Port }}", "{{ .Service.Name }}.{{ .Service.Namespace }}.svc"]
//! containerAutoDiscovery:
//!   scanConfig:
//!     scanType: trivy-image
//!     parameters: ["{{ .ImageID }}"]
//! resourceInclusion:
//!   mode: enabled-per-resource
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigValidationError, ValidationProblem};

/// Root policy object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoDiscoveryConfig {
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub service_auto_discovery: ServiceAutoDiscoveryConfig,

    #[serde(default)]
    pub container_auto_discovery: ContainerAutoDiscoveryConfig,

    #[serde(default)]
    pub resource_inclusion: ResourceInclusionConfig,

    /// Runtime tuning of the controller. Not part of the discovery policy itself.
    #[serde(default)]
    pub controller: ControllerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAutoDiscoveryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Forces a pass over every known service even when no change event arrived.
    #[serde(default = "default_passive_interval", with = "humantime_serde")]
    pub passive_reconcile_interval: Duration,

    #[serde(default = "ScanConfig::service_default")]
    pub scan_config: ScanConfig,
}

impl Default for ServiceAutoDiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            passive_reconcile_interval: default_passive_interval(),
            scan_config: ScanConfig::service_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerAutoDiscoveryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "ScanConfig::container_default")]
    pub scan_config: ScanConfig,
}

impl Default for ContainerAutoDiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_config: ScanConfig::container_default(),
        }
    }
}

/// Template of the scan created for every discovered target of one kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanConfig {
    /// Hard floor between two triggers of an unchanged scan against the same target.
    #[serde(default = "default_repeat_interval", with = "humantime_serde")]
    pub repeat_interval: Duration,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Invocation arguments of the scan. Order is significant.
    #[serde(default)]
    pub parameters: Vec<String>,

    pub scan_type: String,
}

impl ScanConfig {
    fn service_default() -> Self {
        Self {
            repeat_interval: default_repeat_interval(),
            annotations: BTreeMap::new(),
            labels: BTreeMap::new(),
            parameters: vec![
                "-t".to_string(),
                "{{ .Host.Type }}://{{ .Service.Name }}.{{ .Service.Namespace }}.svc:{{ .Host.Port }}"
                    .to_string(),
            ],
            scan_type: "zap-advanced-scan".to_string(),
        }
    }

    fn container_default() -> Self {
        Self {
            repeat_interval: default_repeat_interval(),
            annotations: BTreeMap::new(),
            labels: BTreeMap::new(),
            parameters: vec!["{{ .ImageID }}".to_string()],
            scan_type: "trivy-image".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInclusionConfig {
    #[serde(default)]
    pub mode: InclusionMode,
}

/// Cluster-wide opt-in / opt-out switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InclusionMode {
    /// Only targets (or namespaces) carrying the opt-in marker are scanned.
    #[default]
    EnabledPerResource,
    /// Everything is scanned unless it carries the opt-out marker.
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerConfig {
    /// Number of concurrent reconcile workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Upper bound for a single create/update/delete call.
    #[serde(default = "default_mutation_timeout", with = "humantime_serde")]
    pub mutation_timeout: Duration,

    /// Attempts per mutation before the failure is surfaced on the target.
    #[serde(default = "default_mutation_attempts")]
    pub mutation_attempts: u32,

    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            mutation_timeout: default_mutation_timeout(),
            mutation_attempts: default_mutation_attempts(),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Exponential backoff shared by mutation retries and failed-key requeues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffConfig {
    #[serde(default = "default_initial_delay", with = "humantime_serde")]
    pub initial_delay: Duration,

    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

impl BackoffConfig {
    /// Delay before the given attempt (1-based), capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent: i32 = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs: f64 = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }
}

const fn default_true() -> bool {
    true
}

const fn default_passive_interval() -> Duration {
    Duration::from_secs(60)
}

const fn default_repeat_interval() -> Duration {
    Duration::from_secs(168 * 60 * 60)
}

const fn default_workers() -> usize {
    4
}

const fn default_mutation_timeout() -> Duration {
    Duration::from_secs(10)
}

const fn default_mutation_attempts() -> u32 {
    3
}

const fn default_initial_delay() -> Duration {
    Duration::from_millis(200)
}

const fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

const fn default_multiplier() -> f64 {
    2.0
}

impl AutoDiscoveryConfig {
    /// Parses a policy document without validating it.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigValidationError> {
        serde_yaml::from_str(yaml).map_err(ConfigValidationError::Parse)
    }

    /// Reads, parses and structurally validates the policy file at `path`.
    ///
    /// Template syntax is checked later, when the policy is compiled by the core.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigValidationError> {
        let path: &Path = path.as_ref();
        let raw: String =
            std::fs::read_to_string(path).map_err(|source| ConfigValidationError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config: Self = Self::from_yaml(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every structural rule and reports all violations at once.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let mut problems: Vec<ValidationProblem> = Vec::new();

        if self.cluster.name.trim().is_empty() {
            problems.push(ValidationProblem::new("cluster.name", "must not be empty"));
        }

        let service = &self.service_auto_discovery;
        if service.passive_reconcile_interval.is_zero() {
            problems.push(ValidationProblem::new(
                "serviceAutoDiscovery.passiveReconcileInterval",
                "must be greater than zero",
            ));
        }
        validate_scan_config(
            "serviceAutoDiscovery.scanConfig",
            &service.scan_config,
            &mut problems,
        );
        validate_scan_config(
            "containerAutoDiscovery.scanConfig",
            &self.container_auto_discovery.scan_config,
            &mut problems,
        );

        let controller = &self.controller;
        if controller.workers == 0 {
            problems.push(ValidationProblem::new("controller.workers", "must be at least 1"));
        }
        if controller.mutation_attempts == 0 {
            problems.push(ValidationProblem::new(
                "controller.mutationAttempts",
                "must be at least 1",
            ));
        }
        if controller.mutation_timeout.is_zero() {
            problems.push(ValidationProblem::new(
                "controller.mutationTimeout",
                "must be greater than zero",
            ));
        }
        let backoff = &controller.backoff;
        if !(backoff.multiplier.is_finite() && backoff.multiplier >= 1.0) {
            problems.push(ValidationProblem::new(
                "controller.backoff.multiplier",
                "must be a finite number >= 1.0",
            ));
        }
        if backoff.initial_delay > backoff.max_delay {
            problems.push(ValidationProblem::new(
                "controller.backoff.initialDelay",
                "must not exceed maxDelay",
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigValidationError::Invalid(problems))
        }
    }
}

fn validate_scan_config(prefix: &str, scan: &ScanConfig, problems: &mut Vec<ValidationProblem>) {
    if scan.repeat_interval.is_zero() {
        problems.push(ValidationProblem::new(
            format!("{prefix}.repeatInterval"),
            "must be greater than zero",
        ));
    }

    if !is_dns_label(&scan.scan_type) {
        problems.push(ValidationProblem::new(
            format!("{prefix}.scanType"),
            format!("'{}' is not a valid scan type name", scan.scan_type),
        ));
    }

    for key in scan.annotations.keys() {
        if !is_qualified_key(key) {
            problems.push(ValidationProblem::new(
                format!("{prefix}.annotations"),
                format!("'{key}' is not a valid annotation key"),
            ));
        }
    }

    for key in scan.labels.keys() {
        if !is_qualified_key(key) {
            problems.push(ValidationProblem::new(
                format!("{prefix}.labels"),
                format!("'{key}' is not a valid label key"),
            ));
        }
    }
}

/// Lowercase alphanumerics and `-`, starting and ending alphanumeric, at most 63 characters.
pub fn is_dns_label(value: &str) -> bool {
    let bytes: &[u8] = value.as_bytes();
    if bytes.is_empty() || bytes.len() > 63 {
        return false;
    }
    let valid_char = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-';
    bytes.iter().all(valid_char)
        && bytes[0] != b'-'
        && bytes[bytes.len() - 1] != b'-'
}

/// `[prefix/]name` where name is at most 63 characters of alphanumerics, `-`, `_` and `.`.
fn is_qualified_key(key: &str) -> bool {
    let name: &str = match key.rsplit_once('/') {
        Some((prefix, name)) => {
            if prefix.is_empty() || prefix.len() > 253 {
                return false;
            }
            name
        }
        None => key,
    };

    if name.is_empty() || name.len() > 63 {
        return false;
    }
    let is_edge = |c: char| c.is_ascii_alphanumeric();
    name.starts_with(is_edge)
        && name.ends_with(is_edge)
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
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
