//! # Scan Jobs
//!
//! The persisted record telling the scan-execution collaborator *what* to run against *which*
//! target. [`ScanJob::last_triggered`] is the only signal the execution side needs: bumping it
//! asks for another run.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::target::{OwnerRef, TargetRef};

/// Label present on every job this controller creates.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "autoscan";
pub const TARGET_KIND_LABEL: &str = "autoscan.dev/target-kind";

/// Fully rendered scan configuration for one target, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredScanSpec {
    pub name: String,
    pub namespace: String,
    pub target: TargetRef,
    pub scan_type: String,
    pub parameters: Vec<String>,
    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub repeat_interval: Duration,
}

impl DesiredScanSpec {
    /// Materializes the spec as a brand-new job triggered at `now`.
    pub fn into_job(self, now: DateTime<Utc>) -> ScanJob {
        ScanJob {
            name: self.name,
            namespace: self.namespace,
            target: self.target,
            scan_type: self.scan_type,
            parameters: self.parameters,
            annotations: self.annotations,
            labels: self.labels,
            repeat_interval: self.repeat_interval,
            last_triggered: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanJob {
    pub name: String,
    pub namespace: String,
    pub target: TargetRef,
    pub scan_type: String,
    pub parameters: Vec<String>,
    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub repeat_interval: Duration,
    pub last_triggered: DateTime<Utc>,
}

impl ScanJob {
    pub fn owner(&self) -> &OwnerRef {
        &self.target.owner
    }

    /// `namespace/name`, unique in the cluster.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Whether the persisted spec equals the freshly computed one.
    pub fn matches(&self, desired: &DesiredScanSpec) -> bool {
        self.scan_type == desired.scan_type
            && self.parameters == desired.parameters
            && self.annotations == desired.annotations
            && self.labels == desired.labels
            && self.repeat_interval == desired.repeat_interval
    }

    /// `true` once `repeat_interval` has fully elapsed since the last trigger.
    ///
    /// A trigger stamped in the future (clock skew) is never due.
    pub fn is_due(&self, now: DateTime<Utc>, repeat_interval: Duration) -> bool {
        match (now - self.last_triggered).to_std() {
            Ok(elapsed) => elapsed >= repeat_interval,
            Err(_) => false,
        }
    }

    /// Replaces the spec, keeping identity and trigger time.
    pub fn with_spec(mut self, desired: DesiredScanSpec) -> Self {
        self.scan_type = desired.scan_type;
        self.parameters = desired.parameters;
        self.annotations = desired.annotations;
        self.labels = desired.labels;
        self.repeat_interval = desired.repeat_interval;
        self
    }

    pub fn triggered_at(mut self, now: DateTime<Utc>) -> Self {
        self.last_triggered = now;
        self
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn spec() -> DesiredScanSpec {
        DesiredScanSpec {
            name: "web-port-80".into(),
            namespace: "default".into(),
            target: TargetRef {
                owner: OwnerRef::service("default", "web"),
                port: Some(80),
            },
            scan_type: "nmap".into(),
            parameters: vec!["-p".into(), "80".into()],
            annotations: BTreeMap::new(),
            labels: BTreeMap::new(),
            repeat_interval: Duration::from_secs(3600),
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn due_exactly_at_interval() {
        let job = spec().into_job(at(0));
        let hour = Duration::from_secs(3600);

        assert!(!job.is_due(at(3599), hour));
        assert!(job.is_due(at(3600), hour));
        assert!(job.is_due(at(7200), hour));
    }

    #[test]
    fn future_trigger_is_never_due() {
        let job = spec().into_job(at(100));
        assert!(!job.is_due(at(0), Duration::ZERO));
    }

    #[test]
    fn parameter_order_matters_for_matching() {
        let job = spec().into_job(at(0));
        let mut reordered = spec();
        reordered.parameters.reverse();

        assert!(job.matches(&spec()));
        assert!(!job.matches(&reordered));
    }

    #[test]
    fn with_spec_keeps_trigger_time() {
        let job = spec().into_job(at(5));
        let mut changed = spec();
        changed.scan_type = "nuclei".into();

        let updated = job.with_spec(changed.clone());
        assert_eq!(updated.last_triggered, at(5));
        assert!(updated.matches(&changed));
    }
}
