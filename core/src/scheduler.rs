//! # Scan Scheduler
//!
//! The per-pair state machine. A **pair** is one target and one scan type, and at most one live
//! scan job exists for it.
//!
//! ```text
//!            included                    spec changed
//!  Absent ──────────────▶ Scheduled ◀──────────────── Stale
//!    ▲                     │     ▲
//!    │  excluded / gone    │     │ re-stamp
//!    └─────────────────────┘     └──────── Due
//! ```
//!
//! Staleness is checked **before** due-ness: a changed spec is always applied, and the trigger
//! time is only re-stamped when the repeat interval has also elapsed.

use std::fmt;

use autoscan_common::cluster::{DesiredScanSpec, ScanJob};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairState {
    /// No live job.
    Absent,
    /// Job matches the desired spec and the repeat interval has not elapsed.
    Scheduled,
    /// Job matches the desired spec and the repeat interval has elapsed.
    Due,
    /// Job differs from the desired spec.
    Stale,
}

impl fmt::Display for PairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &str = match self {
            PairState::Absent => "absent",
            PairState::Scheduled => "scheduled",
            PairState::Due => "due",
            PairState::Stale => "stale",
        };
        f.write_str(name)
    }
}

/// Minimal mutation bringing one pair back to `Scheduled` (or to `Absent` when excluded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Create(ScanJob),
    Update { job: ScanJob, restamped: bool },
    Retrigger(ScanJob),
    Delete(ScanJob),
    Skip,
}

impl Decision {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Decision::Skip)
    }
}

/// Observed state and the decision taken from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: PairState,
    pub decision: Decision,
}

/// Classifies an existing job against the desired spec.
pub fn classify(
    existing: Option<&ScanJob>,
    desired: &DesiredScanSpec,
    now: DateTime<Utc>,
) -> PairState {
    match existing {
        None => PairState::Absent,
        Some(job) if !job.matches(desired) => PairState::Stale,
        Some(job) if job.is_due(now, desired.repeat_interval) => PairState::Due,
        Some(_) => PairState::Scheduled,
    }
}

/// Decides what to do with one pair. `desired == None` means the target is excluded or gone.
pub fn decide(
    existing: Option<&ScanJob>,
    desired: Option<&DesiredScanSpec>,
    now: DateTime<Utc>,
) -> Transition {
    let Some(desired) = desired else {
        return match existing {
            Some(job) => Transition {
                from: PairState::Scheduled,
                decision: Decision::Delete(job.clone()),
            },
            None => Transition {
                from: PairState::Absent,
                decision: Decision::Skip,
            },
        };
    };

    let from: PairState = classify(existing, desired, now);
    let decision: Decision = match (from, existing) {
        (PairState::Absent, _) | (_, None) => Decision::Create(desired.clone().into_job(now)),
        (PairState::Stale, Some(job)) => {
            let restamped: bool = job.is_due(now, desired.repeat_interval);
            let updated: ScanJob = job.clone().with_spec(desired.clone());
            let updated: ScanJob = if restamped {
                updated.triggered_at(now)
            } else {
                updated
            };
            Decision::Update {
                job: updated,
                restamped,
            }
        }
        (PairState::Due, Some(job)) => Decision::Retrigger(job.clone().triggered_at(now)),
        (PairState::Scheduled, Some(_)) => Decision::Skip,
    };

    Transition { from, decision }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
