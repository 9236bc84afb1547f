use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use autoscan_common::cluster::{ClusterSnapshot, OwnerRef, ScanJob};
use autoscan_core::cluster::InMemoryCluster;
use autoscan_core::reconciler::ReconcileOutcome;
use autoscan_core::{Controller, Policy, SystemClock};
use colored::*;
use tracing::{Instrument, info_span, warn};

use crate::commands::{load_policy, load_snapshot, print_jobs};
use crate::mprint;
use crate::terminal::{colors, print};

/// One sequential pass over every key of the snapshot against an empty in-memory cluster.
pub async fn plan(config: &Path, snapshot: &Path, quiet: u8) -> anyhow::Result<()> {
    let policy: Arc<Policy> = load_policy(config, None)?;
    let snapshot: ClusterSnapshot = load_snapshot(snapshot)?;

    let start_time: Instant = Instant::now();
    let (jobs, outcomes) = plan_jobs(policy, snapshot)
        .instrument(info_span!("plan"))
        .await;

    for (owner, outcome) in &outcomes {
        if outcome.template_errors > 0 {
            warn!(owner = %owner, failed = outcome.template_errors, "Targets held back by template errors");
        }
    }

    print::header("planned scan jobs", quiet);
    print_jobs(&jobs);
    print_summary(&outcomes, start_time.elapsed(), quiet);
    Ok(())
}

/// The scan jobs a controller would create for `snapshot` on an empty cluster.
pub async fn plan_jobs(
    policy: Arc<Policy>,
    snapshot: ClusterSnapshot,
) -> (Vec<ScanJob>, Vec<(OwnerRef, ReconcileOutcome)>) {
    let cluster: Arc<InMemoryCluster> = Arc::new(InMemoryCluster::new());
    let controller: Arc<Controller> = Controller::new(
        policy,
        cluster.clone(),
        cluster.clone(),
        Arc::new(SystemClock),
    );

    for event in snapshot.into_events() {
        controller.observe(event);
    }
    let outcomes: Vec<(OwnerRef, ReconcileOutcome)> = controller.reconcile_all().await;
    (cluster.jobs(), outcomes)
}

fn print_summary(outcomes: &[(OwnerRef, ReconcileOutcome)], total_time: Duration, quiet: u8) {
    let created: usize = outcomes.iter().map(|(_, o)| o.created).sum();
    let held: usize = outcomes.iter().map(|(_, o)| o.template_errors).sum();

    let jobs: ColoredString = format!("{created} scan jobs").bold().green();
    let keys: ColoredString = format!("{} keys", outcomes.len()).bold();
    let total_time: ColoredString = format!("{:.2}s", total_time.as_secs_f64()).bold().yellow();
    let mut output: String = format!("Plan Complete: {jobs} from {keys} in {total_time}");
    if held > 0 {
        output.push_str(&format!(", {} held", held.to_string().color(colors::WARNING)));
    }

    match quiet {
        0 => {
            print::fat_separator();
            print::centerln(&output);
        }
        _ => {
            mprint!();
            print::print_status(output);
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
