use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use autoscan_common::cluster::{ClusterEvent, ClusterSnapshot};
use autoscan_core::cluster::InMemoryCluster;
use autoscan_core::{Controller, Policy, SystemClock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::commands::{load_policy, load_snapshot, print_events, print_jobs};
use crate::mprint;
use crate::terminal::print;

const EVENT_BUFFER: usize = 256;

/// Replays the snapshot into a running controller and keeps it alive until Ctrl-C.
pub async fn run(
    config: &Path,
    snapshot: &Path,
    workers: Option<usize>,
    quiet: u8,
) -> anyhow::Result<()> {
    let policy: Arc<Policy> = load_policy(config, workers)?;
    let snapshot: ClusterSnapshot = load_snapshot(snapshot)?;

    let cluster: Arc<InMemoryCluster> = Arc::new(InMemoryCluster::new());
    let controller: Arc<Controller> = Controller::new(
        policy,
        cluster.clone(),
        cluster.clone(),
        Arc::new(SystemClock),
    );

    let (tx, rx) = mpsc::channel::<ClusterEvent>(EVENT_BUFFER);
    let shutdown: CancellationToken = CancellationToken::new();
    let handle: JoinHandle<anyhow::Result<()>> =
        tokio::spawn(Arc::clone(&controller).run(rx, shutdown.clone()));

    for event in snapshot.into_events() {
        tx.send(event)
            .await
            .context("controller stopped before the snapshot was delivered")?;
    }
    info!("Snapshot delivered, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Stopping controller");
    shutdown.cancel();
    drop(tx);
    handle.await.context("controller task panicked")??;

    print::header("scan jobs", quiet);
    print_jobs(&cluster.jobs());
    mprint!();
    print::header("events", quiet);
    print_events(&cluster.events());
    print::end_of_program();
    Ok(())
}
