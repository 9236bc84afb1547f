//! # Controller
//!
//! Wires everything together:
//!
//! * **intake**: cluster events update the [`ClusterCache`] and enqueue the keys they touch;
//! * **workers**: a fixed pool pulling keys from the [`WorkQueue`] and running one pass each;
//! * **requeue**: successful service passes come back after the passive interval, failed
//!   passes come back with per-key exponential backoff;
//! * **shutdown**: cancelling the token stops intake, lets in-flight passes finish and drains
//!   the queue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Context;
use autoscan_common::cluster::{ClusterEvent, OwnerRef, TargetKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{ClusterCache, Resolved};
use crate::clock::Clock;
use crate::cluster::{EventRecorder, ScanJobClient};
use crate::policy::Policy;
use crate::queue::{QueueStats, WorkQueue};
use crate::reconciler::{
    ContainerReconciler, ReconcileCore, ReconcileOutcome, Reconciler, ServiceReconciler,
};
use crate::tracker::ScheduleTracker;

pub struct Controller {
    policy: Arc<Policy>,
    cache: RwLock<ClusterCache>,
    queue: Arc<WorkQueue<OwnerRef>>,
    services: ServiceReconciler,
    containers: ContainerReconciler,
    tracker: Arc<ScheduleTracker>,
    passes: AtomicUsize,
}

impl Controller {
    pub fn new(
        policy: Arc<Policy>,
        client: Arc<dyn ScanJobClient>,
        recorder: Arc<dyn EventRecorder>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let tracker: Arc<ScheduleTracker> = Arc::new(ScheduleTracker::new());
        let core: Arc<ReconcileCore> = Arc::new(ReconcileCore::new(
            Arc::clone(&policy),
            client,
            recorder,
            clock,
            Arc::clone(&tracker),
        ));
        let queue = WorkQueue::new(policy.controller().backoff.clone());

        Arc::new(Self {
            policy,
            cache: RwLock::new(ClusterCache::new()),
            queue,
            services: Reconciler::new(Arc::clone(&core)),
            containers: Reconciler::new(core),
            tracker,
            passes: AtomicUsize::new(0),
        })
    }

    /// Runs until `shutdown` is cancelled. A closed event stream does not stop the controller,
    /// passive rechecks keep going.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<ClusterEvent>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let workers: usize = self.policy.controller().workers;
        info!(workers, cluster = %self.policy.cluster_name(), "Controller started");

        let handles: Vec<JoinHandle<()>> = (0..workers)
            .map(|id| tokio::spawn(Arc::clone(&self).worker(id)))
            .collect();

        let mut open: bool = true;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv(), if open => match event {
                    Some(event) => {
                        self.observe(event);
                    }
                    None => {
                        debug!("Event stream closed");
                        open = false;
                    }
                },
            }
        }

        info!("Shutting down, waiting for in-flight passes");
        self.queue.shut_down();
        for handle in handles {
            handle.await.context("reconcile worker panicked")?;
        }
        info!(passes = self.passes(), "Controller stopped");
        Ok(())
    }

    /// Applies one event to the cache and enqueues the keys it touches.
    pub fn observe(&self, event: ClusterEvent) -> Vec<OwnerRef> {
        debug!(namespace = event.namespace(), "Observed cluster event");
        let keys: Vec<OwnerRef> = self.write_cache().apply(event);
        for key in &keys {
            debug!(key = %key, "Enqueued");
            self.queue.add(key.clone());
        }
        keys
    }

    /// One pass over `key` against the latest cached state.
    pub async fn reconcile_key(&self, key: &OwnerRef) -> ReconcileOutcome {
        let resolved: Resolved = self.read_cache().resolve(key);
        self.passes.fetch_add(1, Ordering::Relaxed);
        match key.kind {
            TargetKind::Service => self.services.reconcile(key, &resolved).await,
            TargetKind::Container => self.containers.reconcile(key, &resolved).await,
        }
    }

    /// One sequential pass over every known key, bypassing the queue.
    pub async fn reconcile_all(&self) -> Vec<(OwnerRef, ReconcileOutcome)> {
        let keys: Vec<OwnerRef> = self.read_cache().keys();
        let mut outcomes: Vec<(OwnerRef, ReconcileOutcome)> = Vec::with_capacity(keys.len());
        for key in keys {
            let outcome: ReconcileOutcome = self.reconcile_key(&key).await;
            outcomes.push((key, outcome));
        }
        outcomes
    }

    pub fn tracker(&self) -> &ScheduleTracker {
        &self.tracker
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Number of passes run so far.
    pub fn passes(&self) -> usize {
        self.passes.load(Ordering::Relaxed)
    }

    async fn worker(self: Arc<Self>, id: usize) {
        debug!(worker = id, "Worker started");
        while let Some(key) = self.queue.get().await {
            let outcome: ReconcileOutcome = self.reconcile_key(&key).await;

            if outcome.is_success() {
                self.queue.forget(&key);
                if let Some(delay) = outcome.requeue_after {
                    self.queue.add_after(key.clone(), delay);
                }
            } else {
                warn!(
                    key = %key,
                    errors = outcome.errors.len(),
                    retries = self.queue.num_requeues(&key),
                    "Pass failed, requeueing with backoff"
                );
                self.queue.add_rate_limited(key.clone());
            }

            self.queue.done(&key);
        }
        debug!(worker = id, "Worker stopped");
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, ClusterCache> {
        self.cache.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, ClusterCache> {
        self.cache.write().unwrap_or_else(|e| e.into_inner())
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
