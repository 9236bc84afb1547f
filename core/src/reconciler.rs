//! # Reconcile Core
//!
//! One **pass** over one work key:
//!
//! 1. list the scan jobs owned by the key;
//! 2. build the desired spec of every current target;
//! 3. pair existing jobs with desired specs by *(target, scan type)*, or by job name when
//!    the scan type of a target changed;
//! 4. let the [`scheduler`](crate::scheduler) decide per pair and apply the mutations,
//!    deletes first so a freed job name can be reused in the same pass.
//!
//! A pass never touches jobs of another owner, and a failure on one pair never stops the
//! others. Service and container reconcilers are the same core behind a different
//! [`TargetBinding`].

use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use autoscan_common::cluster::{DesiredScanSpec, OwnerRef, ScanJob, TargetKind, TargetRef};
use autoscan_common::error::{ClientError, MutationError, MutationKind};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use crate::cache::Resolved;
use crate::clock::Clock;
use crate::cluster::{Event, EventRecorder, EventType, MutationExecutor, ScanJobClient, reason};
use crate::desired::{self, BuildOutcome};
use crate::policy::Policy;
use crate::scheduler::{self, Decision, PairState, Transition};
use crate::tracker::{PairKey, ScheduleTracker};

mod container;
mod service;

pub use container::ContainerBinding;
pub use service::ServiceBinding;

pub type ServiceReconciler = Reconciler<ServiceBinding>;
pub type ContainerReconciler = Reconciler<ContainerBinding>;

/// What binds the core to one kind of target.
pub trait TargetBinding: Send + Sync + 'static {
    const KIND: TargetKind;

    /// Delay before the key is reconciled again without any change event.
    fn resync_after(policy: &Policy, resolved: &Resolved) -> Option<Duration>;
}

/// Counters and errors of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub created: usize,
    pub updated: usize,
    pub retriggered: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub template_errors: usize,
    pub errors: Vec<MutationError>,
    /// Set by the binding after a successful pass.
    pub requeue_after: Option<Duration>,
}

impl ReconcileOutcome {
    pub fn mutations(&self) -> usize {
        self.created + self.updated + self.retriggered + self.deleted
    }

    /// No cluster call failed. Template errors do not count, they are retried next pass.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Shared dependencies of every pass.
pub struct ReconcileCore {
    policy: Arc<Policy>,
    client: Arc<dyn ScanJobClient>,
    recorder: Arc<dyn EventRecorder>,
    clock: Arc<dyn Clock>,
    tracker: Arc<ScheduleTracker>,
    executor: MutationExecutor,
}

impl ReconcileCore {
    pub fn new(
        policy: Arc<Policy>,
        client: Arc<dyn ScanJobClient>,
        recorder: Arc<dyn EventRecorder>,
        clock: Arc<dyn Clock>,
        tracker: Arc<ScheduleTracker>,
    ) -> Self {
        let executor: MutationExecutor = MutationExecutor::from_config(policy.controller());
        Self {
            policy,
            client,
            recorder,
            clock,
            tracker,
            executor,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn tracker(&self) -> &ScheduleTracker {
        &self.tracker
    }

    #[instrument(skip_all, fields(key = %owner))]
    pub async fn reconcile(&self, owner: &OwnerRef, resolved: &Resolved) -> ReconcileOutcome {
        let now: DateTime<Utc> = self.clock.now();
        let mut outcome: ReconcileOutcome = ReconcileOutcome::default();

        let client: &dyn ScanJobClient = self.client.as_ref();
        let existing: Vec<ScanJob> = match self
            .executor
            .run(MutationKind::List, &owner.to_string(), || async move {
                client.list_owned(owner).await
            })
            .await
        {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "Failed to list scan jobs");
                self.emit(owner, EventType::Warning, reason::LIST_FAILED, e.to_string(), now)
                    .await;
                outcome.errors.push(e);
                return outcome;
            }
        };

        // desired side
        let mut desired: BTreeMap<PairKey, DesiredScanSpec> = BTreeMap::new();
        let mut held: BTreeSet<TargetRef> = BTreeSet::new();
        for target in &resolved.targets {
            match desired::build(target, resolved.namespace.as_ref(), &self.policy) {
                Ok(BuildOutcome::Included(spec)) => {
                    desired.insert(PairKey::new(spec.target.clone(), &spec.scan_type), spec);
                }
                Ok(BuildOutcome::Excluded) => {}
                Err(e) => {
                    let target_ref: TargetRef = target.target_ref();
                    warn!(target_ref = %target_ref, error = %e, "Template rendering failed, skipping target");
                    let scan_type: &str = &self.policy.discovery(target.kind()).scan.scan_type;
                    let observed: PairState = if existing.iter().any(|j| j.target == target_ref) {
                        PairState::Scheduled
                    } else {
                        PairState::Absent
                    };
                    self.tracker.record_failure(
                        PairKey::new(target_ref.clone(), scan_type),
                        observed,
                        e.to_string(),
                    );
                    self.emit(owner, EventType::Warning, reason::TEMPLATE_FAILED, e.to_string(), now)
                        .await;
                    held.insert(target_ref);
                    outcome.template_errors += 1;
                }
            }
        }

        // a job keeps its name across scan type changes, so it pairs by name first
        let by_name: BTreeMap<(&TargetRef, &str), &PairKey> = desired
            .iter()
            .map(|(key, spec)| ((&spec.target, spec.name.as_str()), key))
            .collect();

        // existing side, collapsed to one job per pair
        let mut current: BTreeMap<PairKey, ScanJob> = BTreeMap::new();
        let mut retyped: Vec<PairKey> = Vec::new();
        let mut duplicates: Vec<ScanJob> = Vec::new();
        let mut sorted: Vec<ScanJob> = existing;
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        for job in sorted {
            if held.contains(&job.target) {
                continue;
            }
            let own: PairKey = PairKey::new(job.target.clone(), &job.scan_type);
            let key: PairKey = match by_name.get(&(&job.target, job.name.as_str())) {
                Some(&paired) if *paired != own => {
                    retyped.push(own);
                    paired.clone()
                }
                _ => own,
            };
            if current.contains_key(&key) {
                duplicates.push(job);
            } else {
                current.insert(key, job);
            }
        }

        for job in duplicates {
            info!(job = %job.key(), "Deleting duplicate scan job");
            match self.delete(&job).await {
                Ok(()) => outcome.deleted += 1,
                Err(e) => {
                    error!(job = %job.key(), error = %e, "Failed to delete duplicate scan job");
                    self.emit(owner, EventType::Warning, reason::MUTATION_FAILED, e.to_string(), now)
                        .await;
                    outcome.errors.push(e);
                }
            }
        }

        for key in &retyped {
            self.tracker.forget(key);
        }

        let pairs: BTreeSet<PairKey> = desired.keys().chain(current.keys()).cloned().collect();
        let mut transitions: Vec<(PairKey, Transition)> = pairs
            .into_iter()
            .map(|key| {
                let transition = scheduler::decide(current.get(&key), desired.get(&key), now);
                (key, transition)
            })
            .collect();
        transitions.sort_by_key(|(_, t)| !matches!(t.decision, Decision::Delete(_)));

        for (key, transition) in transitions {
            let from: PairState = transition.from;

            let applied: Result<Option<DateTime<Utc>>, MutationError> = match &transition.decision {
                Decision::Create(job) => self.create(job).await.map(|()| Some(job.last_triggered)),
                Decision::Update { job, .. } | Decision::Retrigger(job) => {
                    self.update(job).await.map(|()| Some(job.last_triggered))
                }
                Decision::Delete(job) => self.delete(job).await.map(|()| None),
                Decision::Skip => Ok(current.get(&key).map(|job| job.last_triggered)),
            };

            match applied {
                Ok(last_triggered) => {
                    self.count(&transition.decision, &mut outcome);
                    match last_triggered {
                        Some(at) if !matches!(transition.decision, Decision::Delete(_)) => {
                            self.tracker.record_success(key.clone(), from, at)
                        }
                        _ => self.tracker.forget(&key),
                    }
                    if let Some((reason, message)) = describe(&transition.decision) {
                        info!(pair = %key.target, scan_type = %key.scan_type, %from, "{message}");
                        self.emit(owner, EventType::Normal, reason, message, now).await;
                    } else {
                        debug!(pair = %key.target, scan_type = %key.scan_type, %from, "Scan job up to date");
                    }
                }
                Err(e) => {
                    error!(pair = %key.target, scan_type = %key.scan_type, error = %e, "Scan job mutation failed");
                    self.tracker.record_failure(key.clone(), from, e.to_string());
                    self.emit(owner, EventType::Warning, reason::MUTATION_FAILED, e.to_string(), now)
                        .await;
                    outcome.errors.push(e);
                }
            }
        }

        if resolved.targets.is_empty() && outcome.is_success() {
            self.tracker.forget_owner(owner);
        }

        outcome
    }

    async fn create(&self, job: &ScanJob) -> Result<(), MutationError> {
        let client: &dyn ScanJobClient = self.client.as_ref();
        self.executor
            .run(MutationKind::Create, &job.key(), || async move { client.create(job).await })
            .await
    }

    async fn update(&self, job: &ScanJob) -> Result<(), MutationError> {
        let client: &dyn ScanJobClient = self.client.as_ref();
        self.executor
            .run(MutationKind::Update, &job.key(), || async move { client.update(job).await })
            .await
    }

    /// A job that is already gone counts as deleted.
    async fn delete(&self, job: &ScanJob) -> Result<(), MutationError> {
        let client: &dyn ScanJobClient = self.client.as_ref();
        self.executor
            .run(MutationKind::Delete, &job.key(), || async move {
                match client.delete(&job.namespace, &job.name).await {
                    Err(ClientError::NotFound(_)) => Ok(()),
                    other => other,
                }
            })
            .await
    }

    fn count(&self, decision: &Decision, outcome: &mut ReconcileOutcome) {
        match decision {
            Decision::Create(_) => outcome.created += 1,
            Decision::Update { .. } => outcome.updated += 1,
            Decision::Retrigger(_) => outcome.retriggered += 1,
            Decision::Delete(_) => outcome.deleted += 1,
            Decision::Skip => outcome.unchanged += 1,
        }
    }

    async fn emit(
        &self,
        owner: &OwnerRef,
        event_type: EventType,
        reason: &str,
        message: String,
        timestamp: DateTime<Utc>,
    ) {
        self.recorder
            .record(Event {
                owner: owner.clone(),
                event_type,
                reason: reason.to_string(),
                message,
                timestamp,
            })
            .await;
    }
}

fn describe(decision: &Decision) -> Option<(&'static str, String)> {
    match decision {
        Decision::Create(job) => Some((reason::CREATED, format!("Created scan job {}", job.key()))),
        Decision::Update { job, restamped } => Some((
            reason::UPDATED,
            if *restamped {
                format!("Updated and re-triggered scan job {}", job.key())
            } else {
                format!("Updated scan job {}", job.key())
            },
        )),
        Decision::Retrigger(job) => Some((
            reason::RETRIGGERED,
            format!("Re-triggered scan job {}", job.key()),
        )),
        Decision::Delete(job) => Some((reason::DELETED, format!("Deleted scan job {}", job.key()))),
        Decision::Skip => None,
    }
}

/// The core bound to one target kind.
pub struct Reconciler<B> {
    core: Arc<ReconcileCore>,
    _binding: PhantomData<B>,
}

impl<B: TargetBinding> Reconciler<B> {
    pub fn new(core: Arc<ReconcileCore>) -> Self {
        Self {
            core,
            _binding: PhantomData,
        }
    }

    pub fn kind(&self) -> TargetKind {
        B::KIND
    }

    pub async fn reconcile(&self, owner: &OwnerRef, resolved: &Resolved) -> ReconcileOutcome {
        let mut outcome: ReconcileOutcome = self.core.reconcile(owner, resolved).await;
        if outcome.is_success() {
            outcome.requeue_after = B::resync_after(self.core.policy(), resolved);
        }
        outcome
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
