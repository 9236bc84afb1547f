//! In-memory cluster backing both ports, with failure injection for tests.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use autoscan_common::cluster::{OwnerRef, ScanJob};
use autoscan_common::error::{ClientError, MutationKind};

use super::{Event, EventRecorder, ScanJobClient};

type JobKey = (String, String);

/// Call counters, one per port operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub lists: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl CallCounts {
    pub fn mutations(&self) -> usize {
        self.creates + self.updates + self.deletes
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCluster {
    jobs: Mutex<BTreeMap<JobKey, ScanJob>>,
    events: Mutex<Vec<Event>>,
    injected: Mutex<Vec<(MutationKind, ClientError)>>,
    latency: Mutex<Option<Duration>>,
    lists: AtomicUsize,
    creates: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a job without counting it as a mutation.
    pub fn insert(&self, job: ScanJob) {
        let key: JobKey = (job.namespace.clone(), job.name.clone());
        lock(&self.jobs).insert(key, job);
    }

    /// All jobs, ordered by `namespace/name`.
    pub fn jobs(&self) -> Vec<ScanJob> {
        lock(&self.jobs).values().cloned().collect()
    }

    pub fn job(&self, namespace: &str, name: &str) -> Option<ScanJob> {
        lock(&self.jobs)
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn events(&self) -> Vec<Event> {
        lock(&self.events).clone()
    }

    /// Fails the next `times` calls of `kind` with `error`.
    pub fn fail_next(&self, kind: MutationKind, error: ClientError, times: usize) {
        let mut injected = lock(&self.injected);
        for _ in 0..times {
            injected.push((kind, error.clone()));
        }
    }

    /// Every call sleeps this long before answering.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *lock(&self.latency) = latency;
    }

    pub fn counts(&self) -> CallCounts {
        CallCounts {
            lists: self.lists.load(Ordering::SeqCst),
            creates: self.creates.load(Ordering::SeqCst),
            updates: self.updates.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
        }
    }

    pub fn reset_counts(&self) {
        for counter in [&self.lists, &self.creates, &self.updates, &self.deletes] {
            counter.store(0, Ordering::SeqCst);
        }
    }

    async fn enter(&self, kind: MutationKind) -> Result<(), ClientError> {
        let counter: &AtomicUsize = match kind {
            MutationKind::List => &self.lists,
            MutationKind::Create => &self.creates,
            MutationKind::Update => &self.updates,
            MutationKind::Delete => &self.deletes,
        };
        counter.fetch_add(1, Ordering::SeqCst);

        let latency: Option<Duration> = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut injected = lock(&self.injected);
        match injected.iter().position(|(k, _)| *k == kind) {
            Some(index) => Err(injected.remove(index).1),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ScanJobClient for InMemoryCluster {
    async fn list_owned(&self, owner: &OwnerRef) -> Result<Vec<ScanJob>, ClientError> {
        self.enter(MutationKind::List).await?;
        Ok(lock(&self.jobs)
            .values()
            .filter(|job| job.owner() == owner)
            .cloned()
            .collect())
    }

    async fn create(&self, job: &ScanJob) -> Result<(), ClientError> {
        self.enter(MutationKind::Create).await?;
        let mut jobs = lock(&self.jobs);
        let key: JobKey = (job.namespace.clone(), job.name.clone());
        if jobs.contains_key(&key) {
            return Err(ClientError::Conflict(job.key()));
        }
        jobs.insert(key, job.clone());
        Ok(())
    }

    async fn update(&self, job: &ScanJob) -> Result<(), ClientError> {
        self.enter(MutationKind::Update).await?;
        let mut jobs = lock(&self.jobs);
        match jobs.get_mut(&(job.namespace.clone(), job.name.clone())) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(ClientError::NotFound(job.key())),
        }
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        self.enter(MutationKind::Delete).await?;
        match lock(&self.jobs).remove(&(namespace.to_string(), name.to_string())) {
            Some(_) => Ok(()),
            None => Err(ClientError::NotFound(format!("{namespace}/{name}"))),
        }
    }
}

#[async_trait]
impl EventRecorder for InMemoryCluster {
    async fn record(&self, event: Event) {
        lock(&self.events).push(event);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
