//! # Work Queue
//!
//! A deduplicating queue of reconcile keys with **single-writer-per-key** semantics:
//!
//! * a key waiting in the queue is stored once, however often it is added;
//! * a key being processed is never handed to a second worker;
//! * a key added while being processed is queued again once [`WorkQueue::done`] is called.
//!
//! Delayed adds keep only the earliest deadline per key, and failed keys are requeued with a
//! per-key exponential backoff until [`WorkQueue::forget`] resets them.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use autoscan_common::config::BackoffConfig;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub trait QueueKey: Clone + Eq + Hash + Send + Sync + 'static {}

impl<T> QueueKey for T where T: Clone + Eq + Hash + Send + Sync + 'static {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub queued: usize,
    pub processing: usize,
    pub delayed: usize,
}

impl QueueStats {
    /// Nothing queued and nothing in flight. Delayed keys do not count.
    pub fn is_idle(&self) -> bool {
        self.queued == 0 && self.processing == 0
    }
}

struct State<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    delayed: HashMap<K, Instant>,
    failures: HashMap<K, u32>,
    shutting_down: bool,
}

pub struct WorkQueue<K> {
    state: Mutex<State<K>>,
    notify: Notify,
    backoff: BackoffConfig,
    shutdown: CancellationToken,
}

impl<K: QueueKey> WorkQueue<K> {
    pub fn new(backoff: BackoffConfig) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                delayed: HashMap::new(),
                failures: HashMap::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            backoff,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn add(&self, key: K) {
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains(&key) {
            return;
        }
        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.notify.notify_one();
    }

    /// Adds `key` once `delay` has passed, unless an earlier delayed add is already pending.
    pub fn add_after(self: &Arc<Self>, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let deadline: Instant = Instant::now() + delay;
        {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }
            match state.delayed.get(&key) {
                Some(existing) if *existing <= deadline => return,
                _ => {
                    state.delayed.insert(key.clone(), deadline);
                }
            }
        }

        let queue: Arc<Self> = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = queue.shutdown.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    let fire: bool = {
                        let mut state = queue.lock();
                        let ours: bool = state.delayed.get(&key) == Some(&deadline);
                        if ours {
                            state.delayed.remove(&key);
                        }
                        ours
                    };
                    if fire {
                        queue.add(key);
                    }
                }
            }
        });
    }

    /// Requeues `key` after its per-key backoff and bumps its failure count.
    pub fn add_rate_limited(self: &Arc<Self>, key: K) {
        let attempt: u32 = {
            let mut state = self.lock();
            let failures = state.failures.entry(key.clone()).or_insert(0);
            *failures = failures.saturating_add(1);
            *failures
        };
        self.add_after(key, self.backoff.delay_for_attempt(attempt));
    }

    /// Clears the failure history of `key`.
    pub fn forget(&self, key: &K) {
        self.lock().failures.remove(key);
    }

    pub fn num_requeues(&self, key: &K) -> u32 {
        self.lock().failures.get(key).copied().unwrap_or(0)
    }

    /// Waits for the next key. `None` once the queue is shut down and drained.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    let more: bool = !state.queue.is_empty();
                    drop(state);
                    if more {
                        self.notify.notify_one();
                    }
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Marks `key` as processed, queueing it again if it was added meanwhile.
    pub fn done(&self, key: &K) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queue.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Rejects new keys, cancels delayed adds and wakes every waiting worker.
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.shutdown.cancel();
        self.notify.notify_waiters();
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            queued: state.queue.len(),
            processing: state.processing.len(),
            delayed: state.delayed.len(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<K>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
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
