#![cfg(test)]
//! Shared fixtures: a policy, a manual clock and a controller wired to an in-memory cluster.

use std::sync::Arc;
use std::time::Duration;

use autoscan_common::cluster::{ClusterEvent, Namespace, OwnerRef, Pod, Service, ServicePort};
use autoscan_common::config::AutoDiscoveryConfig;
use autoscan_core::cluster::InMemoryCluster;
use autoscan_core::inclusion::ENABLED_MARKER;
use autoscan_core::reconciler::ReconcileOutcome;
use autoscan_core::{Controller, ManualClock, Policy};
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const POLICY: &str = r#"
cluster:
  name: test-cluster
serviceAutoDiscovery:
  passiveReconcileInterval: 1s
  scanConfig:
    scanType: nmap
    repeatInterval: 1h
    parameters: ["-p", "{{ .Host.Port }}", "{{ .Service.Name }}.{{ .Service.Namespace }}.svc"]
containerAutoDiscovery:
  scanConfig:
    scanType: trivy-image
    repeatInterval: 1h
    parameters: ["{{ .ImageID }}"]
    annotations:
      testAnnotation: "{{ .Namespace.Name }}"
resourceInclusion:
  mode: enabled-per-resource
controller:
  workers: 2
  mutationAttempts: 3
  backoff:
    initialDelay: 10ms
    maxDelay: 100ms
"#;

pub fn start() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

pub fn policy(yaml: &str) -> Arc<Policy> {
    let config = AutoDiscoveryConfig::from_yaml(yaml).unwrap();
    Arc::new(Policy::from_config(config).unwrap())
}

pub struct Harness {
    pub cluster: Arc<InMemoryCluster>,
    pub clock: Arc<ManualClock>,
    pub controller: Arc<Controller>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(POLICY)
    }

    pub fn with_policy(yaml: &str) -> Self {
        let cluster = Arc::new(InMemoryCluster::new());
        let clock = Arc::new(ManualClock::new(start()));
        Self::on(cluster, clock, yaml)
    }

    /// A fresh controller over an existing cluster, as after a restart with a new policy.
    pub fn on(cluster: Arc<InMemoryCluster>, clock: Arc<ManualClock>, yaml: &str) -> Self {
        let controller = Controller::new(policy(yaml), cluster.clone(), cluster.clone(), clock.clone());
        Self {
            cluster,
            clock,
            controller,
        }
    }

    pub fn observe(&self, events: impl IntoIterator<Item = ClusterEvent>) {
        for event in events {
            self.controller.observe(event);
        }
    }

    /// One sequential pass over every known key.
    pub async fn pass(&self) -> Vec<(OwnerRef, ReconcileOutcome)> {
        self.controller.reconcile_all().await
    }

    pub fn spawn(&self) -> Running {
        let (tx, rx) = mpsc::channel(64);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&self.controller).run(rx, shutdown.clone()));
        Running {
            events: tx,
            shutdown,
            handle,
        }
    }
}

pub struct Running {
    pub events: mpsc::Sender<ClusterEvent>,
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<anyhow::Result<()>>,
}

impl Running {
    pub async fn send(&self, event: ClusterEvent) {
        self.events.send(event).await.unwrap();
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        self.handle.await.unwrap().unwrap();
    }
}

/// Polls `condition` every 10ms of (possibly paused) tokio time, for at most `limit`.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub fn web(namespace: &str) -> Service {
    Service::new(namespace, "web")
        .with_port(ServicePort::tcp("http", 80))
        .with_port(ServicePort::tcp("https", 443))
}

pub fn opted_in(service: Service) -> Service {
    service.with_annotation(ENABLED_MARKER, "true")
}

pub fn opted_in_namespace(name: &str) -> Namespace {
    Namespace::new(name).with_annotation(ENABLED_MARKER, "true")
}

pub fn nginx_pod(namespace: &str, name: &str, image_id: &str) -> Pod {
    Pod::running(namespace, name).with_container("nginx", "docker.io/library/nginx:1.25", image_id)
}
