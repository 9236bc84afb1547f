use std::time::Duration;

use autoscan_common::cluster::{ClusterEvent, OwnerRef, TargetRef};
use autoscan_common::error::{ClientError, MutationKind};
use autoscan_core::cluster::{EventType, reason};
use autoscan_core::scheduler::PairState;
use autoscan_core::tracker::PairKey;
use chrono::TimeDelta;

use crate::support::{
    Harness, POLICY, nginx_pod, opted_in, opted_in_namespace, start, wait_until, web,
};

const DIGEST: &str = "docker.io/library/nginx@sha256:1111";

fn cluster_events() -> Vec<ClusterEvent> {
    vec![
        ClusterEvent::NamespaceApplied(opted_in_namespace("ns1")),
        ClusterEvent::ServiceApplied(opted_in(web("default"))),
        ClusterEvent::PodApplied(nginx_pod("ns1", "web-0", DIGEST)),
    ]
}

#[tokio::test(start_paused = true)]
async fn triggers_respect_the_repeat_interval() {
    let h = Harness::new();
    h.observe([ClusterEvent::ServiceApplied(opted_in(web("default")))]);
    h.pass().await;

    h.clock.advance(Duration::from_secs(30 * 60));
    let outcomes = h.pass().await;
    assert_eq!(outcomes[0].1.mutations(), 0, "not due yet");

    h.clock.advance(Duration::from_secs(30 * 60));
    let outcomes = h.pass().await;
    assert_eq!(outcomes[0].1.retriggered, 2);

    let job = h.cluster.job("default", "web-port-80").unwrap();
    assert_eq!(job.last_triggered, start() + TimeDelta::hours(1));

    let outcomes = h.pass().await;
    assert_eq!(outcomes[0].1.mutations(), 0, "fresh trigger is not due again");
}

#[tokio::test(start_paused = true)]
async fn parameter_change_updates_matching_jobs_only() {
    let before = Harness::new();
    before.observe(cluster_events());
    before.pass().await;
    let container_job = before.cluster.jobs().into_iter().find(|j| j.scan_type == "trivy-image");
    let container_job = container_job.unwrap();

    let changed: String = POLICY.replace(r#"["-p", "{{ .Host.Port }}""#, r#"["-sV", "-p", "{{ .Host.Port }}""#);
    before.clock.advance(Duration::from_secs(60));
    let after = Harness::on(before.cluster.clone(), before.clock.clone(), &changed);
    after.observe(cluster_events());
    let outcomes = after.pass().await;

    let service = outcomes
        .iter()
        .find(|(owner, _)| *owner == OwnerRef::service("default", "web"))
        .map(|(_, outcome)| outcome)
        .unwrap();
    assert_eq!(service.updated, 2);

    let http = after.cluster.job("default", "web-port-80").unwrap();
    assert_eq!(http.parameters, vec!["-sV", "-p", "80", "web.default.svc"]);
    assert_eq!(http.last_triggered, start(), "trigger kept while not due");

    let untouched = after
        .cluster
        .job(&container_job.namespace, &container_job.name)
        .unwrap();
    assert_eq!(untouched, container_job);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_within_the_pass() {
    let h = Harness::new();
    h.cluster
        .fail_next(MutationKind::Create, ClientError::Transient("throttled".into()), 2);
    h.observe([ClusterEvent::ServiceApplied(opted_in(web("default")))]);

    let outcomes = h.pass().await;
    assert!(outcomes[0].1.is_success());
    assert_eq!(h.cluster.jobs().len(), 2);
    assert_eq!(h.cluster.counts().creates, 4);
}

#[tokio::test(start_paused = true)]
async fn rejected_mutation_is_reported_and_retried_next_pass() {
    let h = Harness::new();
    h.cluster
        .fail_next(MutationKind::Create, ClientError::Rejected("quota exceeded".into()), 1);
    h.observe([ClusterEvent::ServiceApplied(opted_in(web("default")))]);

    let outcomes = h.pass().await;
    let outcome = &outcomes[0].1;
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.created, 1);
    assert!(!outcome.is_success());
    assert_eq!(h.cluster.counts().creates, 2, "rejections are not retried");

    let warning = h
        .cluster
        .events()
        .into_iter()
        .find(|e| e.event_type == EventType::Warning)
        .unwrap();
    assert_eq!(warning.reason, reason::MUTATION_FAILED);
    assert!(warning.message.contains("quota exceeded"));

    let failing = PairKey::new(
        TargetRef {
            owner: OwnerRef::service("default", "web"),
            port: Some(80),
        },
        "nmap",
    );
    let status = h.controller.tracker().get(&failing).unwrap();
    assert_eq!(status.consecutive_failures, 1);
    assert_eq!(status.observed, PairState::Absent);

    let outcomes = h.pass().await;
    assert_eq!(outcomes[0].1.created, 1);
    assert_eq!(h.cluster.jobs().len(), 2);
    assert_eq!(h.controller.tracker().get(&failing).unwrap().consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn running_controller_converges_and_stops() {
    let h = Harness::new();
    let running = h.spawn();
    for event in cluster_events() {
        running.send(event).await;
    }

    assert!(wait_until(Duration::from_secs(5), || h.cluster.jobs().len() == 3).await);
    running.stop().await;

    assert!(h.controller.queue_stats().is_idle());
    assert!(h.controller.passes() >= 2);
}

#[tokio::test(start_paused = true)]
async fn passive_recheck_repairs_service_drift_only() {
    let h = Harness::new();
    let running = h.spawn();
    for event in cluster_events() {
        running.send(event).await;
    }
    assert!(wait_until(Duration::from_secs(5), || h.cluster.jobs().len() == 3).await);

    let mut service_job = h.cluster.job("default", "web-port-80").unwrap();
    service_job.parameters = vec!["--tampered".into()];
    h.cluster.insert(service_job);

    let mut container_job = h
        .cluster
        .jobs()
        .into_iter()
        .find(|j| j.scan_type == "trivy-image")
        .unwrap();
    container_job.parameters = vec!["--tampered".into()];
    h.cluster.insert(container_job.clone());

    let repaired = wait_until(Duration::from_secs(5), || {
        h.cluster.job("default", "web-port-80").unwrap().parameters[0] == "-p"
    })
    .await;
    assert!(repaired, "service jobs are rechecked every passive interval");

    let still = h
        .cluster
        .job(&container_job.namespace, &container_job.name)
        .unwrap();
    assert_eq!(still.parameters, vec!["--tampered"], "containers wait for an event");

    running.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failed_pass_is_requeued_with_backoff() {
    let h = Harness::new();
    h.cluster
        .fail_next(MutationKind::List, ClientError::Rejected("forbidden".into()), 1);
    let running = h.spawn();
    running
        .send(ClusterEvent::ServiceApplied(opted_in(web("default"))))
        .await;

    assert!(wait_until(Duration::from_secs(5), || h.cluster.jobs().len() == 2).await);
    running.stop().await;

    let list_failed = h
        .cluster
        .events()
        .into_iter()
        .any(|e| e.reason == reason::LIST_FAILED);
    assert!(list_failed);
}

#[tokio::test(start_paused = true)]
async fn scan_type_change_updates_jobs_in_place() {
    let before = Harness::new();
    before.observe([ClusterEvent::ServiceApplied(opted_in(web("default")))]);
    before.pass().await;

    let changed: String = POLICY.replace("scanType: nmap", "scanType: masscan");
    let after = Harness::on(before.cluster.clone(), before.clock.clone(), &changed);
    after.observe([ClusterEvent::ServiceApplied(opted_in(web("default")))]);
    after.cluster.reset_counts();
    let outcomes = after.pass().await;

    let outcome = &outcomes[0].1;
    assert!(outcome.is_success(), "{:?}", outcome.errors);
    assert_eq!(outcome.updated, 2);
    assert_eq!((outcome.created, outcome.deleted), (0, 0));
    assert_eq!(after.cluster.counts().mutations(), 2);

    let http = after.cluster.job("default", "web-port-80").unwrap();
    assert_eq!(http.scan_type, "masscan");
    assert_eq!(http.last_triggered, start());

    let masscan = PairKey::new(
        TargetRef {
            owner: OwnerRef::service("default", "web"),
            port: Some(80),
        },
        "masscan",
    );
    assert!(after.controller.tracker().get(&masscan).is_some());
    assert_eq!(after.controller.tracker().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_finishes_the_pass_in_flight() {
    let h = Harness::new();
    h.cluster.set_latency(Some(Duration::from_millis(200)));
    let running = h.spawn();
    running
        .send(ClusterEvent::ServiceApplied(opted_in(web("default"))))
        .await;

    assert!(wait_until(Duration::from_secs(5), || h.cluster.counts().creates == 1).await);
    assert!(h.cluster.jobs().is_empty(), "first create still in flight");
    running.stop().await;

    assert_eq!(h.cluster.jobs().len(), 2);
    assert!(h.controller.queue_stats().is_idle());
}
