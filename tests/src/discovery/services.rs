use autoscan_common::cluster::{
    ClusterEvent, MANAGED_BY_LABEL, MANAGED_BY_VALUE, OwnerRef, Service, ServicePort,
    TARGET_KIND_LABEL,
};
use autoscan_core::cluster::reason;
use autoscan_core::inclusion::{ENABLED_MARKER, IGNORE_MARKER};

use crate::support::{Harness, POLICY, opted_in, opted_in_namespace, start, web};

#[tokio::test(start_paused = true)]
async fn service_without_marker_is_never_scanned() {
    let h = Harness::new();
    h.observe([ClusterEvent::ServiceApplied(web("default"))]);

    let outcomes = h.pass().await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].1.mutations(), 0);
    assert!(h.cluster.jobs().is_empty());
    assert_eq!(h.cluster.counts().creates, 0);
}

#[tokio::test(start_paused = true)]
async fn opted_in_service_gets_one_job_per_port() {
    let h = Harness::new();
    h.observe([ClusterEvent::ServiceApplied(opted_in(web("default")))]);
    h.pass().await;

    let jobs = h.cluster.jobs();
    let names: Vec<&str> = jobs.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["web-port-443", "web-port-80"]);

    let http = h.cluster.job("default", "web-port-80").unwrap();
    assert_eq!(http.parameters, vec!["-p", "80", "web.default.svc"]);
    assert_eq!(http.scan_type, "nmap");
    assert_eq!(http.last_triggered, start());
    assert_eq!(http.labels[MANAGED_BY_LABEL], MANAGED_BY_VALUE);
    assert_eq!(http.labels[TARGET_KIND_LABEL], "service");

    let created = h
        .cluster
        .events()
        .iter()
        .filter(|e| e.reason == reason::CREATED)
        .count();
    assert_eq!(created, 2);
}

#[tokio::test(start_paused = true)]
async fn unchanged_cluster_needs_no_second_mutation() {
    let h = Harness::new();
    h.observe([ClusterEvent::ServiceApplied(opted_in(web("default")))]);
    h.pass().await;
    let before = h.cluster.jobs();

    h.cluster.reset_counts();
    let outcomes = h.pass().await;

    assert_eq!(outcomes[0].1.unchanged, 2);
    assert_eq!(h.cluster.counts().mutations(), 0);
    assert_eq!(h.cluster.jobs(), before);
}

#[tokio::test(start_paused = true)]
async fn opting_out_deletes_existing_jobs() {
    let h = Harness::new();
    h.observe([ClusterEvent::ServiceApplied(opted_in(web("default")))]);
    h.pass().await;
    assert_eq!(h.cluster.jobs().len(), 2);

    h.observe([ClusterEvent::ServiceApplied(
        web("default").with_annotation(ENABLED_MARKER, "false"),
    )]);
    let outcomes = h.pass().await;

    assert_eq!(outcomes[0].1.deleted, 2);
    assert!(h.cluster.jobs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn deleted_service_drops_jobs_and_tracking() {
    let h = Harness::new();
    h.observe([ClusterEvent::ServiceApplied(opted_in(web("default")))]);
    h.pass().await;
    assert_eq!(h.controller.tracker().len(), 2);

    let keys = h.controller.observe(ClusterEvent::ServiceDeleted {
        namespace: "default".into(),
        name: "web".into(),
    });
    assert_eq!(keys, vec![OwnerRef::service("default", "web")]);

    let outcome = h.controller.reconcile_key(&keys[0]).await;
    assert_eq!(outcome.deleted, 2);
    assert!(h.cluster.jobs().is_empty());
    assert!(h.controller.tracker().is_empty());
}

#[tokio::test(start_paused = true)]
async fn namespace_marker_includes_every_service_inside() {
    let h = Harness::new();
    h.observe([
        ClusterEvent::NamespaceApplied(opted_in_namespace("team-a")),
        ClusterEvent::ServiceApplied(web("team-a")),
        ClusterEvent::ServiceApplied(web("team-b")),
    ]);
    h.pass().await;

    let namespaces: Vec<String> = h.cluster.jobs().into_iter().map(|j| j.namespace).collect();
    assert_eq!(namespaces, vec!["team-a", "team-a"]);
    let job = h.cluster.job("team-a", "web-port-80").unwrap();
    assert_eq!(job.parameters[2], "web.team-a.svc");
}

#[tokio::test(start_paused = true)]
async fn service_marker_beats_namespace_marker() {
    let h = Harness::new();
    h.observe([
        ClusterEvent::NamespaceApplied(opted_in_namespace("team-a")),
        ClusterEvent::ServiceApplied(web("team-a").with_annotation(IGNORE_MARKER, "true")),
    ]);
    h.pass().await;

    assert!(h.cluster.jobs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn malformed_marker_excludes_the_service() {
    let h = Harness::with_policy(&POLICY.replace("mode: enabled-per-resource", "mode: all"));
    h.observe([
        ClusterEvent::ServiceApplied(web("default").with_annotation(ENABLED_MARKER, "yes please")),
        ClusterEvent::ServiceApplied(
            Service::new("default", "api").with_port(ServicePort::tcp("http", 8080)),
        ),
    ]);
    h.pass().await;

    let names: Vec<String> = h.cluster.jobs().into_iter().map(|j| j.name).collect();
    assert_eq!(names, vec!["api-port-8080"]);
}

#[tokio::test(start_paused = true)]
async fn long_names_sharing_a_prefix_get_separate_jobs() {
    let h = Harness::new();
    let shared: String = "a".repeat(60);
    h.observe([
        ClusterEvent::ServiceApplied(opted_in(
            Service::new("default", format!("{shared}x")).with_port(ServicePort::tcp("http", 80)),
        )),
        ClusterEvent::ServiceApplied(opted_in(
            Service::new("default", format!("{shared}y")).with_port(ServicePort::tcp("http", 80)),
        )),
    ]);
    let outcomes = h.pass().await;

    assert!(outcomes.iter().all(|(_, outcome)| outcome.is_success()));
    let jobs = h.cluster.jobs();
    assert_eq!(jobs.len(), 2);
    assert_ne!(jobs[0].name, jobs[1].name);
    assert!(jobs.iter().all(|j| j.name.len() <= 63));
}
