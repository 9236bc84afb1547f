use autoscan_common::cluster::{ClusterEvent, OwnerRef, TargetKind};
use autoscan_common::utils::naming;
use autoscan_core::inclusion::ENABLED_MARKER;

use crate::support::{Harness, POLICY, nginx_pod, opted_in_namespace};

const DIGEST: &str = "docker.io/library/nginx@sha256:0d17b565c37bcbd895e9d92315a05c1c3c9a29f762b011a10c54a66cd53c9b31";

fn job_name() -> String {
    naming::container_job_name("docker.io/library/nginx:1.25", DIGEST)
}

#[tokio::test(start_paused = true)]
async fn container_job_renders_namespace_annotation() {
    let h = Harness::new();
    h.observe([
        ClusterEvent::NamespaceApplied(opted_in_namespace("ns1")),
        ClusterEvent::PodApplied(nginx_pod("ns1", "web-0", DIGEST)),
    ]);
    h.pass().await;

    let jobs = h.cluster.jobs();
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.name, job_name());
    assert_eq!(job.scan_type, "trivy-image");
    assert_eq!(job.parameters, vec![DIGEST]);
    assert_eq!(job.annotations["testAnnotation"], "ns1");
    assert_eq!(job.target.kind(), TargetKind::Container);
}

#[tokio::test(start_paused = true)]
async fn pods_sharing_an_image_share_one_job() {
    let h = Harness::new();
    h.observe([
        ClusterEvent::NamespaceApplied(opted_in_namespace("ns1")),
        ClusterEvent::PodApplied(nginx_pod("ns1", "web-0", DIGEST)),
        ClusterEvent::PodApplied(nginx_pod("ns1", "web-1", DIGEST)),
        ClusterEvent::PodApplied(nginx_pod("ns1", "web-2", DIGEST)),
    ]);
    let outcomes = h.pass().await;

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].1.created, 1);
    assert_eq!(h.cluster.jobs().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn one_opted_in_pod_includes_the_image() {
    let h = Harness::new();
    h.observe([
        ClusterEvent::PodApplied(nginx_pod("ns1", "web-0", DIGEST)),
        ClusterEvent::PodApplied(
            nginx_pod("ns1", "web-1", DIGEST).with_annotation(ENABLED_MARKER, "true"),
        ),
    ]);
    h.pass().await;

    assert_eq!(h.cluster.jobs().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn last_pod_gone_deletes_the_job() {
    let h = Harness::new();
    h.observe([
        ClusterEvent::NamespaceApplied(opted_in_namespace("ns1")),
        ClusterEvent::PodApplied(nginx_pod("ns1", "web-0", DIGEST)),
        ClusterEvent::PodApplied(nginx_pod("ns1", "web-1", DIGEST)),
    ]);
    h.pass().await;
    let key = OwnerRef::container("ns1", DIGEST);

    h.observe([ClusterEvent::PodDeleted {
        namespace: "ns1".into(),
        name: "web-0".into(),
    }]);
    let outcome = h.controller.reconcile_key(&key).await;
    assert_eq!(outcome.unchanged, 1, "one running pod keeps the image alive");

    h.observe([ClusterEvent::PodDeleted {
        namespace: "ns1".into(),
        name: "web-1".into(),
    }]);
    let outcome = h.controller.reconcile_key(&key).await;
    assert_eq!(outcome.deleted, 1);
    assert!(h.cluster.jobs().is_empty());
    assert!(h.controller.tracker().is_empty());
}

#[tokio::test(start_paused = true)]
async fn image_rollout_replaces_the_job() {
    let next: &str = "docker.io/library/nginx@sha256:aaaa";
    let h = Harness::new();
    h.observe([
        ClusterEvent::NamespaceApplied(opted_in_namespace("ns1")),
        ClusterEvent::PodApplied(nginx_pod("ns1", "web-0", DIGEST)),
    ]);
    h.pass().await;

    let keys = h
        .controller
        .observe(ClusterEvent::PodApplied(nginx_pod("ns1", "web-0", next)));
    assert_eq!(keys.len(), 2, "old and new image are both touched");
    for key in &keys {
        h.controller.reconcile_key(key).await;
    }

    let jobs = h.cluster.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].parameters, vec![next]);
    assert_eq!(
        jobs[0].name,
        naming::container_job_name("docker.io/library/nginx:1.25", next)
    );
}

#[tokio::test(start_paused = true)]
async fn container_discovery_can_be_disabled() {
    let h = Harness::with_policy(&POLICY.replace(
        "containerAutoDiscovery:\n",
        "containerAutoDiscovery:\n  enabled: false\n",
    ));
    h.observe([
        ClusterEvent::NamespaceApplied(opted_in_namespace("ns1")),
        ClusterEvent::PodApplied(nginx_pod("ns1", "web-0", DIGEST)),
    ]);
    h.pass().await;

    assert!(h.cluster.jobs().is_empty());
}
