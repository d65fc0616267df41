//! # Kubernetes Lease Store Against a Mock API Server
//!
//! Verifies request construction (paths, verbs, bearer token, optimistic
//! concurrency token) and status handling of [`KubeLeaseStore`].

use reaper_election::{ElectionError, KubeLeaseStore, Lease, LeaseSpec, LeaseStore};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LEASE_PATH: &str = "/apis/coordination.k8s.io/v1/namespaces/ops/leases/ec2-checker-leader";
const COLLECTION_PATH: &str = "/apis/coordination.k8s.io/v1/namespaces/ops/leases";

fn store(server: &MockServer) -> KubeLeaseStore {
    KubeLeaseStore::new(
        &server.uri(),
        "ops",
        "ec2-checker-leader",
        Some("sa-token".into()),
    )
    .expect("store")
}

fn lease_json(holder: &str, version: &str) -> serde_json::Value {
    serde_json::json!({
        "apiVersion": "coordination.k8s.io/v1",
        "kind": "Lease",
        "metadata": {
            "name": "ec2-checker-leader",
            "namespace": "ops",
            "resourceVersion": version
        },
        "spec": {
            "holderIdentity": holder,
            "leaseDurationSeconds": 15,
            "renewTime": "2026-05-01T10:00:00.000000Z"
        }
    })
}

#[tokio::test]
async fn missing_lease_reads_as_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LEASE_PATH))
        .and(header("authorization", "Bearer sa-token"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(store(&server).get().await.unwrap(), None);
}

#[tokio::test]
async fn existing_lease_is_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LEASE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(lease_json("pod-b", "42")))
        .mount(&server)
        .await;

    let lease = store(&server).get().await.unwrap().unwrap();
    assert_eq!(lease.spec.holder(), Some("pod-b"));
    assert_eq!(lease.metadata.resource_version.as_deref(), Some("42"));
}

#[tokio::test]
async fn create_posts_to_collection_and_maps_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COLLECTION_PATH))
        .and(body_partial_json(serde_json::json!({
            "kind": "Lease",
            "spec": { "holderIdentity": "pod-a" }
        })))
        .respond_with(ResponseTemplate::new(409))
        .expect(1)
        .mount(&server)
        .await;

    let lease = Lease::new(
        "ops",
        "ec2-checker-leader",
        LeaseSpec {
            holder_identity: Some("pod-a".into()),
            ..LeaseSpec::default()
        },
    );
    assert_eq!(store(&server).create(&lease).await, Err(ElectionError::Conflict));
}

#[tokio::test]
async fn update_carries_resource_version() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(LEASE_PATH))
        .and(body_partial_json(serde_json::json!({
            "metadata": { "resourceVersion": "42" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(lease_json("pod-a", "43")))
        .expect(1)
        .mount(&server)
        .await;

    let mut lease: Lease = serde_json::from_value(lease_json("pod-a", "42")).unwrap();
    lease.spec.lease_transitions = Some(1);
    let stored = store(&server).update(&lease).await.unwrap();
    assert_eq!(stored.metadata.resource_version.as_deref(), Some("43"));
}

#[tokio::test]
async fn forbidden_is_an_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LEASE_PATH))
        .respond_with(
            ResponseTemplate::new(403).set_body_string("leases.coordination.k8s.io is forbidden"),
        )
        .mount(&server)
        .await;

    match store(&server).get().await {
        Err(ElectionError::Api { status, body }) => {
            assert_eq!(status, 403);
            assert!(body.contains("forbidden"));
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn garbage_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LEASE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    assert!(matches!(
        store(&server).get().await,
        Err(ElectionError::Decode(_))
    ));
}
