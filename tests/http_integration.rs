//! Integration tests for the API server client using wiremock
//!
//! These tests verify the HTTP client behavior against mocked endpoints,
//! ensuring proper handling of various response codes, pagination and a
//! complete aggregation pass over HTTP.

mod common;

use common::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vmsnap::assemble::ClusterSnapshotAssembler;
use vmsnap::correlate::EngineSettings;
use vmsnap::error::FetchError;
use vmsnap::kube::auth::KubeCredentials;
use vmsnap::kube::client::KubeClient;
use vmsnap::kube::http::TlsOptions;
use vmsnap::resource::{BatchExecutor, FetchRequest, ResourceClient, ResourceKind, ResponseCache};
use wiremock::matchers::{bearer_token, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> KubeClient {
    KubeClient::new(
        &server.uri(),
        KubeCredentials::resolve(Some("test-token".to_string()), None),
        Duration::from_secs(5),
        &TlsOptions::default(),
    )
    .expect("client should build")
}

/// Test module for HTTP client integration tests
mod http_client_tests {
    use super::*;

    /// Test successful GET request returns parsed JSON
    #[tokio::test]
    async fn test_get_success_returns_json() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/default/persistentvolumeclaims/disk-0"))
            .and(bearer_token("test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(claim("disk-0", "pvc-abc")))
            .mount(&server)
            .await;

        let request = FetchRequest::get(ResourceKind::PersistentVolumeClaim, Some("default"), "disk-0");
        let response = client(&server).get(&request).await.expect("Request should succeed");

        assert_eq!(response["spec"]["volumeName"], "pvc-abc");
    }

    /// Test 404 response is reported as not found
    #[tokio::test]
    async fn test_404_returns_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/apis/kubevirt.io/v1/namespaces/default/virtualmachineinstances/vm-1"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "kind": "Status",
                "status": "Failure",
                "reason": "NotFound",
                "code": 404
            })))
            .mount(&server)
            .await;

        let request = FetchRequest::get(ResourceKind::VirtualMachineInstance, Some("default"), "vm-1");
        let err = client(&server).get(&request).await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "virtualmachineinstances/default/vm-1 not found");
    }

    /// Test 403 and 500 responses keep their status
    #[tokio::test]
    async fn test_error_statuses_are_preserved() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/persistentvolumes/pvc-forbidden"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "kind": "Status",
                "reason": "Forbidden",
                "code": 403
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v1/persistentvolumes/pvc-broken"))
            .respond_with(ResponseTemplate::new(500).set_body_string("etcdserver: request timed out"))
            .mount(&server)
            .await;

        let client = client(&server);

        let forbidden = FetchRequest::get(ResourceKind::PersistentVolume, None, "pvc-forbidden");
        assert!(matches!(
            client.get(&forbidden).await,
            Err(FetchError::Status { status: 403, .. })
        ));

        let broken = FetchRequest::get(ResourceKind::PersistentVolume, None, "pvc-broken");
        assert!(matches!(
            client.get(&broken).await,
            Err(FetchError::Status { status: 500, .. })
        ));
    }

    /// Test malformed body is a decode error
    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/nodes/n1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .mount(&server)
            .await;

        let request = FetchRequest::get(ResourceKind::Node, None, "n1");
        assert!(matches!(
            client(&server).get(&request).await,
            Err(FetchError::Decode { .. })
        ));
    }

    /// Test unreachable server is a transport error
    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let client = KubeClient::new(
            "http://127.0.0.1:1",
            KubeCredentials::anonymous(),
            Duration::from_secs(2),
            &TlsOptions::default(),
        )
        .expect("client should build");

        let request = FetchRequest::list(ResourceKind::Node, None);
        assert!(matches!(
            client.get(&request).await,
            Err(FetchError::Transport { .. })
        ));
    }

    /// Test list pagination follows continue tokens
    #[tokio::test]
    async fn test_pagination_with_continue_token() {
        let server = MockServer::start().await;

        // First page
        Mock::given(method("GET"))
            .and(path("/apis/longhorn.io/v1beta2/namespaces/longhorn-system/replicas"))
            .and(query_param("limit", "500"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "ReplicaList",
                "metadata": {"continue": "page-2"},
                "items": [
                    replica("pvc-abc-r-1", "pvc-abc", "n1", "running"),
                    replica("pvc-abc-r-2", "pvc-abc", "n2", "running")
                ]
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        // Second page
        Mock::given(method("GET"))
            .and(path("/apis/longhorn.io/v1beta2/namespaces/longhorn-system/replicas"))
            .and(query_param("continue", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "ReplicaList",
                "metadata": {},
                "items": [replica("pvc-abc-r-3", "pvc-abc", "n3", "error")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = FetchRequest::list(ResourceKind::StorageReplica, Some("longhorn-system"));
        let response = client(&server).get(&request).await.expect("Request should succeed");

        let items = response["items"].as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[2]["metadata"]["name"], "pvc-abc-r-3");
        assert!(response["metadata"].get("continue").is_none());
    }
}

/// A full aggregation pass over HTTP
mod aggregation_tests {
    use super::*;

    async fn serve(server: &MockServer, route: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(route))
            .and(bearer_token("test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_snapshot_over_http() {
        let server = MockServer::start().await;

        serve(
            &server,
            "/apis/kubevirt.io/v1/virtualmachines",
            list(vec![vm("vm-1", "Running", Some("vm-1-disk-0")), vm("vm-2", "Stopped", None)]),
        )
        .await;
        serve(
            &server,
            "/api/v1/namespaces/default/persistentvolumeclaims/vm-1-disk-0",
            claim("vm-1-disk-0", "pvc-abc"),
        )
        .await;
        serve(&server, "/api/v1/persistentvolumes/pvc-abc", persistent_volume("pvc-abc")).await;
        serve(
            &server,
            "/apis/longhorn.io/v1beta2/namespaces/longhorn-system/volumes",
            list(vec![storage_volume("pvc-abc", "degraded")]),
        )
        .await;
        serve(
            &server,
            "/apis/longhorn.io/v1beta2/namespaces/longhorn-system/replicas",
            list(vec![
                replica("pvc-abc-r-1", "pvc-abc", "n1", "running"),
                replica("pvc-abc-r-2", "pvc-abc", "n2", "running"),
                replica("pvc-abc-r-3", "pvc-abc", "n3", "error"),
                replica("pvc-xyz-r-1", "pvc-xyz", "n1", "running"),
            ]),
        )
        .await;
        serve(
            &server,
            "/apis/longhorn.io/v1beta2/namespaces/longhorn-system/engines",
            list(vec![engine("pvc-abc")]),
        )
        .await;
        serve(
            &server,
            "/apis/longhorn.io/v1beta2/namespaces/longhorn-system/nodes",
            list(vec![storage_node("n1")]),
        )
        .await;
        serve(
            &server,
            "/apis/longhorn.io/v1beta2/namespaces/longhorn-system/volumeattachments/pvc-abc",
            attachment("pvc-abc"),
        )
        .await;
        serve(
            &server,
            "/apis/kubevirt.io/v1/namespaces/default/virtualmachineinstances/vm-1",
            instance("vm-1", json!({"uid-1": "n1"})),
        )
        .await;
        serve(
            &server,
            "/apis/kubevirt.io/v1/namespaces/default/virtualmachineinstancemigrations",
            list(vec![]),
        )
        .await;
        let pods = list(vec![pod("virt-launcher-vm-1-abcde", "uid-1", "n1", Some("vm-1-disk-0"))]);
        serve(&server, "/api/v1/namespaces/default/pods", pods.clone()).await;
        serve(&server, "/api/v1/pods", pods).await;
        serve(&server, "/api/v1/nodes", list(vec![compute_node("n1")])).await;

        let executor = BatchExecutor::new(Arc::new(client(&server)), Arc::new(ResponseCache::default()));
        let snapshot = ClusterSnapshotAssembler::new(executor, EngineSettings::default())
            .assemble(&CancellationToken::new())
            .await
            .expect("pass should succeed");

        assert_eq!(snapshot.vms.len(), 2);
        let vm = &snapshot.vms[0];
        assert!(vm.errors.is_empty(), "unexpected errors: {:?}", vm.errors);
        assert_eq!(vm.replicas.len(), 3);
        assert_eq!(vm.volume_robustness.as_deref(), Some("degraded"));
        assert_eq!(vm.pods[0].name.as_deref(), Some("virt-launcher-vm-1-abcde"));

        // Stopped VM without storage is emitted as discovered
        assert!(snapshot.vms[1].errors.is_empty());
        // Missing upgrade listing is absorbed
        assert!(snapshot.upgrade_info.is_none());

        assert_eq!(snapshot.nodes.len(), 1);
        assert_eq!(snapshot.nodes[0].running_pods, 1);
        assert!(snapshot.nodes[0].kubernetes_info.is_some());

        let health = snapshot.health_checks.unwrap();
        assert_eq!(health.warning_checks, 1);
    }
}
