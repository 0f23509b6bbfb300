//! End-to-end reconciliation against a fake API server.
//!
//! The mock server answers the service-proxy path exactly as a cluster would
//! when the sealed-secrets controller publishes its certificate.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use sealedsecret_provider::cluster::{ApiServerProxy, ProxyTransport};
use sealedsecret_provider::reconcile::{Reconciler, ResourceState, Severity};
use sealedsecret_provider::sealing::{
    controller_resolver, CanonicalSecret, PublicKey, Sealer, SecretSpec, StaticKeyResolver,
};
use sealedsecret_provider::{Error, ProviderConfig, Result};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONTROLLER_CERT: &str = include_str!("fixtures/controller.crt");
const ROTATED_CERT: &str = include_str!("fixtures/rotated.crt");
const CERT_PROXY_PATH: &str =
    "/api/v1/namespaces/kube-system/services/sealed-secret-controller-sealed-secrets/proxy/v1/cert.pem";

const CONTROLLER_FINGERPRINT: &str =
    "7d7b9f2652fc6e072299dfa0d0f2e8c0409885acb684558f1ef3052432b76a11";
const ROTATED_FINGERPRINT: &str =
    "dc8c7fb34fab15c19e7fadccef8ab254a44324cb244a5e4f909b64ab18a95510";

/// Emits a JSON document listing the sealed keys and the key fingerprint.
struct ManifestSealer;

impl Sealer for ManifestSealer {
    fn seal(&self, secret: &CanonicalSecret, key: &PublicKey) -> Result<Vec<u8>> {
        let doc = serde_json::json!({
            "name": secret.name,
            "namespace": secret.namespace,
            "keys": secret.data.keys().collect::<Vec<_>>(),
            "sealedWith": key.fingerprint().to_string(),
        });
        serde_json::to_vec(&doc).map_err(|e| Error::SealError(e.to_string()))
    }
}

async fn serve_cert(server: &MockServer, pem: &str) {
    server.reset().await;
    Mock::given(method("GET"))
        .and(path(CERT_PROXY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(pem))
        .mount(server)
        .await;
}

fn reconciler_for(server: &MockServer) -> Reconciler<ManifestSealer> {
    let transport = ProxyTransport::with_client(&server.uri(), Client::new()).unwrap();
    let proxy = Arc::new(ApiServerProxy::new(transport));
    let resolver = controller_resolver(&ProviderConfig::default(), proxy);
    Reconciler::new(Arc::new(resolver), ManifestSealer)
}

fn db_spec() -> SecretSpec {
    SecretSpec::new("db", "default")
        .with_data("user", "admin")
        .with_binary_data("cert", BASE64.encode("ABC"))
}

#[tokio::test]
async fn test_create_then_detect_rotation_then_recreate() {
    let server = MockServer::start().await;
    serve_cert(&server, CONTROLLER_CERT).await;
    let reconciler = reconciler_for(&server);
    let cancel = CancellationToken::new();

    // Create
    let created = reconciler
        .reconcile(ResourceState::Absent, &db_spec(), &cancel)
        .await;
    assert!(created.diagnostics.is_empty(), "{:?}", created.diagnostics);
    let resource = created.state.resource().unwrap().clone();
    assert_eq!(resource.id, "db");
    assert_eq!(resource.fingerprint.as_str(), CONTROLLER_FINGERPRINT);
    let artifact: serde_json::Value = serde_json::from_slice(&resource.artifact).unwrap();
    assert_eq!(artifact["keys"], serde_json::json!(["cert", "user"]));

    // Unchanged key: artifact kept
    let kept = reconciler
        .reconcile(created.state.clone(), &db_spec(), &cancel)
        .await;
    assert_eq!(kept.state, created.state);

    // Controller rotates its key
    serve_cert(&server, ROTATED_CERT).await;
    let rotated = reconciler
        .reconcile(kept.state, &db_spec(), &cancel)
        .await;
    assert_eq!(rotated.state, ResourceState::Absent);
    assert_eq!(rotated.diagnostics[0].severity, Severity::Warning);

    // Orchestrator recreates
    let recreated = reconciler
        .reconcile(rotated.state, &db_spec(), &cancel)
        .await;
    let resource = recreated.state.resource().unwrap();
    assert_eq!(resource.fingerprint.as_str(), ROTATED_FINGERPRINT);
    let artifact: serde_json::Value = serde_json::from_slice(&resource.artifact).unwrap();
    assert_eq!(artifact["sealedWith"], ROTATED_FINGERPRINT);
}

#[tokio::test]
async fn test_controller_unavailable_leaves_resource_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CERT_PROXY_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("no endpoints available"))
        .mount(&server)
        .await;

    let outcome = reconciler_for(&server)
        .reconcile(ResourceState::Absent, &db_spec(), &CancellationToken::new())
        .await;

    assert_eq!(outcome.state, ResourceState::Absent);
    assert!(outcome.has_errors());
    assert!(outcome.diagnostics[0].detail.contains("503"));
}

#[tokio::test]
async fn test_controller_outage_keeps_existing_artifact() {
    let server = MockServer::start().await;
    serve_cert(&server, CONTROLLER_CERT).await;
    let reconciler = reconciler_for(&server);
    let cancel = CancellationToken::new();

    let created = reconciler
        .reconcile(ResourceState::Absent, &db_spec(), &cancel)
        .await
        .state;

    server.reset().await;
    let outcome = reconciler.reconcile(created.clone(), &db_spec(), &cancel).await;
    assert!(outcome.has_errors());
    assert_eq!(outcome.state, created);
}

#[tokio::test]
async fn test_cancelled_pass_reports_network_error() {
    let server = MockServer::start().await;
    serve_cert(&server, CONTROLLER_CERT).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = reconciler_for(&server)
        .reconcile(ResourceState::Absent, &db_spec(), &cancel)
        .await;
    assert_eq!(outcome.state, ResourceState::Absent);
    assert_eq!(outcome.diagnostics[0].summary, "cluster request failed");
}

#[tokio::test]
async fn test_static_key_configuration() {
    let resolver = StaticKeyResolver::from_pem(CONTROLLER_CERT.as_bytes()).unwrap();
    let reconciler = Reconciler::new(Arc::new(resolver), ManifestSealer);

    let outcome = reconciler
        .reconcile(ResourceState::Absent, &db_spec(), &CancellationToken::new())
        .await;
    assert_eq!(
        outcome.state.resource().unwrap().fingerprint.as_str(),
        CONTROLLER_FINGERPRINT
    );
}
