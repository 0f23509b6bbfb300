//! Resolution of the controller's current public key
//!
//! Nothing is cached between calls: a dynamic resolver fetches the
//! certificate every time. Callers that need one stable key for a whole
//! reconciliation pass resolve once and reuse the value.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::key::PublicKey;
use crate::cluster::{service_reference, ApiServerProxy, ClusterProxyClient};
use crate::config::ProviderConfig;
use crate::error::{Error, Result};

#[async_trait]
pub trait PublicKeyResolver: Send + Sync {
    async fn resolve(&self, cancel: &CancellationToken) -> Result<PublicKey>;
}

/// Key parsed once from PEM supplied in the provider configuration.
#[derive(Clone, Debug)]
pub struct StaticKeyResolver {
    key: PublicKey,
}

impl StaticKeyResolver {
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let key = PublicKey::from_pem(pem)?;
        info!(fingerprint = %key.fingerprint(), "Loaded static controller public key");
        Ok(Self { key })
    }
}

#[async_trait]
impl PublicKeyResolver for StaticKeyResolver {
    async fn resolve(&self, _cancel: &CancellationToken) -> Result<PublicKey> {
        Ok(self.key.clone())
    }
}

/// Fetches the certificate from the controller through the service proxy.
#[derive(Clone)]
pub struct ControllerKeyResolver {
    proxy: Arc<dyn ClusterProxyClient>,
    service: String,
    namespace: String,
    cert_path: String,
}

impl std::fmt::Debug for ControllerKeyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerKeyResolver")
            .field("service", &self.service)
            .field("namespace", &self.namespace)
            .field("cert_path", &self.cert_path)
            .finish_non_exhaustive()
    }
}

impl ControllerKeyResolver {
    pub fn new(
        proxy: Arc<dyn ClusterProxyClient>,
        service: impl Into<String>,
        namespace: impl Into<String>,
        cert_path: impl Into<String>,
    ) -> Self {
        Self {
            proxy,
            service: service.into(),
            namespace: namespace.into(),
            cert_path: cert_path.into(),
        }
    }

    /// Fetch the raw PEM served by the controller.
    pub async fn fetch_pem(&self, cancel: &CancellationToken) -> Result<Vec<u8>> {
        debug!(
            service = %self.service,
            namespace = %self.namespace,
            path = %self.cert_path,
            "Fetching controller certificate"
        );
        self.proxy
            .get(cancel, &self.service, &self.namespace, &self.cert_path)
            .await
    }
}

#[async_trait]
impl PublicKeyResolver for ControllerKeyResolver {
    async fn resolve(&self, cancel: &CancellationToken) -> Result<PublicKey> {
        let pem = self.fetch_pem(cancel).await?;
        let key = PublicKey::from_pem(&pem)?;
        debug!(
            service = %self.service,
            fingerprint = %key.fingerprint(),
            "Resolved controller public key"
        );
        Ok(key)
    }
}

/// Build the resolver described by `config`.
///
/// A static `pem` takes precedence over a cluster connection.
pub fn resolver_from_config(config: &ProviderConfig) -> Result<Arc<dyn PublicKeyResolver>> {
    if let Some(pem) = &config.pem {
        return Ok(Arc::new(StaticKeyResolver::from_pem(pem.as_bytes())?));
    }

    let cluster = config.cluster.as_ref().ok_or_else(|| {
        Error::ConfigError("no `pem` and no `cluster` connection configured".to_string())
    })?;
    let proxy = ApiServerProxy::from_config(cluster)?;
    Ok(Arc::new(controller_resolver(config, Arc::new(proxy))))
}

/// Controller resolver for `config` on top of an arbitrary proxy client.
pub fn controller_resolver(
    config: &ProviderConfig,
    proxy: Arc<dyn ClusterProxyClient>,
) -> ControllerKeyResolver {
    let service = service_reference(
        config.controller_scheme.as_deref(),
        &config.controller_name,
        config.controller_port.as_deref(),
    );
    ControllerKeyResolver::new(
        proxy,
        service,
        config.controller_namespace.clone(),
        config.cert_path.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const CONTROLLER_CERT: &str = include_str!("../../tests/fixtures/controller.crt");
    const ROTATED_CERT: &str = include_str!("../../tests/fixtures/rotated.crt");

    /// Serves a fixed sequence of responses and records the requested targets.
    struct ScriptedProxy {
        responses: Mutex<Vec<Result<Vec<u8>>>>,
        calls: Mutex<Vec<(String, String, String)>>,
    }

    impl ScriptedProxy {
        fn new(responses: Vec<Result<Vec<u8>>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ClusterProxyClient for ScriptedProxy {
        async fn get(
            &self,
            _cancel: &CancellationToken,
            name: &str,
            namespace: &str,
            path: &str,
        ) -> Result<Vec<u8>> {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), namespace.to_string(), path.to_string()));
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn resolver_with(proxy: Arc<ScriptedProxy>) -> ControllerKeyResolver {
        controller_resolver(&ProviderConfig::default(), proxy)
    }

    #[tokio::test]
    async fn test_static_resolver() {
        let resolver = StaticKeyResolver::from_pem(CONTROLLER_CERT.as_bytes()).unwrap();
        let cancel = CancellationToken::new();
        let first = resolver.resolve(&cancel).await.unwrap();
        let second = resolver.resolve(&cancel).await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_static_resolver_rejects_bad_pem() {
        assert!(matches!(
            StaticKeyResolver::from_pem(b"nope"),
            Err(Error::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_controller_resolver_uses_configured_target() {
        let proxy = Arc::new(ScriptedProxy::new(vec![Ok(CONTROLLER_CERT
            .as_bytes()
            .to_vec())]));
        let resolver = resolver_with(proxy.clone());

        let key = resolver.resolve(&CancellationToken::new()).await.unwrap();
        assert_eq!(key.bits(), 2048);

        let calls = proxy.calls.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            &[(
                "sealed-secret-controller-sealed-secrets".to_string(),
                "kube-system".to_string(),
                "/v1/cert.pem".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_controller_resolver_refetches_every_call() {
        let proxy = Arc::new(ScriptedProxy::new(vec![
            Ok(CONTROLLER_CERT.as_bytes().to_vec()),
            Ok(ROTATED_CERT.as_bytes().to_vec()),
        ]));
        let resolver = resolver_with(proxy.clone());
        let cancel = CancellationToken::new();

        let first = resolver.resolve(&cancel).await.unwrap();
        let second = resolver.resolve(&cancel).await.unwrap();
        assert_ne!(first.fingerprint(), second.fingerprint());
        assert_eq!(proxy.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_network_error_propagated() {
        let proxy = Arc::new(ScriptedProxy::new(vec![Err(Error::NetworkError(
            "connection refused".to_string(),
        ))]));
        let err = resolver_with(proxy)
            .resolve(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, Error::NetworkError("connection refused".to_string()));
    }

    #[tokio::test]
    async fn test_malformed_body_is_config_error() {
        let proxy = Arc::new(ScriptedProxy::new(vec![Ok(b"<html>502</html>".to_vec())]));
        let err = resolver_with(proxy)
            .resolve(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_scheme_and_port_in_service_reference() {
        let proxy = Arc::new(ScriptedProxy::new(vec![Ok(CONTROLLER_CERT
            .as_bytes()
            .to_vec())]));
        let config = ProviderConfig {
            controller_scheme: Some("http".to_string()),
            controller_port: Some("8080".to_string()),
            ..Default::default()
        };
        controller_resolver(&config, proxy.clone())
            .resolve(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            proxy.calls.lock().unwrap()[0].0,
            "http:sealed-secret-controller-sealed-secrets:8080"
        );
    }

    #[tokio::test]
    async fn test_resolver_from_config_prefers_pem() {
        let config = ProviderConfig {
            pem: Some(CONTROLLER_CERT.to_string()),
            cluster: Some(crate::config::ClusterConfig::new("http://localhost:1")),
            ..Default::default()
        };
        let resolver = resolver_from_config(&config).unwrap();
        // A cluster fetch would fail against localhost:1
        assert!(resolver.resolve(&CancellationToken::new()).await.is_ok());
    }

    #[test]
    fn test_resolver_from_config_requires_source() {
        assert!(matches!(
            resolver_from_config(&ProviderConfig::default()),
            Err(Error::ConfigError(_))
        ));
    }
}
