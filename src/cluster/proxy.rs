//! Service-proxy client
//!
//! Reaches an HTTP endpoint of an in-cluster service through the API
//! server's `services/<name>/proxy` subresource:
//!
//! ```text
//! GET /api/v1/namespaces/{namespace}/services/{name}/proxy/{path}
//! ```
//!
//! Names are interpolated without encoding, so they are checked against the
//! Kubernetes naming rules first. `..` segments are refused in `path` since
//! URL normalization would lift them out of the proxy subresource.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::transport::ProxyTransport;
use crate::config::ClusterConfig;
use crate::error::{Error, Result};

/// Capability to GET a path on an in-cluster service.
#[async_trait]
pub trait ClusterProxyClient: Send + Sync {
    /// Fetch `path` from service `name` in `namespace` and return the full body.
    async fn get(
        &self,
        cancel: &CancellationToken,
        name: &str,
        namespace: &str,
        path: &str,
    ) -> Result<Vec<u8>>;
}

/// Render a service reference for the proxy subresource.
///
/// With neither scheme nor port this is just the service name; otherwise the
/// API server's `scheme:name:port` form is used (empty parts allowed).
pub fn service_reference(scheme: Option<&str>, name: &str, port: Option<&str>) -> String {
    match (scheme, port) {
        (None, None) => name.to_string(),
        (scheme, port) => format!(
            "{}:{}:{}",
            scheme.unwrap_or_default(),
            name,
            port.unwrap_or_default()
        ),
    }
}

/// API path that proxies `path` to service `name` in `namespace`.
pub fn service_proxy_path(name: &str, namespace: &str, path: &str) -> String {
    format!(
        "/api/v1/namespaces/{namespace}/services/{name}/proxy/{}",
        path.trim_start_matches('/')
    )
}

/// Check `namespace` and the (possibly `scheme:name:port`) service reference.
///
/// Every part must be lowercase alphanumerics, `-` or `.`; scheme and port may
/// be empty.
pub fn validate_proxy_target(name: &str, namespace: &str, path: &str) -> Result<()> {
    if name.is_empty() || namespace.is_empty() {
        return Err(Error::ConfigError(
            "service name and namespace are required for a proxy request".to_string(),
        ));
    }
    if !is_dns_name(namespace) {
        return Err(Error::ConfigError(format!(
            "invalid namespace '{namespace}' for a proxy request"
        )));
    }

    let service_ok = match name.split(':').collect::<Vec<_>>().as_slice() {
        [service] => is_dns_name(service),
        [scheme, service, port] => {
            is_dns_name(service)
                && (scheme.is_empty() || is_dns_name(scheme))
                && (port.is_empty() || is_dns_name(port))
        }
        _ => false,
    };
    if !service_ok {
        return Err(Error::ConfigError(format!(
            "invalid service reference '{name}' for a proxy request"
        )));
    }

    if path.split('/').any(|segment| segment == "..") {
        return Err(Error::ConfigError(format!(
            "proxy path '{path}' must not contain '..' segments"
        )));
    }
    Ok(())
}

fn is_dns_name(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 253
        && value
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
}

/// [`ClusterProxyClient`] backed by a real API server connection.
#[derive(Clone, Debug)]
pub struct ApiServerProxy {
    transport: ProxyTransport,
}

impl ApiServerProxy {
    pub fn new(transport: ProxyTransport) -> Self {
        Self { transport }
    }

    pub fn from_config(cluster: &ClusterConfig) -> Result<Self> {
        let transport = ProxyTransport::new(cluster)?;
        info!(host = %transport.base_url(), "Configured k8s API server proxy");
        Ok(Self::new(transport))
    }
}

#[async_trait]
impl ClusterProxyClient for ApiServerProxy {
    async fn get(
        &self,
        cancel: &CancellationToken,
        name: &str,
        namespace: &str,
        path: &str,
    ) -> Result<Vec<u8>> {
        validate_proxy_target(name, namespace, path)?;

        let api_path = service_proxy_path(name, namespace, path);
        debug!(service = %name, namespace = %namespace, path = %path, "Proxying request to service");

        self.transport.get(&api_path, cancel).await
    }
}
