//! Authenticated HTTP(S) channel to the cluster API server
//!
//! TLS material comes from [`ClusterConfig`] and is fixed when the transport
//! is built. Only the configured CA is trusted, so an https host needs
//! `cluster_ca_certificate`. Tests (or callers with their own TLS setup) can hand in a
//! pre-built [`reqwest::Client`] through [`ProxyTransport::with_client`].

use std::fmt;
use std::time::Duration;

use reqwest::{Certificate, Client, Identity, Url};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{ClusterConfig, DEFAULT_TIMEOUT_SECS};
use crate::error::{Error, Result};

const USER_AGENT: &str = concat!("sealedsecret-provider/", env!("CARGO_PKG_VERSION"));
/// Upper bound on a response body read into memory.
pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// HTTP channel to one API server.
#[derive(Clone)]
pub struct ProxyTransport {
    base_url: String,
    http: Client,
    token: Option<String>,
    timeout: Duration,
    max_body: usize,
}

impl fmt::Debug for ProxyTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyTransport")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("max_body", &self.max_body)
            .finish()
    }
}

impl ProxyTransport {
    /// Build a rustls-backed transport from the cluster connection settings.
    pub fn new(cluster: &ClusterConfig) -> Result<Self> {
        if cluster.requires_ca() && cluster.cluster_ca_certificate.is_none() {
            return Err(Error::ConfigError(format!(
                "Cluster host '{}' uses https but no cluster_ca_certificate is configured",
                cluster.host.trim()
            )));
        }

        let mut builder = Client::builder()
            .use_rustls_tls()
            .timeout(cluster.timeout())
            .user_agent(USER_AGENT);

        if let Some(ca_pem) = &cluster.cluster_ca_certificate {
            let ca = Certificate::from_pem(ca_pem.as_bytes()).map_err(|e| {
                Error::ConfigError(format!("Invalid cluster CA certificate: {e}"))
            })?;
            builder = builder.tls_built_in_root_certs(false).add_root_certificate(ca);
        }

        if let (Some(cert), Some(key)) = (&cluster.client_certificate, &cluster.client_key) {
            // rustls identities are read from a single PEM bundle
            let mut bundle = Vec::with_capacity(cert.len() + key.len() + 1);
            bundle.extend_from_slice(cert.as_bytes());
            bundle.push(b'\n');
            bundle.extend_from_slice(key.as_bytes());
            let identity = Identity::from_pem(&bundle).map_err(|e| {
                Error::ConfigError(format!("Invalid client certificate or key: {e}"))
            })?;
            builder = builder.identity(identity);
        }

        let http = builder
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(&cluster.host, http)?
            .with_token(cluster.token.clone())
            .with_timeout(cluster.timeout()))
    }

    /// Wrap an existing HTTP client. `host` must be an absolute http(s) URL.
    pub fn with_client(host: &str, http: Client) -> Result<Self> {
        let host = host.trim();
        let url = Url::parse(host)
            .map_err(|e| Error::ConfigError(format!("Invalid cluster host '{host}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::ConfigError(format!(
                "Cluster host '{host}' must use http or https"
            )));
        }

        Ok(Self {
            base_url: host.trim_end_matches('/').to_string(),
            http,
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_body: MAX_BODY_SIZE,
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_body(mut self, limit: usize) -> Self {
        self.max_body = limit;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `path` on the API server and return the whole body.
    ///
    /// Cancelling `cancel` aborts the in-flight request. Non-success status
    /// codes, timeouts, truncated or oversized bodies and cancellation all
    /// surface as [`Error::NetworkError`].
    pub async fn get(&self, path: &str, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let url = format!("{}{}", self.base_url, path);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(url = %url, "Request cancelled");
                Err(Error::NetworkError(format!("request to {url} was cancelled")))
            }
            result = self.fetch(&url) => result,
        }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!(url = %url, "Sending request to k8s cluster");

        let mut request = self.http.get(url).timeout(self.timeout);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let mut response = request
            .send()
            .await
            .map_err(|e| Error::NetworkError(format!("request to k8s cluster failed: {e}")))?;
        let status = response.status();

        // Drain the body even for error responses so the connection can be reused
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            Error::NetworkError(format!("unable to read response from k8s cluster: {e}"))
        })? {
            if body.len() + chunk.len() > self.max_body {
                return Err(Error::NetworkError(format!(
                    "response from {url} exceeds {} bytes",
                    self.max_body
                )));
            }
            body.extend_from_slice(&chunk);
        }

        if !status.is_success() {
            return Err(Error::NetworkError(format!(
                "request to {url} failed with HTTP {status}"
            )));
        }

        debug!(url = %url, bytes = body.len(), "Received response from k8s cluster");
        Ok(body)
    }
}
