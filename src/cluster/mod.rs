//! Access to the cluster API server
//!
//! [`ProxyTransport`] owns the authenticated HTTP channel; [`ApiServerProxy`]
//! uses it to reach services through the proxy subresource.

pub mod proxy;
pub mod transport;

pub use proxy::{
    service_proxy_path, service_reference, validate_proxy_target, ApiServerProxy, ClusterProxyClient,
};
pub use transport::{ProxyTransport, MAX_BODY_SIZE};
