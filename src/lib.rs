//! Sealed secret provider
//!
//! Seals Kubernetes Secrets against the public key of a sealed-secrets
//! controller and detects when that key is rotated, so stale ciphertext is
//! re-sealed instead of silently persisting.
//!
//! The key is fetched through the API server's service proxy
//! ([`cluster`]), turned into a fingerprint ([`sealing::key`]), and compared
//! on every pass by the [`reconcile::Reconciler`]. Encryption itself is done
//! by an external [`sealing::Sealer`].

pub mod cluster;
pub mod config;
pub mod error;
pub mod reconcile;
pub mod sealing;

pub use crate::config::{ClusterConfig, ProviderConfig};
pub use crate::error::{Error, Result};
