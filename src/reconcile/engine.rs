//! Reconciliation of a sealed secret against the live controller key
//!
//! # States
//!
//! | From      | Transition | To        | When                                   |
//! |-----------|------------|-----------|----------------------------------------|
//! | `Absent`  | create     | `Present` | payload built, key resolved, sealed    |
//! | `Absent`  | create     | `Absent`  | any step failed (diagnostic reported)  |
//! | `Present` | refresh    | `Present` | key fingerprint unchanged              |
//! | `Present` | refresh    | `Absent`  | key fingerprint changed (rotation)     |
//! | `Present` | refresh    | `Present` | resolve failed, prior state kept       |
//! | any       | delete     | `Absent`  | always                                 |
//!
//! An `Absent` result after a rotation tells the orchestrator to create the
//! resource again, which seals the payload against the new key. Nothing is
//! retried here and no state is mutated in place: every pass returns a full
//! replacement.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::diagnostics::Diagnostic;
use crate::error::{Error, Result};
use crate::sealing::{build_secret, Fingerprint, PublicKeyResolver, Sealer, SecretSpec};

/// A successfully sealed secret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedResource {
    /// Resource identity (the secret name)
    pub id: String,
    /// Spec the resource was last reconciled with
    pub spec: SecretSpec,
    /// Opaque sealed content produced by the sealer
    pub artifact: Vec<u8>,
    /// Fingerprint of the key the artifact was sealed with
    pub fingerprint: Fingerprint,
    pub sealed_at: DateTime<Utc>,
}

impl SealedResource {
    /// Sealed content as text (sealed manifests are YAML/JSON).
    pub fn artifact_text(&self) -> String {
        String::from_utf8_lossy(&self.artifact).into_owned()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum ResourceState {
    #[default]
    Absent,
    Present(SealedResource),
}

impl ResourceState {
    pub fn is_present(&self) -> bool {
        matches!(self, ResourceState::Present(_))
    }

    pub fn resource(&self) -> Option<&SealedResource> {
        match self {
            ResourceState::Present(resource) => Some(resource),
            ResourceState::Absent => None,
        }
    }

    /// Resource identity; empty when absent.
    pub fn id(&self) -> &str {
        self.resource().map(|r| r.id.as_str()).unwrap_or_default()
    }
}

/// Outcome of one reconciliation pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reconciliation {
    pub state: ResourceState,
    pub diagnostics: Vec<Diagnostic>,
}

impl Reconciliation {
    fn clean(state: ResourceState) -> Self {
        Self {
            state,
            diagnostics: Vec::new(),
        }
    }

    fn with_diagnostic(state: ResourceState, diagnostic: Diagnostic) -> Self {
        Self {
            state,
            diagnostics: vec![diagnostic],
        }
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Drives create / refresh / delete for sealed secrets.
///
/// One reconciler can be shared by many resources; it holds no per-resource
/// state.
pub struct Reconciler<S> {
    resolver: Arc<dyn PublicKeyResolver>,
    sealer: S,
}

impl<S: Sealer> Reconciler<S> {
    pub fn new(resolver: Arc<dyn PublicKeyResolver>, sealer: S) -> Self {
        Self { resolver, sealer }
    }

    /// Reconcile `current` towards `desired`.
    ///
    /// `Absent` is created, `Present` is refreshed. Failures are reported as
    /// diagnostics; a failed create stays `Absent`, a failed refresh keeps the
    /// prior resource.
    pub async fn reconcile(
        &self,
        current: ResourceState,
        desired: &SecretSpec,
        cancel: &CancellationToken,
    ) -> Reconciliation {
        match current {
            ResourceState::Absent => match self.create(desired, cancel).await {
                Ok(resource) => Reconciliation::clean(ResourceState::Present(resource)),
                Err(e) => {
                    warn!(secret = %desired.name, namespace = %desired.namespace, error = %e, "Failed to create sealed secret");
                    Reconciliation::with_diagnostic(ResourceState::Absent, Diagnostic::from(&e))
                }
            },
            ResourceState::Present(resource) => match self.refresh(&resource, desired, cancel).await {
                Ok(ResourceState::Absent) => Reconciliation::with_diagnostic(
                    ResourceState::Absent,
                    Diagnostic::warning(
                        "controller public key changed",
                        format!(
                            "sealed secret '{}' was sealed with a previous key and must be recreated",
                            resource.id
                        ),
                    ),
                ),
                Ok(state) => Reconciliation::clean(state),
                Err(e) => {
                    warn!(secret = %resource.id, error = %e, "Failed to refresh sealed secret");
                    Reconciliation::with_diagnostic(
                        ResourceState::Present(resource),
                        Diagnostic::from(&e),
                    )
                }
            },
        }
    }

    /// Normalize, resolve the key once, and seal.
    pub async fn create(
        &self,
        spec: &SecretSpec,
        cancel: &CancellationToken,
    ) -> Result<SealedResource> {
        debug!(secret = %spec.name, namespace = %spec.namespace, "Creating sealed secret");

        let secret = build_secret(spec)?;
        let key = self.resolver.resolve(cancel).await?;
        let artifact = self.sealer.seal(&secret, &key)?;
        if artifact.is_empty() {
            return Err(Error::SealError(format!(
                "sealer returned no content for secret '{}'",
                spec.name
            )));
        }

        let fingerprint = key.fingerprint();
        info!(
            secret = %spec.name,
            namespace = %spec.namespace,
            keys = secret.data.len(),
            fingerprint = %fingerprint,
            "Successfully created sealed secret"
        );

        Ok(SealedResource {
            id: spec.name.clone(),
            spec: spec.clone(),
            artifact,
            fingerprint,
            sealed_at: Utc::now(),
        })
    }

    /// Compare the stored fingerprint with the live key.
    ///
    /// Returns `Absent` on rotation (stored data untouched), otherwise the
    /// resource with its spec snapshot replaced by `spec` and the artifact kept.
    pub async fn refresh(
        &self,
        current: &SealedResource,
        spec: &SecretSpec,
        cancel: &CancellationToken,
    ) -> Result<ResourceState> {
        let key = self.resolver.resolve(cancel).await?;
        let fingerprint = key.fingerprint();

        if fingerprint != current.fingerprint {
            warn!(
                secret = %current.id,
                stored = %current.fingerprint,
                current = %fingerprint,
                "Controller public key changed, sealed secret must be recreated"
            );
            return Ok(ResourceState::Absent);
        }

        debug!(secret = %current.id, fingerprint = %fingerprint, "Public key unchanged");
        Ok(ResourceState::Present(SealedResource {
            spec: spec.clone(),
            ..current.clone()
        }))
    }

    /// Forget the resource locally. Nothing is removed from the cluster.
    pub fn delete(&self, current: ResourceState) -> ResourceState {
        if let ResourceState::Present(resource) = current {
            info!(secret = %resource.id, "Removed sealed secret from state");
        }
        ResourceState::Absent
    }
}
