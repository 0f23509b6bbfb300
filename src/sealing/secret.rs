//! Secret specification and normalization into a canonical payload
//!
//! A [`SecretSpec`] carries two maps: `data` holds plaintext values and
//! `binary_data` holds base64-encoded values. [`build_secret`] merges both
//! into one decoded key/value payload; when a key appears in both maps the
//! decoded `binary_data` value wins.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

pub const DEFAULT_SECRET_TYPE: &str = "Opaque";

fn default_secret_type() -> String {
    DEFAULT_SECRET_TYPE.to_string()
}

/// Desired secret as declared by the operator.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretSpec {
    /// Name of the secret, unique within its namespace
    pub name: String,

    /// Namespace of the secret
    pub namespace: String,

    /// Secret type, e.g. `Opaque` or `kubernetes.io/tls`
    #[serde(rename = "type", default = "default_secret_type")]
    pub secret_type: String,

    /// Plaintext entries
    #[serde(default)]
    pub data: BTreeMap<String, String>,

    /// Base64-encoded entries
    #[serde(default)]
    pub binary_data: BTreeMap<String, String>,
}

impl SecretSpec {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            secret_type: default_secret_type(),
            data: BTreeMap::new(),
            binary_data: BTreeMap::new(),
        }
    }

    pub fn with_type(mut self, secret_type: impl Into<String>) -> Self {
        self.secret_type = secret_type.into();
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_binary_data(mut self, key: impl Into<String>, encoded: impl Into<String>) -> Self {
        self.binary_data.insert(key.into(), encoded.into());
        self
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw)
            .map_err(|e| Error::ValidationError(format!("Failed to parse secret spec: {e}")))
    }
}

/// Merged, decoded payload with its object metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanonicalSecret {
    pub name: String,
    pub namespace: String,
    pub secret_type: String,
    pub data: BTreeMap<String, Vec<u8>>,
}

impl CanonicalSecret {
    /// The payload as a `core/v1` Secret object.
    pub fn to_secret(&self) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            type_: Some(self.secret_type.clone()),
            data: Some(
                self.data
                    .iter()
                    .map(|(k, v)| (k.clone(), ByteString(v.clone())))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    /// Render the Secret manifest as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        let mut manifest = serde_json::to_value(self.to_secret())
            .map_err(|e| Error::ValidationError(format!("Failed to render secret: {e}")))?;
        if let Some(object) = manifest.as_object_mut() {
            object.insert("apiVersion".to_string(), "v1".into());
            object.insert("kind".to_string(), "Secret".into());
        }
        serde_yaml::to_string(&manifest)
            .map_err(|e| Error::ValidationError(format!("Failed to render secret: {e}")))
    }
}

/// Merge plaintext and encoded entries of `spec` into a canonical payload.
///
/// Fails with [`Error::ValidationError`] if name or namespace is empty or an
/// encoded entry is not valid base64.
pub fn build_secret(spec: &SecretSpec) -> Result<CanonicalSecret> {
    if spec.name.trim().is_empty() {
        return Err(Error::ValidationError("secret name must not be empty".to_string()));
    }
    if spec.namespace.trim().is_empty() {
        return Err(Error::ValidationError(format!(
            "namespace of secret '{}' must not be empty",
            spec.name
        )));
    }

    let mut data: BTreeMap<String, Vec<u8>> = spec
        .data
        .iter()
        .map(|(k, v)| (k.clone(), v.as_bytes().to_vec()))
        .collect();

    for (key, encoded) in &spec.binary_data {
        let decoded = BASE64.decode(encoded).map_err(|e| {
            Error::ValidationError(format!(
                "binaryData['{key}'] of secret '{}' is not valid base64: {e}",
                spec.name
            ))
        })?;
        if data.insert(key.clone(), decoded).is_some() {
            debug!(secret = %spec.name, key = %key, "Encoded entry overrides plaintext entry");
        }
    }

    let secret_type = if spec.secret_type.is_empty() {
        default_secret_type()
    } else {
        spec.secret_type.clone()
    };

    Ok(CanonicalSecret {
        name: spec.name.clone(),
        namespace: spec.namespace.clone(),
        secret_type,
        data,
    })
}
