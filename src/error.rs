//! Error types for the sealed secret provider

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed key material or provider configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Proxy request failed, timed out, was cancelled or returned a non-success status
    #[error("Network error: {0}")]
    NetworkError(String),

    /// A secret entry could not be normalized (e.g. invalid base64)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The sealing collaborator rejected the payload
    #[error("Seal error: {0}")]
    SealError(String),
}

impl Error {
    /// Short category name, used as the diagnostic summary.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ConfigError(_) => "invalid configuration",
            Error::NetworkError(_) => "cluster request failed",
            Error::ValidationError(_) => "invalid secret",
            Error::SealError(_) => "sealing failed",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
