//! Sealing capability
//!
//! The hybrid encryption format belongs to the sealing library; this crate
//! only hands it a canonical payload and the resolved controller key.

use super::key::PublicKey;
use super::secret::CanonicalSecret;
use crate::error::Result;

/// Encrypts a canonical secret so that only the controller can decrypt it.
///
/// Implementations report failures as [`crate::Error::SealError`].
pub trait Sealer: Send + Sync {
    fn seal(&self, secret: &CanonicalSecret, key: &PublicKey) -> Result<Vec<u8>>;
}

impl<S: Sealer + ?Sized> Sealer for std::sync::Arc<S> {
    fn seal(&self, secret: &CanonicalSecret, key: &PublicKey) -> Result<Vec<u8>> {
        (**self).seal(secret, key)
    }
}
