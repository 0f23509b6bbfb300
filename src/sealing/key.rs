//! Controller public key and its fingerprint
//!
//! Key material arrives as PEM, in one of three shapes:
//!
//! | PEM label          | Contents                                     |
//! |--------------------|----------------------------------------------|
//! | `CERTIFICATE`      | X.509 certificate (what `/v1/cert.pem` serves) |
//! | `PUBLIC KEY`       | SubjectPublicKeyInfo                          |
//! | `RSA PUBLIC KEY`   | PKCS#1 RSA public key                         |
//!
//! Only RSA keys are accepted. Modulus size is not limited here; the
//! fingerprint needs nothing but the two integers.

use std::fmt;

use rsa::pkcs1::der::Decode;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use sha2::{Digest, Sha256};
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::FromDer;
use x509_parser::public_key::PublicKey as SpkiKey;
use x509_parser::x509::SubjectPublicKeyInfo;

use crate::error::{Error, Result};

/// Largest modulus [`PublicKey::to_rsa`] hands to the `rsa` crate.
pub const MAX_RSA_KEY_BITS: usize = 16384;

/// RSA public key of the sealing controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    modulus: BigUint,
    exponent: BigUint,
}

impl PublicKey {
    pub fn new(modulus: BigUint, exponent: BigUint) -> Self {
        Self { modulus, exponent }
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    pub fn exponent(&self) -> &BigUint {
        &self.exponent
    }

    /// Parse the first PEM block in `pem`.
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let (_, block) = parse_x509_pem(pem)
            .map_err(|e| Error::ConfigError(format!("Failed to decode PEM key material: {e}")))?;

        match block.label.as_str() {
            "CERTIFICATE" => {
                let cert = block.parse_x509().map_err(|e| {
                    Error::ConfigError(format!("Failed to parse X.509 certificate: {e}"))
                })?;
                Self::from_spki(cert.public_key())
            }
            "PUBLIC KEY" => {
                let (_, spki) = SubjectPublicKeyInfo::from_der(&block.contents).map_err(|e| {
                    Error::ConfigError(format!("Failed to parse public key: {e}"))
                })?;
                Self::from_spki(&spki)
            }
            "RSA PUBLIC KEY" => {
                let key = rsa::pkcs1::RsaPublicKey::from_der(&block.contents).map_err(|e| {
                    Error::ConfigError(format!("Failed to parse PKCS#1 RSA public key: {e}"))
                })?;
                Self::from_be_bytes(key.modulus.as_bytes(), key.public_exponent.as_bytes())
            }
            other => Err(Error::ConfigError(format!(
                "Unsupported PEM block '{other}', expected a certificate or RSA public key"
            ))),
        }
    }

    fn from_spki(spki: &SubjectPublicKeyInfo<'_>) -> Result<Self> {
        match spki.parsed() {
            Ok(SpkiKey::RSA(rsa)) => Self::from_be_bytes(rsa.modulus, rsa.exponent),
            Ok(_) => Err(Error::ConfigError(
                "Key material does not carry an RSA public key".to_string(),
            )),
            Err(e) => Err(Error::ConfigError(format!(
                "Failed to parse RSA public key: {e}"
            ))),
        }
    }

    fn from_be_bytes(modulus: &[u8], exponent: &[u8]) -> Result<Self> {
        let modulus = BigUint::from_bytes_be(modulus);
        let exponent = BigUint::from_bytes_be(exponent);
        if modulus == BigUint::default() || exponent == BigUint::default() {
            return Err(Error::ConfigError(
                "RSA public key has a zero modulus or exponent".to_string(),
            ));
        }
        Ok(Self::new(modulus, exponent))
    }

    /// Stable digest used to detect key rotation.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }

    /// Convert to an `rsa` key for sealers that encrypt with it.
    pub fn to_rsa(&self) -> Result<RsaPublicKey> {
        RsaPublicKey::new_with_max_size(
            self.modulus.clone(),
            self.exponent.clone(),
            MAX_RSA_KEY_BITS,
        )
        .map_err(|e| Error::ConfigError(format!("Unusable RSA public key: {e}")))
    }

    /// Size of the modulus in bits.
    pub fn bits(&self) -> usize {
        self.modulus.bits()
    }
}

impl From<&RsaPublicKey> for PublicKey {
    fn from(key: &RsaPublicKey) -> Self {
        Self::new(key.n().clone(), key.e().clone())
    }
}

/// Hex SHA-256 over the decimal modulus followed by the decimal exponent.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(key: &PublicKey) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}{}", key.modulus, key.exponent).as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap a fingerprint previously produced by [`Fingerprint::of`].
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
