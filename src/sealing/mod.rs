//! Key resolution, payload normalization and the sealing capability

pub mod key;
pub mod resolver;
pub mod sealer;
pub mod secret;

pub use key::{Fingerprint, PublicKey};
pub use resolver::{
    controller_resolver, resolver_from_config, ControllerKeyResolver, PublicKeyResolver,
    StaticKeyResolver,
};
pub use sealer::Sealer;
pub use secret::{build_secret, CanonicalSecret, SecretSpec, DEFAULT_SECRET_TYPE};
