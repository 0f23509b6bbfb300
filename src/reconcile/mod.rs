//! Reconciliation of sealed secrets
//! Decides between create, keep and forced recreation based on the
//! controller key fingerprint.

mod diagnostics;
mod engine;

pub use diagnostics::{Diagnostic, Severity};
pub use engine::{Reconciler, Reconciliation, ResourceState, SealedResource};
