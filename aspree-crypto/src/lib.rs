//! Cryptographic primitives for the aspree backend: the secret vault used to
//! encrypt payment-gateway credentials at rest, plus token and hash helpers.

/// Opaque token and hash generation.
pub mod token;
/// Authenticated encryption of merchant secrets.
pub mod vault;

pub use vault::{SecretVault, VaultError};
