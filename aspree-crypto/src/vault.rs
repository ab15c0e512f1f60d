//! Encrypt and decrypt merchant secrets for storage at rest.
//!
//! ## Design
//!
//! * AES-256-GCM via [`ring`], with a random 12-byte nonce sampled per
//!   encryption and prepended to the output.
//! * The process-wide vault key is derived from the operator-supplied master
//!   secret with HKDF-SHA256 under a fixed domain-separation salt, so the raw
//!   env value is never used as key material directly.
//! * The serialized form is `<nonce-hex>:<ciphertext-hex>:<tag-hex>`. Values
//!   in this shape can be recognized without key material, which lets writers
//!   guard against double-encrypting an already-encrypted column (see
//!   [`is_encrypted`]).
//!
//! Nonce collision with random 12-byte nonces becomes a concern near 2^32
//! encryptions per key; gateway credentials are rewritten a handful of times
//! per merchant, far below any wear-out bound.
//!
//! [`is_encrypted`]: SecretVault::is_encrypted

use std::fmt;

use aspree_common::{array, rng::Crng};
use ring::{
    aead::{self, LessSafeKey, UnboundKey},
    hkdf,
};
use thiserror::Error;

/// serialized nonce length, in bytes
const NONCE_LEN: usize = 12;

/// serialized AES-256-GCM tag length, in bytes
const TAG_LEN: usize = 16;

/// Authenticated encryption of small secrets under a process-wide key.
///
/// The key is read-only after init; [`SecretVault`] is cheap to share behind
/// an [`std::sync::Arc`].
pub struct SecretVault {
    key: LessSafeKey,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum VaultError {
    /// Input does not have the `nonce:ciphertext:tag` hex shape.
    #[error("malformed ciphertext: expected nonce:ciphertext:tag hex")]
    Malformed,
    /// Structurally valid input that fails authenticated decryption.
    #[error("decrypt error: ciphertext or key may be corrupted")]
    Decrypt,
}

impl fmt::Debug for SecretVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretVault(..)")
    }
}

impl SecretVault {
    const HKDF_SALT: [u8; 32] = array::pad(*b"ASPREE-REALM::SecretVault");

    /// Derive the vault key from the operator-supplied master secret.
    pub fn from_master_secret(master_secret: &[u8]) -> Self {
        let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, &Self::HKDF_SALT)
            .extract(master_secret);
        let okm = prk
            .expand(&[b"payment-gateway-secrets"], &aead::AES_256_GCM)
            .expect("AES-256 key fits in one HKDF block");
        let key = LessSafeKey::new(UnboundKey::from(okm));
        Self { key }
    }

    /// Encrypt a plaintext secret to its serialized `nonce:ct:tag` form.
    pub fn encrypt(&self, rng: &mut impl Crng, plaintext: &str) -> String {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce_bytes);
        let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.as_bytes().to_vec();
        let tag = self
            .key
            .seal_in_place_separate_tag(nonce, aead::Aad::empty(), &mut in_out)
            .expect("Secrets are far below the AES-GCM length limit");

        format!(
            "{}:{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(&in_out),
            hex::encode(tag.as_ref()),
        )
    }

    /// Decrypt a serialized `nonce:ct:tag` value back to the plaintext.
    pub fn decrypt(&self, stored: &str) -> Result<String, VaultError> {
        let (nonce_hex, ct_hex, tag_hex) =
            split_parts(stored).ok_or(VaultError::Malformed)?;

        let nonce_bytes: [u8; NONCE_LEN] = hex::decode(nonce_hex)
            .ok()
            .and_then(|v| v.try_into().ok())
            .ok_or(VaultError::Malformed)?;
        let mut in_out = hex::decode(ct_hex).map_err(|_| VaultError::Malformed)?;
        let tag = hex::decode(tag_hex).map_err(|_| VaultError::Malformed)?;
        if tag.len() != TAG_LEN {
            return Err(VaultError::Malformed);
        }
        in_out.extend_from_slice(&tag);

        let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);
        let plaintext = self
            .key
            .open_in_place(nonce, aead::Aad::empty(), &mut in_out)
            .map_err(|_| VaultError::Decrypt)?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| VaultError::Decrypt)
    }

    /// A pure structural check for the serialized ciphertext shape: exactly
    /// two `:` delimiters, lowercase hex segments, and correct nonce / tag
    /// lengths. Writers use this to avoid double-encrypting a value that is
    /// already in its at-rest form.
    pub fn is_encrypted(stored: &str) -> bool {
        match split_parts(stored) {
            Some((nonce_hex, ct_hex, tag_hex)) =>
                nonce_hex.len() == NONCE_LEN * 2
                    && tag_hex.len() == TAG_LEN * 2
                    && ct_hex.len() % 2 == 0
                    && is_lower_hex(nonce_hex)
                    && is_lower_hex(ct_hex)
                    && is_lower_hex(tag_hex),
            None => false,
        }
    }
}

fn split_parts(s: &str) -> Option<(&str, &str, &str)> {
    let mut parts = s.split(':');
    let nonce = parts.next()?;
    let ct = parts.next()?;
    let tag = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((nonce, ct, tag))
}

fn is_lower_hex(s: &str) -> bool {
    s.bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod test {
    use aspree_common::rng::SmallRng;
    use proptest::{
        arbitrary::any, prop_assert, prop_assert_eq, prop_assert_ne, proptest,
    };

    use super::*;

    fn test_vault() -> SecretVault {
        SecretVault::from_master_secret(b"an environment-supplied secret")
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        proptest!(|(seed in any::<u64>(), plaintext in "\\PC{0,128}")| {
            let mut rng = SmallRng::from_u64(seed);
            let vault = test_vault();

            let stored = vault.encrypt(&mut rng, &plaintext);
            prop_assert!(SecretVault::is_encrypted(&stored));
            prop_assert_eq!(vault.decrypt(&stored).unwrap(), plaintext);
        });
    }

    #[test]
    fn fresh_nonce_per_encryption() {
        let mut rng = SmallRng::from_u64(1);
        let vault = test_vault();
        let a = vault.encrypt(&mut rng, "sk_test_ABC");
        let b = vault.encrypt(&mut rng, "sk_test_ABC");
        assert_ne!(a, b);
    }

    #[test]
    fn ciphertext_hides_plaintext() {
        let mut rng = SmallRng::from_u64(2);
        let vault = test_vault();
        let stored = vault.encrypt(&mut rng, "sk_test_ABC");
        assert!(!stored.contains("sk_test_ABC"));
    }

    #[test]
    fn is_encrypted_rejects_plaintext_shapes() {
        for not_encrypted in [
            "",
            "sk_test_ABC",
            "a:b",
            "a:b:c:d",
            // uppercase hex is not our at-rest form
            "AA00AA00AA00AA00AA00AA00:00:00000000000000000000000000000000",
            // wrong nonce length
            "aabb:00:0123456789abcdef0123456789abcdef",
        ] {
            assert!(
                !SecretVault::is_encrypted(not_encrypted),
                "{not_encrypted:?}"
            );
        }
    }

    #[test]
    fn double_encryption_guard() {
        let mut rng = SmallRng::from_u64(3);
        let vault = test_vault();
        let once = vault.encrypt(&mut rng, "secret");

        // The writer-side guard: an already-encrypted value is stored as-is.
        let stored = if SecretVault::is_encrypted(&once) {
            once.clone()
        } else {
            vault.encrypt(&mut rng, &once)
        };
        assert_eq!(stored, once);
    }

    #[test]
    fn decrypt_malformed_is_typed_error() {
        let vault = test_vault();
        assert_eq!(vault.decrypt("garbage"), Err(VaultError::Malformed));
        assert_eq!(vault.decrypt("a:b:c"), Err(VaultError::Malformed));

        // Structurally valid but cryptographically bogus.
        let bogus = format!(
            "{}:{}:{}",
            "00".repeat(NONCE_LEN),
            "ff".repeat(8),
            "00".repeat(TAG_LEN),
        );
        assert_eq!(vault.decrypt(&bogus), Err(VaultError::Decrypt));
    }

    #[test]
    fn different_master_secrets_do_not_interoperate() {
        proptest!(|(seed in any::<u64>())| {
            let mut rng = SmallRng::from_u64(seed);
            let vault1 = SecretVault::from_master_secret(b"secret one");
            let vault2 = SecretVault::from_master_secret(b"secret two");
            let stored = vault1.encrypt(&mut rng, "payload");
            prop_assert_ne!(vault2.decrypt(&stored), Ok("payload".to_owned()));
        });
    }
}
