//! Opaque token and digest helpers.

use aspree_common::rng::Crng;
use ring::digest;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Sample `n_bytes` random bytes and return them as lowercase hex.
///
/// Used for email-verification tokens, password-reset tokens, and
/// final-payment tokens.
pub fn random_token(rng: &mut impl Crng, n_bytes: usize) -> String {
    let mut bytes = vec![0u8; n_bytes];
    rng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Sample a random base36 string of length `len`.
///
/// Slightly biased by the modulo reduction; these are opaque identifiers,
/// not key material.
pub fn random_base36(rng: &mut impl Crng, len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rng.fill_bytes(&mut bytes);
    bytes
        .into_iter()
        .map(|b| BASE36[usize::from(b) % 36] as char)
        .collect()
}

/// Encode a non-negative integer in base36.
pub fn base36_encode(mut n: u64) -> String {
    if n == 0 {
        return "0".to_owned();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 alphabet is ASCII")
}

/// SHA-256 over `salt || data`, as lowercase hex.
pub fn hash_hex(data: &[u8], salt: &[u8]) -> String {
    let mut ctx = digest::Context::new(&digest::SHA256);
    ctx.update(salt);
    ctx.update(data);
    hex::encode(ctx.finish().as_ref())
}

#[cfg(test)]
mod test {
    use aspree_common::rng::SmallRng;

    use super::*;

    #[test]
    fn random_token_is_hex_of_requested_len() {
        let mut rng = SmallRng::from_u64(7);
        let token = random_token(&mut rng, 32);
        assert_eq!(token.len(), 64);
        assert!(token.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn random_base36_alphabet() {
        let mut rng = SmallRng::from_u64(8);
        let s = random_base36(&mut rng, 9);
        assert_eq!(s.len(), 9);
        assert!(s.bytes().all(|b| BASE36.contains(&b)));
    }

    #[test]
    fn base36_encode_known_values() {
        assert_eq!(base36_encode(0), "0");
        assert_eq!(base36_encode(35), "z");
        assert_eq!(base36_encode(36), "10");
        assert_eq!(base36_encode(1_700_000_000_000), "loyw3v28");
    }

    #[test]
    fn hash_is_salted() {
        let h1 = hash_hex(b"data", b"salt1");
        let h2 = hash_hex(b"data", b"salt2");
        assert_ne!(h1, h2);
        assert_eq!(h1.len(), 64);
    }
}
