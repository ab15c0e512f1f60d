//! Phone normalization for the Indonesian numbering plan.
//!
//! Customers paste numbers in every imaginable shape (`0812-3456-789`,
//! `+62 812 3456 789`, `812345678901`); matching relies on all of them
//! collapsing to the same canonical `628…` form.

/// Normalize a phone number to canonical digits.
///
/// - Strips everything that is not an ASCII digit.
/// - `08…` (domestic prefix) becomes `628…`.
/// - A bare `8…` of at least 10 digits becomes `628…`.
/// - `62…` (already international) passes through.
/// - Anything else passes through as digits.
///
/// The function is idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if let Some(rest) = digits.strip_prefix("08") {
        return format!("628{rest}");
    }
    if digits.starts_with('8') && digits.len() >= 10 {
        return format!("62{digits}");
    }
    digits
}
