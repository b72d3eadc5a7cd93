//! Short code generation and custom code validation

use rand::RngExt;

/// Alphabet used for generated codes (62 characters)
pub const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const MIN_CUSTOM_LENGTH: usize = 3;
pub const MAX_CUSTOM_LENGTH: usize = 20;

/// Generate a random code of exactly `length` characters.
///
/// Characters are drawn uniformly with replacement from [`ALPHABET`].
/// Uniqueness is the caller's responsibility.
pub fn generate(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Check that a user-supplied code is 3-20 characters of `[A-Za-z0-9_-]`
pub fn is_syntactically_valid(candidate: &str) -> bool {
    (MIN_CUSTOM_LENGTH..=MAX_CUSTOM_LENGTH).contains(&candidate.len())
        && candidate
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
