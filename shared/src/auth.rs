//! Bearer-token parsing and constant-time comparison.

use subtle::ConstantTimeEq;

const BEARER_PREFIX: &str = "Bearer ";

/// Extracts the token from an `Authorization: Bearer <token>` header
/// value. The scheme match is case-insensitive.
pub fn bearer_token(header: &str) -> Option<&str> {
    if header.len() < BEARER_PREFIX.len() {
        return None;
    }
    let (scheme, rest) = header.split_at(BEARER_PREFIX.len());
    if !scheme.eq_ignore_ascii_case(BEARER_PREFIX) {
        return None;
    }
    Some(rest.trim())
}

/// Compares a presented token against the expected one in constant
/// time. An empty expected token never matches (fail closed).
pub fn token_matches(presented: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}
