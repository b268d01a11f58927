//! Caller identity extraction for cache partitioning
//!
//! The index cache is partitioned per caller so one user's inventory view
//! never leaks into another's. The partition key comes from the bearer
//! token's `sub` claim, decoded WITHOUT signature verification: this key is
//! an opaque cache label, never an authorization decision (the upstream API
//! is the one that accepts or rejects the token).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

/// Partition key used when no caller identity can be extracted.
pub const SHARED_CALLER_KEY: &str = "shared";

/// Derive the cache partition key from an `Authorization` header value.
///
/// Accepts `Bearer <jwt>` (scheme case-insensitive) and returns the token's
/// `sub` claim. Anything unparseable falls back to [`SHARED_CALLER_KEY`]
/// rather than erroring: a malformed token still deserves a working cache.
pub fn caller_key(authorization: Option<&str>) -> String {
    match authorization.and_then(bearer_token) {
        Some(token) => caller_key_from_token(token),
        None => SHARED_CALLER_KEY.to_string(),
    }
}

/// Same derivation from a bare token, for callers that already hold the
/// credential rather than the header.
pub fn caller_key_from_token(token: &str) -> String {
    jwt_subject(token).unwrap_or_else(|| SHARED_CALLER_KEY.to_string())
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Decode the `sub` claim from an unverified JWT payload.
fn jwt_subject(token: &str) -> Option<String> {
    let mut parts = token.split('.');
    let _header = parts.next()?;
    let payload = parts.next()?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims
        .get("sub")
        .and_then(|sub| sub.as_str())
        .filter(|sub| !sub.is_empty())
        .map(str::to_string)
}
