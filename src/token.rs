use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

/// Tokens this close to expiry are refreshed before use (seconds).
pub const REFRESH_WINDOW_SECS: i64 = 300;

/// Claims read out of an access token's payload segment.
///
/// The payload is decoded without signature verification, so these values
/// are untrusted. They only drive refresh timing and the cached user id,
/// never an authorization decision.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

/// Decodes the payload of a compact three-segment token.
///
/// Returns `None` for anything that is not three dot-separated segments with
/// a base64url JSON object in the middle. Never fails loudly: malformed
/// tokens from storage are equivalent to no token at all.
pub fn decode_claims(token: &str) -> Option<Claims> {
    let mut segments = token.split('.');
    let payload = match (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return None,
    };

    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// True if the token cannot be decoded or its expiry has passed.
pub fn is_expired(token: &str, now: i64) -> bool {
    match decode_claims(token) {
        Some(claims) => claims.exp <= now,
        None => true,
    }
}

/// True if the token decodes and expires within the refresh window.
pub fn is_expiring_soon(token: &str, now: i64) -> bool {
    is_expiring_within(token, now, REFRESH_WINDOW_SECS)
}

pub fn is_expiring_within(token: &str, now: i64, window: i64) -> bool {
    match decode_claims(token) {
        Some(claims) => claims.exp - now < window,
        None => false,
    }
}
