//! Bearer token shape checks, claim decoding and the refresh wire format
//!
//! Tokens are opaque to the client except for two things: their shape (three
//! dot-separated segments, i.e. a compact JWS) is checked before use, and the
//! payload segment is decoded to learn which user the session belongs to.
//! Signatures are never verified here; that is the backend's job.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use common::Secret;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Whether `token` is structurally a compact JWT: exactly three non-empty
/// segments separated by `.`, with no whitespace.
pub fn is_well_formed(token: &str) -> bool {
    if token.is_empty() || token.chars().any(char::is_whitespace) {
        return false;
    }
    let mut segments = 0usize;
    for segment in token.split('.') {
        if segment.is_empty() {
            return false;
        }
        segments += 1;
    }
    segments == 3
}

/// The subset of access-token claims the client cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Claims {
    /// Account identifier. Backends emit it as either a number or a string.
    pub user_id: Option<String>,
    /// Expiry as seconds since the unix epoch.
    pub exp: Option<u64>,
}

#[derive(Deserialize)]
struct RawClaims {
    #[serde(default)]
    user_id: Option<serde_json::Value>,
    #[serde(default)]
    exp: Option<u64>,
}

/// Decode the payload segment of a well-formed token.
///
/// Returns `MalformedToken` if the token has the wrong shape or the payload
/// is not base64url-encoded JSON.
pub fn claims(token: &str) -> Result<Claims> {
    if !is_well_formed(token) {
        return Err(Error::MalformedToken("expected three segments".into()));
    }
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| Error::MalformedToken("missing payload segment".into()))?;

    // Some issuers pad their segments even though RFC 7515 says not to.
    let decoded = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::MalformedToken(format!("payload is not base64url: {e}")))?;
    let raw: RawClaims = serde_json::from_slice(&decoded)
        .map_err(|e| Error::MalformedToken(format!("payload is not JSON: {e}")))?;

    let user_id = match raw.user_id {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    Ok(Claims {
        user_id,
        exp: raw.exp,
    })
}

/// Body of the refresh exchange request.
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    access: Option<String>,
}

/// Extract the new access token from a successful refresh response body.
///
/// A body without an `access` string, or whose `access` is not a well-formed
/// token, counts as a failed refresh: storing it would only make the next
/// request purge it again.
pub fn parse_refresh_response(body: &[u8]) -> Result<Secret<String>> {
    let parsed: RefreshResponse = serde_json::from_slice(body)
        .map_err(|e| Error::RefreshResponse(format!("body is not JSON: {e}")))?;
    match parsed.access {
        Some(access) if is_well_formed(&access) => Ok(Secret::new(access)),
        Some(_) => Err(Error::RefreshResponse(
            "access token in response is malformed".into(),
        )),
        None => Err(Error::RefreshResponse(
            "response has no access token".into(),
        )),
    }
}
