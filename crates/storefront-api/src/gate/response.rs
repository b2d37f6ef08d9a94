//! Classification of rejected responses
//!
//! `classify` is pure: it looks at the response, whether the original
//! request was a public read, and the request's retry context, and returns
//! what should happen next. Rules are checked in order and the first match
//! wins.

use reqwest::StatusCode;

use crate::descriptor::RetryContext;
use crate::response::ApiResponse;

/// Substring (case-insensitive) the backend uses to say a token is dead.
pub const TOKEN_NOT_VALID: &str = "token not valid";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Public read rejected with 401: purge, resend once without credentials.
    AnonymousRetry,
    /// Backend declared the token invalid: purge and give up, no refresh.
    HardInvalidation,
    /// Not ours to recover from: return the response as an error.
    PassThrough,
    /// Refresh the access token and resend once.
    RefreshAndRetry,
}

impl Decision {
    /// Metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::AnonymousRetry => "anonymous_retry",
            Decision::HardInvalidation => "hard_invalidation",
            Decision::PassThrough => "pass_through",
            Decision::RefreshAndRetry => "refresh_and_retry",
        }
    }
}

pub fn classify(response: &ApiResponse, public_get: bool, retry: RetryContext) -> Decision {
    let unauthorized = response.status() == StatusCode::UNAUTHORIZED;

    if unauthorized && public_get && !retry.retried_without_auth() {
        return Decision::AnonymousRetry;
    }
    if unauthorized && declares_token_invalid(response) {
        return Decision::HardInvalidation;
    }
    if !unauthorized || public_get || retry.is_retry_request() {
        return Decision::PassThrough;
    }
    Decision::RefreshAndRetry
}

fn declares_token_invalid(response: &ApiResponse) -> bool {
    response
        .error_messages()
        .iter()
        .any(|message| message.to_ascii_lowercase().contains(TOKEN_NOT_VALID))
}
