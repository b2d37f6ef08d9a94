//! Error types surfaced to callers of the API client
//!
//! Only exhausted or unrecoverable failures reach callers. A rejected HTTP
//! response is always returned as `Error::Status` carrying the response the
//! backend sent last, so call sites can read status and body the same way no
//! matter how many retries happened underneath.

use std::time::Duration;

use reqwest::StatusCode;

use crate::response::ApiResponse;

/// Errors from API client operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request failed with status {}", .0.status())]
    Status(ApiResponse),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("client configuration error: {0}")]
    Config(String),

    #[error("response decode error: {0}")]
    Decode(String),

    #[error("storage error: {0}")]
    Storage(#[from] storefront_auth::Error),
}

impl Error {
    /// HTTP status of a rejected response, if this error carries one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status(response) => Some(response.status()),
            _ => None,
        }
    }

    /// The rejected response, if this error carries one.
    pub fn response(&self) -> Option<&ApiResponse> {
        match self {
            Error::Status(response) => Some(response),
            _ => None,
        }
    }
}

/// Why a refresh-token exchange failed.
///
/// `Clone` because one failure is handed to every request that queued behind
/// the exchange.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error("token refresh rejected with status {status}")]
    Rejected { status: u16 },

    #[error("token refresh request failed: {0}")]
    Transport(String),

    #[error("token refresh response invalid: {0}")]
    InvalidResponse(String),

    #[error("token refresh abandoned before completion")]
    Abandoned,
}

/// Result alias for API client operations.
pub type Result<T> = std::result::Result<T, Error>;
