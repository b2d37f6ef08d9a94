//! Error types for credential storage and token handling

/// Errors from storage and token operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("storage parse error: {0}")]
    Parse(String),

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("invalid refresh response: {0}")]
    RefreshResponse(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
