//! Storage keys and backend endpoint defaults
//!
//! The key names are part of the durable storage layout shared with older
//! client builds, so they must not change.

/// Current access token.
pub const ACCESS_KEY: &str = "access";

/// Current refresh token.
pub const REFRESH_KEY: &str = "refresh";

/// Legacy access-token key. Read as a fallback, never written, always
/// cleared together with the other two.
pub const LEGACY_ACCESS_KEY: &str = "token";

/// Every key a credential purge must clear.
pub const CREDENTIAL_KEYS: [&str; 3] = [ACCESS_KEY, REFRESH_KEY, LEGACY_ACCESS_KEY];

/// Token refresh endpoint, relative to the API base URL.
pub const DEFAULT_REFRESH_PATH: &str = "/api/token/refresh/";
