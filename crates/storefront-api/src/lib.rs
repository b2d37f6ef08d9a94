//! Storefront REST API client
//!
//! Wraps the backend's HTTP API with bearer authentication that looks after
//! itself: stored tokens are attached to non-public requests, an expired
//! access token is refreshed once and the request resent, concurrent
//! failures share a single refresh, and unrecoverable rejections sign the
//! user out.
//!
//! ```text
//! ApiClient ──▶ RequestGate ──▶ Transport ──▶ 2xx ──▶ caller
//!                                   │
//!                                   └─ non-2xx ──▶ classify ──▶ recover
//!                                                              (RefreshCoordinator)
//! ```

pub mod client;
pub mod descriptor;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod public_paths;
pub mod refresh;
pub mod response;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use client::{ApiClient, ClientConfig, DEFAULT_TIMEOUT, LogoutHook};
pub use descriptor::{RequestDescriptor, RetryContext, RetryKind, with_retry_marker};
pub use error::{Error, RefreshError, Result};
pub use gate::{Decision, RequestGate, classify};
pub use public_paths::{DEFAULT_PUBLIC_PATHS, PublicPathSet};
pub use refresh::{LeaderGuard, RefreshCoordinator, RefreshOutcome, Ticket, Waiter};
pub use response::ApiResponse;
pub use transport::{ReqwestTransport, Transport, TransportFuture};
