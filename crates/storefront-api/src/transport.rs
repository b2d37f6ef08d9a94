//! The network seam
//!
//! `Transport` sends one request and buffers the response. Everything above
//! it (gates, refresh, retries) is transport-agnostic, so tests can swap in
//! their own implementation. `ReqwestTransport` is the production one.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use crate::descriptor::RequestDescriptor;
use crate::error::{Error, Result};
use crate::response::ApiResponse;

pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>>;

/// Sends a request and returns the buffered response, whatever its status.
///
/// Only failures to get a response at all are errors here; non-2xx
/// statuses are for the response gate to judge.
///
/// Uses `Pin<Box<dyn Future>>` so the client can hold an
/// `Arc<dyn Transport>`.
pub trait Transport: Send + Sync {
    fn send<'a>(&'a self, request: &'a RequestDescriptor) -> TransportFuture<'a>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url, timeout))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Absolute URLs pass through; anything else is joined onto the base.
    pub fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{url}", self.base_url)
        } else {
            format!("{}/{url}", self.base_url)
        }
    }

    fn map_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout(self.timeout)
        } else {
            Error::Transport(e.to_string())
        }
    }
}

impl Transport for ReqwestTransport {
    fn send<'a>(&'a self, request: &'a RequestDescriptor) -> TransportFuture<'a> {
        Box::pin(async move {
            let url = self.resolve(request.url());
            let mut builder = self
                .client
                .request(request.method().clone(), &url)
                .headers(request.headers().clone())
                .timeout(self.timeout);
            if let Some(body) = request.body() {
                builder = builder.body(body.clone());
            }

            let response = builder.send().await.map_err(|e| self.map_error(e))?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(|e| self.map_error(e))?;
            debug!(method = %request.method(), %url, status = status.as_u16(), "response received");

            Ok(ApiResponse::from_parts(status, headers, body))
        })
    }
}
