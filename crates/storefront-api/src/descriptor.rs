//! Outgoing request description and its retry bookkeeping
//!
//! A `RequestDescriptor` is what callers build and what the gates decorate.
//! It is cloned for every resend, so the retry markers travel with the copy
//! and never leak back into the caller's value.

use bytes::Bytes;
use common::Secret;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;

use crate::error::{Error, Result};

/// Which recovery path, if any, produced this request.
///
/// The two retry markers are mutually exclusive, so they are one enum rather
/// than two flags: a request can never be both an anonymous retry and a
/// post-refresh retry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryContext {
    #[default]
    Original,
    /// Resent without credentials after a 401 on a public route.
    RetriedWithoutAuth,
    /// Resent with a freshly refreshed access token.
    RefreshRetry,
}

impl RetryContext {
    pub fn retried_without_auth(self) -> bool {
        matches!(self, RetryContext::RetriedWithoutAuth)
    }

    pub fn is_retry_request(self) -> bool {
        matches!(self, RetryContext::RefreshRetry)
    }
}

/// Recovery path requested from [`with_retry_marker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryKind {
    WithoutAuth,
    AfterRefresh,
}

/// Clone `request` for a resend along the given recovery path.
///
/// Returns `None` when the request is already a retry of either kind; each
/// original request gets at most one recovery attempt. An anonymous retry
/// also drops the `Authorization` header. A refresh retry keeps the headers
/// as they are; the caller installs the new bearer.
pub fn with_retry_marker(request: &RequestDescriptor, kind: RetryKind) -> Option<RequestDescriptor> {
    if request.retry != RetryContext::Original {
        return None;
    }
    let mut retry = request.clone();
    match kind {
        RetryKind::WithoutAuth => {
            retry.strip_authorization();
            retry.retry = RetryContext::RetriedWithoutAuth;
        }
        RetryKind::AfterRefresh => {
            retry.retry = RetryContext::RefreshRetry;
        }
    }
    Some(retry)
}

#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<Bytes>,
    retry: RetryContext,
}

impl RequestDescriptor {
    /// `url` may be absolute or relative to the client's base URL.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            retry: RetryContext::Original,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `body` as the JSON payload and set `Content-Type`.
    pub fn with_json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let encoded =
            serde_json::to_vec(body).map_err(|e| Error::InvalidRequest(e.to_string()))?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(encoded));
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn retry_context(&self) -> RetryContext {
        self.retry
    }

    pub(crate) fn strip_authorization(&mut self) {
        self.headers.remove(AUTHORIZATION);
    }

    /// Install `Authorization: Bearer <token>`, marked sensitive so it is
    /// never printed by header debug output.
    pub(crate) fn set_bearer(&mut self, token: &Secret<String>) -> Result<()> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_str()))
            .map_err(|_| Error::InvalidRequest("access token is not a valid header value".into()))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }
}
