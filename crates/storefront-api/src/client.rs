//! Caller-facing API client
//!
//! `ApiClient` is the only type application code talks to. Every verb runs
//! the same pipeline:
//!
//! 1. the request gate attaches the stored bearer (or strips it on public reads)
//! 2. the transport sends it
//! 3. a 2xx is returned untouched; anything else goes to the response gate,
//!    whose decision is carried out here: purge, resend anonymously, refresh
//!    through the coordinator and resend, or give up
//!
//! Resends skip the request gate. An anonymous retry must stay anonymous and
//! a refresh retry already carries the new bearer.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use common::Secret;
use reqwest::Method;
use serde::Serialize;
use storefront_auth::{
    CredentialPair, CredentialStore, DEFAULT_REFRESH_PATH, RefreshRequest,
    parse_refresh_response,
};
use tracing::{debug, info, instrument, warn};

use crate::descriptor::{RequestDescriptor, RetryKind, with_retry_marker};
use crate::error::{Error, RefreshError, Result};
use crate::gate::{Decision, RequestGate, classify};
use crate::metrics;
use crate::public_paths::{DEFAULT_PUBLIC_PATHS, PublicPathSet};
use crate::refresh::{RefreshCoordinator, RefreshOutcome, Ticket};
use crate::response::ApiResponse;
use crate::transport::{ReqwestTransport, Transport};

/// Upper bound on every network call, refresh exchange included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Scheme, host and optional path prefix every relative URL is joined to.
    pub base_url: String,
    /// Refresh endpoint, relative to `base_url`.
    pub refresh_path: String,
    pub timeout: Duration,
    /// Anchored, case-insensitive regexes over the request path.
    pub public_paths: Vec<String>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            timeout: DEFAULT_TIMEOUT,
            public_paths: DEFAULT_PUBLIC_PATHS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Something that must be reset when the user logs out.
///
/// Uses `Pin<Box<dyn Future>>` so hooks can be stored as trait objects.
pub trait LogoutHook: Send + Sync {
    fn on_logout(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

type ResponseFuture<'a> = Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>>;

/// Shared HTTP client. Cheap to call concurrently; wrap in an `Arc` to share
/// across tasks. All tasks then share one refresh coordinator.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    credentials: CredentialStore,
    public_paths: Arc<PublicPathSet>,
    request_gate: RequestGate,
    coordinator: RefreshCoordinator,
    refresh_path: String,
    logout_hooks: RwLock<Vec<Arc<dyn LogoutHook>>>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, credentials: CredentialStore) -> Result<Self> {
        let transport = ReqwestTransport::new(&config.base_url, config.timeout)?;
        Self::with_transport(config, credentials, Arc::new(transport))
    }

    pub fn with_transport(
        config: &ClientConfig,
        credentials: CredentialStore,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let public_paths = PublicPathSet::new(&config.base_url, &config.public_paths)
            .map_err(|e| Error::Config(format!("invalid public path pattern: {e}")))?;
        let public_paths = Arc::new(public_paths);

        Ok(Self {
            transport,
            request_gate: RequestGate::new(public_paths.clone(), credentials.clone()),
            credentials,
            public_paths,
            coordinator: RefreshCoordinator::new(),
            refresh_path: config.refresh_path.clone(),
            logout_hooks: RwLock::new(Vec::new()),
        })
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Whether a token refresh is in flight right now.
    pub fn is_refreshing(&self) -> bool {
        self.coordinator.is_refreshing()
    }

    pub fn register_logout_hook(&self, hook: Arc<dyn LogoutHook>) {
        self.logout_hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    /// Store a token pair obtained from the login exchange.
    pub async fn sign_in(&self, pair: &CredentialPair) -> Result<()> {
        self.credentials.save(pair).await?;
        Ok(())
    }

    /// Erase all credentials, then run every logout hook in registration
    /// order.
    pub async fn logout(&self) -> Result<()> {
        self.credentials.purge_all().await?;
        let hooks: Vec<_> = self
            .logout_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in &hooks {
            hook.on_logout().await;
        }
        info!(hooks = hooks.len(), "logged out");
        Ok(())
    }

    pub async fn get(&self, url: &str) -> Result<ApiResponse> {
        self.send(RequestDescriptor::get(url)).await
    }

    pub async fn delete(&self, url: &str) -> Result<ApiResponse> {
        self.send(RequestDescriptor::new(Method::DELETE, url)).await
    }

    pub async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<ApiResponse> {
        self.send_json(Method::POST, url, body).await
    }

    pub async fn put<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<ApiResponse> {
        self.send_json(Method::PUT, url, body).await
    }

    pub async fn patch<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<ApiResponse> {
        self.send_json(Method::PATCH, url, body).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: &T,
    ) -> Result<ApiResponse> {
        let request = RequestDescriptor::new(method, url).with_json(body)?;
        self.send(request).await
    }

    /// Send an arbitrary request through the full pipeline.
    #[instrument(
        skip(self, request),
        fields(
            request_id = %new_request_id(),
            method = %request.method(),
            url = %request.url(),
        )
    )]
    pub async fn send(&self, request: RequestDescriptor) -> Result<ApiResponse> {
        let method = request.method().to_string();
        let result = self.execute(request).await;
        metrics::record_request(&method, outcome_label(&result));
        match &result {
            Ok(response) => debug!(status = response.status().as_u16(), "request succeeded"),
            Err(e) => debug!(error = %e, "request failed"),
        }
        result
    }

    async fn execute(&self, request: RequestDescriptor) -> Result<ApiResponse> {
        let request = self.request_gate.decorate(request).await;
        self.dispatch(request).await
    }

    /// Send without decoration and recover from a rejection. Boxed because
    /// recovery sends again through here.
    fn dispatch(&self, request: RequestDescriptor) -> ResponseFuture<'_> {
        Box::pin(async move {
            let response = self.transport.send(&request).await?;
            if response.is_success() {
                return Ok(response);
            }
            self.recover(request, response).await
        })
    }

    async fn recover(&self, request: RequestDescriptor, failed: ApiResponse) -> Result<ApiResponse> {
        // Another origin's rejection says nothing about this session.
        if !self.public_paths.is_backend_url(request.url()) {
            return Err(Error::Status(failed));
        }
        let public_get = self
            .public_paths
            .is_public_get(request.method(), request.url());
        let decision = classify(&failed, public_get, request.retry_context());
        metrics::record_recovery(decision);
        debug!(
            status = failed.status().as_u16(),
            decision = decision.as_str(),
            "request rejected"
        );

        match decision {
            Decision::PassThrough => Err(Error::Status(failed)),
            Decision::HardInvalidation => {
                info!("backend declared the access token invalid, signing out");
                self.purge_credentials().await;
                Err(Error::Status(failed))
            }
            Decision::AnonymousRetry => {
                let Some(retry) = with_retry_marker(&request, RetryKind::WithoutAuth) else {
                    return Err(Error::Status(failed));
                };
                self.purge_credentials().await;
                self.dispatch(retry).await
            }
            Decision::RefreshAndRetry => self.refresh_and_retry(request, failed).await,
        }
    }

    async fn refresh_and_retry(
        &self,
        request: RequestDescriptor,
        failed: ApiResponse,
    ) -> Result<ApiResponse> {
        let Some(refresh) = self.credentials.refresh().await.usable() else {
            debug!("no usable refresh token");
            return Err(Error::Status(failed));
        };

        let outcome = match self.coordinator.begin_or_enqueue() {
            Ticket::Leader(leader) => {
                let outcome = self.exchange_and_persist(&refresh).await;
                leader.settle(&outcome);
                outcome
            }
            Ticket::Follower(waiter) => waiter.outcome().await,
        };
        let access = outcome?;

        let Some(mut retry) = with_retry_marker(&request, RetryKind::AfterRefresh) else {
            return Err(Error::Status(failed));
        };
        retry.set_bearer(&access)?;
        self.dispatch(retry).await
    }

    /// Leader-only: run the exchange, then persist the new access token or
    /// purge everything, before any waiter is released.
    async fn exchange_and_persist(&self, refresh: &Secret<String>) -> RefreshOutcome {
        let outcome = self.exchange(refresh).await;
        metrics::record_refresh(outcome.is_ok());
        match &outcome {
            Ok(access) => {
                if let Err(e) = self.credentials.save_access(access).await {
                    warn!(error = %e, "failed to persist refreshed access token");
                }
                info!("access token refreshed");
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, signing out");
                self.purge_credentials().await;
            }
        }
        outcome
    }

    async fn exchange(&self, refresh: &Secret<String>) -> RefreshOutcome {
        let request = RequestDescriptor::new(Method::POST, self.refresh_path.as_str())
            .with_json(&RefreshRequest {
                refresh: refresh.expose_str(),
            })
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let response = self
            .transport
            .send(&request)
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;
        if !response.is_success() {
            return Err(RefreshError::Rejected {
                status: response.status().as_u16(),
            });
        }
        parse_refresh_response(response.body())
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))
    }

    /// A failed purge is logged, never surfaced: the caller is already
    /// getting the error that triggered it.
    async fn purge_credentials(&self) {
        if let Err(e) = self.credentials.purge_all().await {
            warn!(error = %e, "failed to purge credentials");
        }
    }
}

fn new_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().simple())
}

fn outcome_label(result: &Result<ApiResponse>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(Error::Status(_)) => "http_error",
        Err(Error::Timeout(_)) => "timeout",
        Err(Error::Transport(_)) => "transport_error",
        Err(Error::Refresh(_)) => "refresh_failed",
        Err(Error::InvalidRequest(_)) | Err(Error::Config(_)) => "invalid_request",
        Err(Error::Decode(_)) => "decode_error",
        Err(Error::Storage(_)) => "storage_error",
    }
}
