//! In-process mock backend and storage helpers for client tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use storefront_auth::{CredentialStore, DEFAULT_REFRESH_PATH, KeyValueStore, MemoryStore, StoreFuture};
use tokio::net::TcpListener;
use tokio::sync::Barrier;

use crate::client::{ApiClient, ClientConfig};

pub const FRESH: &str = "f.r.esh";
pub const STALE: &str = "s.ta.le";
pub const REFRESH: &str = "r.e.f";

/// Path the backend answers slowly, for timeout tests.
pub const SLOW_PATH: &str = "/api/slow/";

#[derive(Debug, Clone)]
pub enum RefreshReply {
    /// 200 with `{"access": token}`.
    Issue(String),
    /// The given status with an error body.
    Reject(u16),
    /// 200 with this raw body.
    Raw(&'static str),
}

#[derive(Debug, Clone)]
pub struct Seen {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
}

/// Accepts only `Bearer FRESH`; serves `/api/products*` anonymously.
pub struct Backend {
    pub refresh_calls: AtomicUsize,
    refresh_delay: Duration,
    refresh_reply: Mutex<RefreshReply>,
    refresh_bodies: Mutex<Vec<serde_json::Value>>,
    seen: Mutex<Vec<Seen>>,
    rejected_detail: Mutex<String>,
    always_unauthorized: Mutex<HashSet<String>>,
    stale_barrier: Mutex<Option<Arc<Barrier>>>,
}

impl Backend {
    pub fn new() -> Arc<Self> {
        Self::with_refresh_delay(Duration::ZERO)
    }

    pub fn with_refresh_delay(refresh_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            refresh_calls: AtomicUsize::new(0),
            refresh_delay,
            refresh_reply: Mutex::new(RefreshReply::Issue(FRESH.to_string())),
            refresh_bodies: Mutex::new(Vec::new()),
            seen: Mutex::new(Vec::new()),
            rejected_detail: Mutex::new("Token has expired".to_string()),
            always_unauthorized: Mutex::new(HashSet::new()),
            stale_barrier: Mutex::new(None),
        })
    }

    pub fn set_refresh_reply(&self, reply: RefreshReply) {
        *self.refresh_reply.lock().unwrap() = reply;
    }

    /// `detail` sent with 401s for a bearer the backend does not accept.
    pub fn set_rejected_detail(&self, detail: &str) {
        *self.rejected_detail.lock().unwrap() = detail.to_string();
    }

    /// Answer 401 on `path` no matter what credentials arrive.
    pub fn always_unauthorized(&self, path: &str) {
        self.always_unauthorized
            .lock()
            .unwrap()
            .insert(path.to_string());
    }

    /// Hold the next `parties` rejected-bearer responses until all of them
    /// arrived, so they reach the client while the first refresh is running.
    /// The hold covers one batch only; later rejections answer immediately.
    pub fn hold_rejections(&self, parties: usize) {
        *self.stale_barrier.lock().unwrap() = Some(Arc::new(Barrier::new(parties)));
    }

    pub fn release_rejections(&self) {
        self.stale_barrier.lock().unwrap().take();
    }

    pub fn is_holding_rejections(&self) -> bool {
        self.stale_barrier.lock().unwrap().is_some()
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_bodies(&self) -> Vec<serde_json::Value> {
        self.refresh_bodies.lock().unwrap().clone()
    }

    /// Non-refresh requests, in arrival order.
    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn authorizations_for(&self, path: &str) -> Vec<Option<String>> {
        self.seen()
            .into_iter()
            .filter(|s| s.path == path)
            .map(|s| s.authorization)
            .collect()
    }
}

fn json(status: StatusCode, body: serde_json::Value) -> Response {
    (status, axum::Json(body)).into_response()
}

async fn route(State(backend): State<Arc<Backend>>, request: Request<Body>) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let authorization = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if path == DEFAULT_REFRESH_PATH {
        backend.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let body = axum::body::to_bytes(request.into_body(), 64 * 1024)
            .await
            .unwrap();
        let parsed = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        backend.refresh_bodies.lock().unwrap().push(parsed);
        tokio::time::sleep(backend.refresh_delay).await;

        let reply = backend.refresh_reply.lock().unwrap().clone();
        return match reply {
            RefreshReply::Issue(token) => json(StatusCode::OK, serde_json::json!({ "access": token })),
            RefreshReply::Reject(status) => json(
                StatusCode::from_u16(status).unwrap(),
                serde_json::json!({ "detail": "Token is invalid or expired", "code": "token_not_valid" }),
            ),
            RefreshReply::Raw(body) => (StatusCode::OK, body).into_response(),
        };
    }

    backend.seen.lock().unwrap().push(Seen {
        method,
        path: path.clone(),
        authorization: authorization.clone(),
    });

    if path == SLOW_PATH {
        tokio::time::sleep(Duration::from_secs(5)).await;
        return json(StatusCode::OK, serde_json::json!({ "slow": true }));
    }

    let not_provided = || {
        json(
            StatusCode::UNAUTHORIZED,
            serde_json::json!({ "detail": "Authentication credentials were not provided." }),
        )
    };

    if backend.always_unauthorized.lock().unwrap().contains(&path) {
        return not_provided();
    }

    match authorization {
        None if path.starts_with("/api/products") => {
            json(StatusCode::OK, serde_json::json!({ "path": path }))
        }
        None => not_provided(),
        Some(header) if header == format!("Bearer {FRESH}") => {
            json(StatusCode::OK, serde_json::json!({ "path": path, "user": "fresh" }))
        }
        Some(_) => {
            let barrier = backend.stale_barrier.lock().unwrap().clone();
            if let Some(barrier) = barrier {
                if barrier.wait().await.is_leader() {
                    backend.release_rejections();
                }
            }
            let detail = backend.rejected_detail.lock().unwrap().clone();
            json(StatusCode::UNAUTHORIZED, serde_json::json!({ "detail": detail }))
        }
    }
}

/// Serve `backend` on an ephemeral local port.
pub async fn start_backend(backend: Arc<Backend>) -> (String, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        let app = axum::Router::new().fallback(route).with_state(backend);
        axum::serve(listener, app).await.unwrap();
    });
    (url, handle)
}

pub fn client_for(base_url: &str, storage: Arc<dyn KeyValueStore>) -> ApiClient {
    client_with_timeout(base_url, storage, Duration::from_secs(5))
}

pub fn client_with_timeout(
    base_url: &str,
    storage: Arc<dyn KeyValueStore>,
    timeout: Duration,
) -> ApiClient {
    let mut config = ClientConfig::new(base_url);
    config.timeout = timeout;
    ApiClient::new(&config, CredentialStore::new(storage)).unwrap()
}

/// Memory store that counts `remove` calls, i.e. purges.
pub struct CountingStore {
    inner: MemoryStore,
    pub removes: AtomicUsize,
}

impl CountingStore {
    pub fn with_entries(entries: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::with_entries(entries.iter().copied()),
            removes: AtomicUsize::new(0),
        })
    }

    pub fn purges(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }
}

impl KeyValueStore for CountingStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        self.inner.get(key)
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, storefront_auth::Result<()>> {
        self.inner.set(key, value)
    }

    fn remove<'a>(&'a self, keys: &'a [&'a str]) -> StoreFuture<'a, storefront_auth::Result<()>> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(keys)
    }
}
