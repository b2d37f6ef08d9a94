//! Durable client-side key-value storage
//!
//! Credentials and carts live in a flat string-to-string map. Two backends
//! are provided: `FileStore` persists the map as a JSON object on disk, and
//! `MemoryStore` keeps it in process (tests, ephemeral sessions).
//!
//! Both serialize access through a tokio Mutex. Nothing here offers
//! transactional isolation across keys; callers that read several keys must
//! tolerate a concurrent purge landing between reads.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Boxed future returned by `KeyValueStore` methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Flat string key-value storage.
///
/// Uses `Pin<Box<dyn Future>>` return types so the store can be shared as
/// `Arc<dyn KeyValueStore>`.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Missing keys yield `None`.
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    /// Insert or replace a value.
    fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, Result<()>>;

    /// Remove every listed key in one write. Absent keys are ignored.
    fn remove<'a>(&'a self, keys: &'a [&'a str]) -> StoreFuture<'a, Result<()>>;
}

/// In-process store. Contents are lost when dropped.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with the given pairs.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let state = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            state: Mutex::new(state),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { self.state.lock().await.get(key).cloned() })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, Result<()>> {
        Box::pin(async move {
            self.state.lock().await.insert(key.to_string(), value);
            Ok(())
        })
    }

    fn remove<'a>(&'a self, keys: &'a [&'a str]) -> StoreFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            for key in keys {
                state.remove(*key);
            }
            Ok(())
        })
    }
}

/// JSON-file backed store.
///
/// The file is read once on open; every mutation rewrites it atomically
/// (temp file + rename, mode 0600) while holding the lock. The in-memory map
/// only changes once the write succeeded, so a failed write leaves memory
/// and disk agreeing on the previous contents.
pub struct FileStore {
    path: PathBuf,
    state: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, creating an empty `{}` file on cold start.
    pub async fn open(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading storage file: {e}")))?;
            let entries: HashMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| Error::Parse(format!("parsing storage file: {e}")))?;
            info!(path = %path.display(), keys = entries.len(), "opened storage");
            entries
        } else {
            info!(path = %path.display(), "storage file not found, starting empty");
            let entries = HashMap::new();
            write_atomic(&path, &entries).await?;
            entries
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { self.state.lock().await.get(key).cloned() })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let mut next = state.clone();
            next.insert(key.to_string(), value);
            write_atomic(&self.path, &next).await?;
            *state = next;
            debug!(key, "stored value");
            Ok(())
        })
    }

    fn remove<'a>(&'a self, keys: &'a [&'a str]) -> StoreFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if !keys.iter().any(|key| state.contains_key(*key)) {
                return Ok(());
            }
            let mut next = state.clone();
            for key in keys {
                next.remove(*key);
            }
            write_atomic(&self.path, &next).await?;
            *state = next;
            debug!(?keys, "removed keys");
            Ok(())
        })
    }
}

/// Write the map to `path` atomically with owner-only permissions.
async fn write_atomic(path: &Path, data: &HashMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Parse(format!("serializing storage: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("storage path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".storefront.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp storage file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting storage file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp storage file: {e}")))?;

    debug!(path = %path.display(), "persisted storage");
    Ok(())
}
