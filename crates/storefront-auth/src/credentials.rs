//! Credential store over the durable key-value storage
//!
//! Every read and write of the three credential keys goes through
//! `CredentialStore`, so the purge-on-failure behaviour lives in exactly one
//! place. Reads classify what they find into a `TokenSlot` instead of handing
//! back raw strings: a structurally invalid token must never reach a header.

use std::sync::Arc;

use common::Secret;
use tracing::{debug, info};

use crate::constants::{ACCESS_KEY, CREDENTIAL_KEYS, LEGACY_ACCESS_KEY, REFRESH_KEY};
use crate::error::{Error, Result};
use crate::storage::KeyValueStore;
use crate::token::is_well_formed;

/// An access/refresh token pair as issued by the login exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub access: Secret<String>,
    pub refresh: Secret<String>,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: Secret::new(access.into()),
            refresh: Secret::new(refresh.into()),
        }
    }
}

/// What a storage lookup found for one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSlot {
    /// Nothing stored (or an empty string).
    Absent,
    /// A structurally valid token.
    WellFormed(Secret<String>),
    /// Something is stored but it is not a usable token.
    Malformed,
}

impl TokenSlot {
    fn classify(raw: Option<String>) -> Self {
        match raw {
            None => TokenSlot::Absent,
            Some(value) if value.is_empty() => TokenSlot::Absent,
            Some(value) if is_well_formed(&value) => TokenSlot::WellFormed(Secret::new(value)),
            Some(_) => TokenSlot::Malformed,
        }
    }

    /// The token, if it is usable.
    pub fn usable(self) -> Option<Secret<String>> {
        match self {
            TokenSlot::WellFormed(token) => Some(token),
            TokenSlot::Absent | TokenSlot::Malformed => None,
        }
    }
}

/// Snapshot of both credential slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredentials {
    pub access: TokenSlot,
    pub refresh: TokenSlot,
}

/// Single entry point for credential persistence.
#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    /// The underlying storage, for collaborators that keep their own keys
    /// next to the credentials (the cart).
    pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.storage
    }

    /// Read both slots.
    pub async fn load(&self) -> StoredCredentials {
        StoredCredentials {
            access: self.access().await,
            refresh: self.refresh().await,
        }
    }

    /// Read the access token, falling back to the legacy key when the
    /// primary key holds nothing.
    pub async fn access(&self) -> TokenSlot {
        match TokenSlot::classify(self.storage.get(ACCESS_KEY).await) {
            TokenSlot::Absent => {
                let legacy = TokenSlot::classify(self.storage.get(LEGACY_ACCESS_KEY).await);
                if legacy != TokenSlot::Absent {
                    debug!("access token read from legacy key");
                }
                legacy
            }
            found => found,
        }
    }

    pub async fn refresh(&self) -> TokenSlot {
        TokenSlot::classify(self.storage.get(REFRESH_KEY).await)
    }

    /// Persist a freshly issued pair. Both tokens must be well-formed.
    pub async fn save(&self, pair: &CredentialPair) -> Result<()> {
        if !is_well_formed(pair.access.expose()) {
            return Err(Error::MalformedToken("access token".into()));
        }
        if !is_well_formed(pair.refresh.expose()) {
            return Err(Error::MalformedToken("refresh token".into()));
        }
        self.storage
            .set(ACCESS_KEY, pair.access.expose().clone())
            .await?;
        self.storage
            .set(REFRESH_KEY, pair.refresh.expose().clone())
            .await?;
        info!("stored credential pair");
        Ok(())
    }

    /// Replace only the access token. Refresh tokens are not rotated by the
    /// backend, so a refresh exchange leaves the refresh key untouched.
    pub async fn save_access(&self, access: &Secret<String>) -> Result<()> {
        if !is_well_formed(access.expose()) {
            return Err(Error::MalformedToken("access token".into()));
        }
        self.storage.set(ACCESS_KEY, access.expose().clone()).await?;
        debug!("stored refreshed access token");
        Ok(())
    }

    /// Erase the access, refresh and legacy keys.
    pub async fn purge_all(&self) -> Result<()> {
        self.storage.remove(&CREDENTIAL_KEYS).await?;
        info!("purged stored credentials");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStore, MemoryStore};

    fn store_with(entries: &[(&str, &str)]) -> (Arc<MemoryStore>, CredentialStore) {
        let kv = Arc::new(MemoryStore::with_entries(entries.iter().copied()));
        let creds = CredentialStore::new(kv.clone());
        (kv, creds)
    }

    #[tokio::test]
    async fn empty_storage_is_absent() {
        let (_, creds) = store_with(&[]);
        let loaded = creds.load().await;
        assert_eq!(loaded.access, TokenSlot::Absent);
        assert_eq!(loaded.refresh, TokenSlot::Absent);
    }

    #[tokio::test]
    async fn well_formed_tokens_are_usable() {
        let (_, creds) = store_with(&[("access", "a.b.c"), ("refresh", "r.e.f")]);
        let loaded = creds.load().await;
        assert_eq!(loaded.access.usable().unwrap().expose(), "a.b.c");
        assert_eq!(loaded.refresh.usable().unwrap().expose(), "r.e.f");
    }

    #[tokio::test]
    async fn malformed_access_is_reported_not_returned() {
        let (_, creds) = store_with(&[("access", "garbage")]);
        assert_eq!(creds.access().await, TokenSlot::Malformed);
        assert!(creds.access().await.usable().is_none());
    }

    #[tokio::test]
    async fn legacy_key_is_a_read_fallback() {
        let (_, creds) = store_with(&[("token", "l.e.g")]);
        assert_eq!(creds.access().await.usable().unwrap().expose(), "l.e.g");
    }

    #[tokio::test]
    async fn empty_primary_falls_back_to_legacy() {
        let (_, creds) = store_with(&[("access", ""), ("token", "l.e.g")]);
        assert_eq!(creds.access().await.usable().unwrap().expose(), "l.e.g");
    }

    #[tokio::test]
    async fn malformed_primary_does_not_fall_back() {
        let (_, creds) = store_with(&[("access", "junk"), ("token", "l.e.g")]);
        assert_eq!(creds.access().await, TokenSlot::Malformed);
    }

    #[tokio::test]
    async fn purge_clears_all_three_keys() {
        let (kv, creds) = store_with(&[
            ("access", "a.b.c"),
            ("refresh", "r.e.f"),
            ("token", "l.e.g"),
            ("cart:guest", "[]"),
        ]);
        creds.purge_all().await.unwrap();
        assert_eq!(kv.get("access").await, None);
        assert_eq!(kv.get("refresh").await, None);
        assert_eq!(kv.get("token").await, None);
        assert_eq!(kv.get("cart:guest").await.as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn save_rejects_malformed_pair() {
        let (kv, creds) = store_with(&[]);
        let result = creds.save(&CredentialPair::new("a.b.c", "opaque")).await;
        assert!(matches!(result, Err(Error::MalformedToken(_))));
        assert_eq!(kv.get("access").await, None);
    }

    #[tokio::test]
    async fn save_access_keeps_refresh() {
        let (kv, creds) = store_with(&[("access", "o.l.d"), ("refresh", "r.e.f")]);
        creds.save_access(&Secret::from("n.e.w")).await.unwrap();
        assert_eq!(kv.get("access").await.as_deref(), Some("n.e.w"));
        assert_eq!(kv.get("refresh").await.as_deref(), Some("r.e.f"));
    }

    #[tokio::test]
    async fn pair_roundtrips_through_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");

        let creds = CredentialStore::new(Arc::new(FileStore::open(path.clone()).await.unwrap()));
        creds
            .save(&CredentialPair::new("a.b.c", "r.e.f"))
            .await
            .unwrap();

        let reopened = CredentialStore::new(Arc::new(FileStore::open(path).await.unwrap()));
        let loaded = reopened.load().await;
        assert_eq!(loaded.access.usable().unwrap().expose(), "a.b.c");
        assert_eq!(loaded.refresh.usable().unwrap().expose(), "r.e.f");
    }
}
