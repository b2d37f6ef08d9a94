//! Persistent cart keyed by shopper identity
//!
//! The active identity's items are held in memory and written back to the
//! shared key-value storage after every change. Memory is updated only once
//! the write succeeded. Switching identity re-keys
//! the cart without merging. Only `login` merges, and only the guest cart
//! into the user's, once.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use storefront_api::LogoutHook;
use storefront_auth::{CredentialStore, KeyValueStore, claims};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::item::{CartItem, Identity, merge_into};

struct State {
    identity: Identity,
    items: Vec<CartItem>,
}

pub struct CartStore {
    storage: Arc<dyn KeyValueStore>,
    state: Mutex<State>,
}

impl CartStore {
    /// Open the cart for `identity`.
    pub async fn open(storage: Arc<dyn KeyValueStore>, identity: Identity) -> Self {
        let items = load(storage.as_ref(), &identity).await;
        Self {
            storage,
            state: Mutex::new(State { identity, items }),
        }
    }

    /// Open the cart for whoever the stored access token belongs to, or the
    /// guest cart when nobody is signed in.
    pub async fn open_for_session(credentials: &CredentialStore) -> Self {
        let identity = identity_from_credentials(credentials).await;
        Self::open(credentials.storage().clone(), identity).await
    }

    pub async fn identity(&self) -> Identity {
        self.state.lock().await.identity.clone()
    }

    pub async fn items(&self) -> Vec<CartItem> {
        self.state.lock().await.items.clone()
    }

    /// Sum of line totals, in minor units.
    pub async fn subtotal(&self) -> u64 {
        self.state
            .lock()
            .await
            .items
            .iter()
            .fold(0u64, |acc, item| acc.saturating_add(item.line_total()))
    }

    /// Total quantity across all lines.
    pub async fn item_count(&self) -> u64 {
        self.state
            .lock()
            .await
            .items
            .iter()
            .map(|item| u64::from(item.qty))
            .sum()
    }

    /// Add `item`, or raise the quantity of the line already holding it.
    pub async fn add_item(&self, item: CartItem) -> Result<()> {
        if item.qty == 0 {
            return Err(Error::InvalidQuantity);
        }
        let mut state = self.state.lock().await;
        debug!(product_id = %item.product_id, qty = item.qty, "adding to cart");
        let mut items = state.items.clone();
        merge_into(&mut items, [item]);
        self.commit(&mut state, items).await
    }

    /// Remove a product line. Removing an absent product is a no-op.
    pub async fn remove_item(&self, product_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.items.iter().any(|item| item.product_id == product_id) {
            return Ok(());
        }
        let items = state
            .items
            .iter()
            .filter(|item| item.product_id != product_id)
            .cloned()
            .collect();
        self.commit(&mut state, items).await
    }

    /// Set a line's quantity. Zero removes the line.
    pub async fn set_qty(&self, product_id: &str, qty: u32) -> Result<()> {
        if qty == 0 {
            return self.remove_item(product_id).await;
        }
        let mut state = self.state.lock().await;
        let mut items = state.items.clone();
        let line = items
            .iter_mut()
            .find(|item| item.product_id == product_id)
            .ok_or_else(|| Error::NotInCart(product_id.to_string()))?;
        line.qty = qty;
        self.commit(&mut state, items).await
    }

    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.commit(&mut state, Vec::new()).await
    }

    /// Make `identity` the active cart, loading whatever it has stored. The
    /// previous cart stays stored under its own key.
    pub async fn switch_identity(&self, identity: Identity) {
        let mut state = self.state.lock().await;
        if state.identity == identity {
            return;
        }
        state.items = load(self.storage.as_ref(), &identity).await;
        info!(from = %state.identity.storage_key(), to = %identity.storage_key(), "cart identity switched");
        state.identity = identity;
    }

    /// Switch to `user_id`'s cart and fold the guest cart into it. The
    /// guest cart is erased afterwards so the merge happens once.
    pub async fn login(&self, user_id: &str) -> Result<()> {
        let user = Identity::User(user_id.to_string());
        let mut state = self.state.lock().await;

        let guest = if state.identity == Identity::Guest {
            state.items.clone()
        } else {
            load(self.storage.as_ref(), &Identity::Guest).await
        };
        let mut items = if state.identity == user {
            state.items.clone()
        } else {
            load(self.storage.as_ref(), &user).await
        };

        let merged = guest.len();
        merge_into(&mut items, guest);
        self.persist(&user, &items).await?;
        state.identity = user;
        state.items = items;

        let guest_key = Identity::Guest.storage_key();
        self.storage.remove(&[guest_key.as_str()]).await?;
        info!(user_id, merged_lines = merged, "guest cart merged on login");
        Ok(())
    }

    /// Persist `items` for the active identity, then make them current.
    async fn commit(&self, state: &mut State, items: Vec<CartItem>) -> Result<()> {
        self.persist(&state.identity, &items).await?;
        state.items = items;
        Ok(())
    }

    async fn persist(&self, identity: &Identity, items: &[CartItem]) -> Result<()> {
        let encoded = serde_json::to_string(items).map_err(|e| Error::Encode(e.to_string()))?;
        self.storage.set(&identity.storage_key(), encoded).await?;
        Ok(())
    }
}

impl LogoutHook for CartStore {
    fn on_logout(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.switch_identity(Identity::Guest).await;
        })
    }
}

/// Identity of the signed-in user, from the stored access token's claims.
pub async fn identity_from_credentials(credentials: &CredentialStore) -> Identity {
    let Some(access) = credentials.access().await.usable() else {
        return Identity::Guest;
    };
    match claims(access.expose_str()) {
        Ok(claims) => claims.user_id.map_or(Identity::Guest, Identity::User),
        Err(e) => {
            warn!(error = %e, "could not read user from access token");
            Identity::Guest
        }
    }
}

/// A missing or unreadable cart is an empty cart.
async fn load(storage: &dyn KeyValueStore, identity: &Identity) -> Vec<CartItem> {
    let key = identity.storage_key();
    let Some(raw) = storage.get(&key).await else {
        return Vec::new();
    };
    match serde_json::from_str(&raw) {
        Ok(items) => items,
        Err(e) => {
            warn!(key = %key, error = %e, "discarding unreadable cart");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use storefront_auth::{FileStore, MemoryStore, StoreFuture};

    fn memory() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new())
    }

    /// Memory store whose writes can be switched to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    impl FlakyStore {
        fn fail_writes(&self) {
            self.failing.store(true, Ordering::SeqCst);
        }

        fn check(&self) -> storefront_auth::Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                Err(storefront_auth::Error::Io("disk full".into()))
            } else {
                Ok(())
            }
        }
    }

    impl KeyValueStore for FlakyStore {
        fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
            self.inner.get(key)
        }

        fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, storefront_auth::Result<()>> {
            Box::pin(async move {
                self.check()?;
                self.inner.set(key, value).await
            })
        }

        fn remove<'a>(&'a self, keys: &'a [&'a str]) -> StoreFuture<'a, storefront_auth::Result<()>> {
            Box::pin(async move {
                self.check()?;
                self.inner.remove(keys).await
            })
        }
    }

    fn lamp(qty: u32) -> CartItem {
        CartItem::new("lamp", "Desk lamp", 2_500, qty)
    }

    fn mug(qty: u32) -> CartItem {
        CartItem::new("mug", "Mug", 900, qty)
    }

    fn token_for(user: &str) -> String {
        use base64::Engine;
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(format!(r#"{{"user_id":"{user}"}}"#));
        format!("eyJhbGciOiJIUzI1NiJ9.{payload}.c2ln")
    }

    #[tokio::test]
    async fn add_merges_lines_and_persists() {
        let kv = memory();
        let cart = CartStore::open(kv.clone(), Identity::Guest).await;
        cart.add_item(lamp(1)).await.unwrap();
        cart.add_item(lamp(2)).await.unwrap();
        cart.add_item(mug(1)).await.unwrap();

        assert_eq!(cart.items().await, vec![lamp(3), mug(1)]);
        assert_eq!(cart.subtotal().await, 3 * 2_500 + 900);
        assert_eq!(cart.item_count().await, 4);

        let reopened = CartStore::open(kv, Identity::Guest).await;
        assert_eq!(reopened.items().await, vec![lamp(3), mug(1)]);
    }

    #[tokio::test]
    async fn zero_quantity_add_is_rejected() {
        let cart = CartStore::open(memory(), Identity::Guest).await;
        assert!(matches!(cart.add_item(lamp(0)).await, Err(Error::InvalidQuantity)));
        assert!(cart.items().await.is_empty());
    }

    #[tokio::test]
    async fn set_qty_updates_and_zero_removes() {
        let cart = CartStore::open(memory(), Identity::Guest).await;
        cart.add_item(lamp(1)).await.unwrap();
        cart.add_item(mug(1)).await.unwrap();

        cart.set_qty("lamp", 4).await.unwrap();
        assert_eq!(cart.items().await, vec![lamp(4), mug(1)]);

        cart.set_qty("mug", 0).await.unwrap();
        assert_eq!(cart.items().await, vec![lamp(4)]);

        assert!(matches!(cart.set_qty("sofa", 1).await, Err(Error::NotInCart(_))));
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let kv = memory();
        let cart = CartStore::open(kv.clone(), Identity::User("7".into())).await;
        cart.add_item(lamp(1)).await.unwrap();
        cart.add_item(mug(2)).await.unwrap();

        cart.remove_item("lamp").await.unwrap();
        cart.remove_item("not-there").await.unwrap();
        assert_eq!(cart.items().await, vec![mug(2)]);

        cart.clear().await.unwrap();
        assert!(cart.items().await.is_empty());
        assert_eq!(kv.get("cart:7").await.as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn switching_identity_rekeys_without_merging() {
        let kv = memory();
        let cart = CartStore::open(kv.clone(), Identity::Guest).await;
        cart.add_item(lamp(1)).await.unwrap();

        cart.switch_identity(Identity::User("7".into())).await;
        assert!(cart.items().await.is_empty());
        cart.add_item(mug(1)).await.unwrap();

        cart.switch_identity(Identity::Guest).await;
        assert_eq!(cart.items().await, vec![lamp(1)]);
        assert!(kv.get("cart:7").await.is_some());
    }

    #[tokio::test]
    async fn login_merges_guest_cart_once() {
        let kv = memory();
        kv.set("cart:7", serde_json::to_string(&vec![lamp(1)]).unwrap())
            .await
            .unwrap();

        let cart = CartStore::open(kv.clone(), Identity::Guest).await;
        cart.add_item(lamp(2)).await.unwrap();
        cart.add_item(mug(1)).await.unwrap();

        cart.login("7").await.unwrap();
        assert_eq!(cart.identity().await, Identity::User("7".into()));
        assert_eq!(cart.items().await, vec![lamp(3), mug(1)]);
        assert_eq!(kv.get("cart:guest").await, None);

        // logging in again has no guest cart left to merge
        cart.login("7").await.unwrap();
        assert_eq!(cart.items().await, vec![lamp(3), mug(1)]);
    }

    #[tokio::test]
    async fn logout_hook_switches_back_to_guest() {
        let kv = memory();
        let cart = CartStore::open(kv.clone(), Identity::User("7".into())).await;
        cart.add_item(lamp(1)).await.unwrap();

        cart.on_logout().await;

        assert_eq!(cart.identity().await, Identity::Guest);
        assert!(cart.items().await.is_empty());
        // the user's cart is kept for their next session
        assert!(kv.get("cart:7").await.is_some());
    }

    #[tokio::test]
    async fn failed_persist_leaves_cart_unchanged() {
        let kv = Arc::new(FlakyStore::default());
        let cart = CartStore::open(kv.clone(), Identity::Guest).await;
        cart.add_item(lamp(1)).await.unwrap();
        cart.add_item(mug(2)).await.unwrap();
        kv.fail_writes();

        assert!(matches!(cart.add_item(lamp(1)).await, Err(Error::Storage(_))));
        assert!(matches!(cart.set_qty("mug", 5).await, Err(Error::Storage(_))));
        assert!(matches!(cart.remove_item("lamp").await, Err(Error::Storage(_))));
        assert!(matches!(cart.clear().await, Err(Error::Storage(_))));
        assert_eq!(cart.items().await, vec![lamp(1), mug(2)]);

        assert!(matches!(cart.login("7").await, Err(Error::Storage(_))));
        assert_eq!(cart.identity().await, Identity::Guest);
        assert_eq!(cart.items().await, vec![lamp(1), mug(2)]);
    }

    #[tokio::test]
    async fn unreadable_cart_loads_empty() {
        let kv = Arc::new(MemoryStore::with_entries([("cart:guest", "{not json")]));
        let cart = CartStore::open(kv, Identity::Guest).await;
        assert!(cart.items().await.is_empty());
    }

    #[tokio::test]
    async fn session_identity_comes_from_access_token() {
        let token = token_for("u-9");
        let kv = Arc::new(MemoryStore::with_entries([("access", token.as_str())]));
        let credentials = CredentialStore::new(kv);
        assert_eq!(
            identity_from_credentials(&credentials).await,
            Identity::User("u-9".into())
        );

        let anonymous = CredentialStore::new(memory());
        assert_eq!(identity_from_credentials(&anonymous).await, Identity::Guest);

        let garbage = CredentialStore::new(Arc::new(MemoryStore::with_entries([("access", "x.y.z")])));
        assert_eq!(identity_from_credentials(&garbage).await, Identity::Guest);
    }

    #[tokio::test]
    async fn cart_survives_file_store_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");

        let cart = CartStore::open(Arc::new(FileStore::open(path.clone()).await.unwrap()), Identity::Guest).await;
        cart.add_item(mug(2)).await.unwrap();
        drop(cart);

        let reopened = CartStore::open(Arc::new(FileStore::open(path).await.unwrap()), Identity::Guest).await;
        assert_eq!(reopened.items().await, vec![mug(2)]);
    }
}
