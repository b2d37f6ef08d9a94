//! Shopping cart persisted next to the session credentials
//!
//! Carts are stored per shopper under `cart:<user_id>` (or `cart:guest`) in
//! the same key-value storage as the tokens. `CartStore` implements the API
//! client's `LogoutHook`, so signing out drops back to the guest cart.

pub mod error;
pub mod item;
pub mod store;

pub use error::{Error, Result};
pub use item::{CART_KEY_PREFIX, CartItem, Identity};
pub use store::{CartStore, identity_from_credentials};
