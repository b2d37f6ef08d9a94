//! Cart line items and shopper identity

use serde::{Deserialize, Serialize};

/// Storage key prefix for persisted carts.
pub const CART_KEY_PREFIX: &str = "cart:";

/// One product line. Prices are in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    pub name: String,
    pub price: u64,
    pub qty: u32,
}

impl CartItem {
    pub fn new(product_id: impl Into<String>, name: impl Into<String>, price: u64, qty: u32) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            price,
            qty,
        }
    }

    pub fn line_total(&self) -> u64 {
        self.price.saturating_mul(u64::from(self.qty))
    }
}

/// Whose cart is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Guest,
    User(String),
}

impl Identity {
    pub fn storage_key(&self) -> String {
        match self {
            Identity::Guest => format!("{CART_KEY_PREFIX}guest"),
            Identity::User(id) => format!("{CART_KEY_PREFIX}{id}"),
        }
    }
}

/// Fold `incoming` into `items`, summing quantities of products present in
/// both. The incoming line's name and price win; they are the newer copy.
pub(crate) fn merge_into(items: &mut Vec<CartItem>, incoming: impl IntoIterator<Item = CartItem>) {
    for item in incoming {
        match items.iter_mut().find(|i| i.product_id == item.product_id) {
            Some(existing) => {
                existing.qty = existing.qty.saturating_add(item.qty);
                existing.name = item.name;
                existing.price = item.price;
            }
            None => items.push(item),
        }
    }
}
