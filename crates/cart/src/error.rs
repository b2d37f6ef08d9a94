//! Error types for cart operations

/// Errors from cart operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] storefront_auth::Error),

    #[error("failed to encode cart: {0}")]
    Encode(String),

    #[error("quantity must be at least 1")]
    InvalidQuantity,

    #[error("product {0} is not in the cart")]
    NotInCart(String),
}

/// Result alias for cart operations.
pub type Result<T> = std::result::Result<T, Error>;
