//! Common types shared by the storefront client crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
