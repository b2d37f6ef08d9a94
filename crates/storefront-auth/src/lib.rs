//! Storefront credential library
//!
//! Owns everything the API client needs to know about tokens without knowing
//! anything about HTTP:
//! 1. `storage`: durable key-value map (file or memory backed)
//! 2. `credentials::CredentialStore`: the `access`/`refresh`/legacy `token`
//!    keys, read with shape validation, written and purged in one place
//! 3. `token`: structural validation, claim decoding, refresh wire format

pub mod constants;
pub mod credentials;
pub mod error;
pub mod storage;
pub mod token;

pub use constants::*;
pub use credentials::{CredentialPair, CredentialStore, StoredCredentials, TokenSlot};
pub use error::{Error, Result};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StoreFuture};
pub use token::{Claims, RefreshRequest, claims, is_well_formed, parse_refresh_response};
