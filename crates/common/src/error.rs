//! Configuration error types

use std::path::PathBuf;

use thiserror::Error;

/// Why a config file could not be turned into a usable configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;
