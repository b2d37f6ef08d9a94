//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! `STOREFRONT_BASE_URL` overrides `api.base_url` so one config file can be
//! pointed at different backends.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use storefront_api::{ClientConfig, DEFAULT_PUBLIC_PATHS, PublicPathSet};
use storefront_auth::DEFAULT_REFRESH_PATH;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Backend connection settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Anchored, case-insensitive regexes over the request path. Replaces
    /// the built-in catalog rules when set.
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

/// Where the session (tokens and carts) is kept between runs
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

fn default_refresh_path() -> String {
    DEFAULT_REFRESH_PATH.to_string()
}

fn default_timeout() -> u64 {
    20
}

fn default_public_paths() -> Vec<String> {
    DEFAULT_PUBLIC_PATHS.iter().map(|p| p.to_string()).collect()
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("storefront-session.json")
}

impl Config {
    /// Load configuration from a TOML file, overlay environment variables,
    /// then validate.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| common::Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(base_url) = std::env::var("STOREFRONT_BASE_URL") {
            config.api.base_url = base_url;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Invalid(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Invalid(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if !self.api.refresh_path.starts_with('/') {
            return Err(common::Error::Invalid(format!(
                "refresh_path must start with /, got: {}",
                self.api.refresh_path
            )));
        }

        PublicPathSet::new(&self.api.base_url, &self.api.public_paths)
            .map_err(|e| common::Error::Invalid(format!("invalid public_paths pattern: {e}")))?;

        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api.base_url.clone(),
            refresh_path: self.api.refresh_path.clone(),
            timeout: Duration::from_secs(self.api.timeout_secs),
            public_paths: self.api.public_paths.clone(),
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("storefront.toml")
    }
}
