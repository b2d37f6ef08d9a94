//! Storefront command-line client
//!
//! Thin shell over the client libraries:
//! 1. Loads TOML config and opens the session file
//! 2. Builds the API client and the cart, wiring the cart in as a logout hook
//! 3. Runs one command and prints the result to stdout
//!
//! Logs go to stderr as JSON so stdout stays machine-readable.

mod cli;
mod config;
mod metrics;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cart::{CartItem, CartStore, Identity, identity_from_credentials};
use storefront_api::{ApiClient, ApiResponse, ClientConfig};
use storefront_auth::{CredentialPair, CredentialStore, FileStore, KeyValueStore};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Args, CartCommand, Command};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let args = Args::parse();

    let prometheus = if args.metrics {
        Some(metrics::install_recorder().context("failed to install metrics recorder")?)
    } else {
        None
    };

    let config_path = Config::resolve_path(args.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.api.base_url,
        timeout_secs = config.api.timeout_secs,
        public_paths = config.api.public_paths.len(),
        storage = %config.storage.path.display(),
        "configuration loaded"
    );

    let storage = FileStore::open(config.storage.path.clone())
        .await
        .with_context(|| format!("failed to open session file {}", config.storage.path.display()))?;
    let session = Session::open(&config.client_config(), Arc::new(storage)).await?;

    let name = args.command.name();
    let result = session.run(args.command).await;
    metrics::record_command(name, result.is_ok());
    let output = result?;
    println!("{output}");

    if let Some(handle) = prometheus {
        print!("{}", handle.render());
    }
    Ok(())
}

/// API client and cart sharing one storage.
struct Session {
    client: ApiClient,
    cart: Arc<CartStore>,
}

impl Session {
    async fn open(client_config: &ClientConfig, storage: Arc<dyn KeyValueStore>) -> Result<Self> {
        let credentials = CredentialStore::new(storage);
        let client =
            ApiClient::new(client_config, credentials.clone()).context("failed to build API client")?;
        let cart = Arc::new(CartStore::open_for_session(&credentials).await);
        client.register_logout_hook(cart.clone());
        Ok(Self { client, cart })
    }

    async fn run(&self, command: Command) -> Result<String> {
        match command {
            Command::Get { path } => render(self.client.get(&path).await),
            Command::Delete { path } => render(self.client.delete(&path).await),
            Command::Post(args) => render(self.client.post(&args.path, &args.body).await),
            Command::Put(args) => render(self.client.put(&args.path, &args.body).await),
            Command::Patch(args) => render(self.client.patch(&args.path, &args.body).await),
            Command::Login { access, refresh } => {
                self.client
                    .sign_in(&CredentialPair::new(access, refresh))
                    .await
                    .context("failed to store credentials")?;
                match identity_from_credentials(self.client.credentials()).await {
                    Identity::User(id) => {
                        self.cart
                            .login(&id)
                            .await
                            .context("failed to merge guest cart")?;
                        Ok(format!("signed in as {id}"))
                    }
                    Identity::Guest => Ok("signed in".to_string()),
                }
            }
            Command::Logout => {
                self.client.logout().await.context("logout failed")?;
                Ok("signed out".to_string())
            }
            Command::Whoami => Ok(match identity_from_credentials(self.client.credentials()).await {
                Identity::User(id) => id,
                Identity::Guest => "guest".to_string(),
            }),
            Command::Cart { action } => self.run_cart(action.unwrap_or(CartCommand::Show)).await,
        }
    }

    async fn run_cart(&self, command: CartCommand) -> Result<String> {
        match command {
            CartCommand::Show => {}
            CartCommand::Add {
                product_id,
                name,
                price,
                qty,
            } => self
                .cart
                .add_item(CartItem::new(product_id, name, price, qty))
                .await
                .context("failed to add item")?,
            CartCommand::Set { product_id, qty } => self
                .cart
                .set_qty(&product_id, qty)
                .await
                .context("failed to update quantity")?,
            CartCommand::Remove { product_id } => self
                .cart
                .remove_item(&product_id)
                .await
                .context("failed to remove item")?,
            CartCommand::Clear => self.cart.clear().await.context("failed to clear cart")?,
        }

        let summary = serde_json::json!({
            "items": self.cart.items().await,
            "subtotal": self.cart.subtotal().await,
        });
        Ok(serde_json::to_string_pretty(&summary)?)
    }
}

/// Response body for stdout, or an error carrying the backend's rejection.
fn render(result: storefront_api::Result<ApiResponse>) -> Result<String> {
    match result {
        Ok(response) => Ok(pretty_body(&response)),
        Err(storefront_api::Error::Status(response)) => {
            anyhow::bail!(
                "backend returned {}: {}",
                response.status(),
                pretty_body(&response)
            )
        }
        Err(e) => Err(e).context("request failed"),
    }
}

fn pretty_body(response: &ApiResponse) -> String {
    response
        .json::<serde_json::Value>()
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| response.text())
}
