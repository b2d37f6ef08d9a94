//! Command-line arguments

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "storefront")]
#[command(version, about = "Storefront API client with transparent token refresh")]
pub struct Args {
    /// Path to the TOML config (falls back to CONFIG_PATH, then storefront.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Print Prometheus metrics after the command
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Path plus JSON body for the write verbs.
#[derive(Debug, PartialEq, clap::Args)]
pub struct BodyArgs {
    /// Backend path, e.g. /api/orders/
    pub path: String,

    /// Request body as a JSON document
    #[arg(value_parser = parse_json)]
    pub body: serde_json::Value,
}

#[derive(Debug, PartialEq, Subcommand)]
pub enum Command {
    /// GET a backend path
    Get { path: String },
    /// DELETE a backend path
    Delete { path: String },
    /// POST a JSON body
    Post(BodyArgs),
    /// PUT a JSON body
    Put(BodyArgs),
    /// PATCH a JSON body
    Patch(BodyArgs),
    /// Store a token pair obtained from the login exchange
    Login { access: String, refresh: String },
    /// Erase the session and switch to the guest cart
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Inspect or change the cart (defaults to `show`)
    Cart {
        #[command(subcommand)]
        action: Option<CartCommand>,
    },
}

#[derive(Debug, PartialEq, Subcommand)]
pub enum CartCommand {
    /// List cart lines and subtotal
    Show,
    /// Add a line
    Add {
        product_id: String,
        name: String,
        /// Unit price in minor currency units
        price: u64,
        qty: u32,
    },
    /// Change a quantity (0 removes the line)
    Set { product_id: String, qty: u32 },
    /// Remove a line
    Remove { product_id: String },
    /// Empty the cart
    Clear,
}

impl Command {
    /// Label used for the `cli_commands_total` counter.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "get",
            Command::Delete { .. } => "delete",
            Command::Post(_) => "post",
            Command::Put(_) => "put",
            Command::Patch(_) => "patch",
            Command::Login { .. } => "login",
            Command::Logout => "logout",
            Command::Whoami => "whoami",
            Command::Cart { .. } => "cart",
        }
    }
}

fn parse_json(raw: &str) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::from_str(raw)
}
