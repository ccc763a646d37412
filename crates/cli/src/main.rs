//! Cartwheel CLI - drive the storefront engine from a terminal.
//!
//! Client state (cart ID, session token, cached profile, guest wishlist,
//! recent searches) is kept in a JSON file between invocations, so a
//! sequence of commands behaves like one browser session.
//!
//! # Usage
//!
//! ```bash
//! cw cart add variant_01H... -q 2
//! cw promo apply WELCOME10
//! cw address shipping --file home.json
//! cw checkout
//! ```
//!
//! # Commands
//!
//! - `cart` - Show and edit the cart
//! - `promo` - Apply or remove promotion codes
//! - `address` - Set shipping/billing addresses
//! - `email` - Set the cart's contact email
//! - `checkout` - Complete the cart
//! - `login` / `logout` / `whoami` - Session
//! - `orders` / `order` - Order history
//! - `wishlist` / `search` - Saved products and recent searches

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;
use std::sync::Arc;

use cartwheel_storefront::cart::AddressRole;
use cartwheel_storefront::storage::FileStorage;
use cartwheel_storefront::{Storefront, SyncConfig};
use clap::{Args, Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::CommandError;
use commands::cart::AddressSource;

#[derive(Parser)]
#[command(name = "cw")]
#[command(author, version, about = "Cartwheel storefront CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show and edit the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Apply or remove promotion codes
    Promo {
        #[command(subcommand)]
        action: PromoAction,
    },
    /// Set the cart's shipping or billing address
    Address {
        #[command(subcommand)]
        target: AddressTarget,
    },
    /// Set the cart's contact email
    Email {
        /// Email address
        email: String,
    },
    /// Place the order
    Checkout,
    /// Sign in
    Login {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account password (falls back to `CW_PASSWORD`)
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Sign out and forget the cart
    Logout,
    /// Show the signed-in customer
    Whoami,
    /// List past orders
    Orders {
        #[arg(long, default_value_t = 10)]
        limit: u32,

        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Show one order
    Order {
        /// Order ID
        id: String,
    },
    /// Manage saved products
    Wishlist {
        #[command(subcommand)]
        action: Option<WishlistAction>,
    },
    /// Manage recent search terms
    Search {
        #[command(subcommand)]
        action: Option<SearchAction>,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the cart (creates one if needed)
    Show,
    /// Add a variant
    Add {
        /// Variant ID
        variant_id: String,

        /// Quantity to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Change a line's quantity (0 removes it)
    Update {
        /// Line item ID
        line_id: String,
        /// New quantity
        quantity: u32,
    },
    /// Remove a line
    Remove {
        /// Line item ID
        line_id: String,
    },
    /// Forget the cart on this device
    Clear,
}

#[derive(Subcommand)]
enum PromoAction {
    /// Apply a code
    Apply { code: String },
    /// Remove a code
    Remove { code: String },
}

#[derive(Subcommand)]
enum AddressTarget {
    /// Set the shipping address
    Shipping(AddressArgs),
    /// Set the billing address
    Billing(AddressArgs),
}

#[derive(Args)]
struct AddressArgs {
    /// JSON file with the address
    #[arg(long, conflicts_with = "saved")]
    file: Option<PathBuf>,

    /// ID of an address saved on the signed-in account
    #[arg(long)]
    saved: Option<String>,

    /// Don't announce success
    #[arg(long)]
    silent: bool,
}

#[derive(Subcommand)]
enum WishlistAction {
    /// Save a product
    Add { product_id: String },
    /// Unsave a product
    Remove { product_id: String },
}

#[derive(Subcommand)]
enum SearchAction {
    /// Remember a search term
    Record { term: String },
    /// Forget all terms
    Clear,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &SyncConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration from environment (needed for Sentry init)
    let config = SyncConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cartwheel_storefront=info,cw=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if let Err(e) = run(cli, config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: SyncConfig) -> Result<(), CommandError> {
    let storage = Arc::new(FileStorage::open(&config.state_path)?);
    let storefront = Storefront::new(config, storage)?;
    storefront.restore().await;

    match cli.command {
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&storefront).await?,
            CartAction::Add {
                variant_id,
                quantity,
            } => commands::cart::add(&storefront, &variant_id, quantity).await?,
            CartAction::Update { line_id, quantity } => {
                commands::cart::update(&storefront, &line_id, quantity).await?;
            }
            CartAction::Remove { line_id } => commands::cart::remove(&storefront, &line_id).await?,
            CartAction::Clear => commands::cart::clear(&storefront)?,
        },
        Commands::Promo { action } => match action {
            PromoAction::Apply { code } => commands::cart::apply_promo(&storefront, &code).await?,
            PromoAction::Remove { code } => {
                commands::cart::remove_promo(&storefront, &code).await?;
            }
        },
        Commands::Address { target } => {
            let (role, args) = match target {
                AddressTarget::Shipping(args) => (AddressRole::Shipping, args),
                AddressTarget::Billing(args) => (AddressRole::Billing, args),
            };
            let source = AddressSource {
                file: args.file.as_deref(),
                saved: args.saved.as_deref(),
            };
            commands::cart::set_address(&storefront, role, source, args.silent).await?;
        }
        Commands::Email { email } => commands::cart::set_email(&storefront, &email).await?,
        Commands::Checkout => commands::cart::checkout(&storefront).await?,
        Commands::Login { email, password } => {
            commands::account::login(&storefront, &email, password).await?;
        }
        Commands::Logout => commands::account::logout(&storefront)?,
        Commands::Whoami => commands::account::whoami(&storefront)?,
        Commands::Orders { limit, offset } => {
            commands::account::orders(&storefront, limit, offset).await?;
        }
        Commands::Order { id } => commands::account::order(&storefront, &id).await?,
        Commands::Wishlist { action } => match action {
            None => commands::saved::wishlist(&storefront)?,
            Some(WishlistAction::Add { product_id }) => {
                commands::saved::wishlist_add(&storefront, &product_id).await?;
            }
            Some(WishlistAction::Remove { product_id }) => {
                commands::saved::wishlist_remove(&storefront, &product_id).await?;
            }
        },
        Commands::Search { action } => match action {
            None => commands::saved::recent_searches(&storefront)?,
            Some(SearchAction::Record { term }) => {
                commands::saved::record_search(&storefront, &term)?;
            }
            Some(SearchAction::Clear) => commands::saved::clear_searches(&storefront)?,
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_address_sources_conflict() {
        let result = Cli::try_parse_from([
            "cw", "address", "shipping", "--file", "home.json", "--saved", "addr_1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cart_add_defaults_quantity() {
        let cli = Cli::try_parse_from(["cw", "cart", "add", "variant_1"]).unwrap_or_else(|e| {
            panic!("parse failed: {e}")
        });
        assert!(matches!(
            cli.command,
            Commands::Cart {
                action: CartAction::Add { quantity: 1, .. }
            }
        ));
    }
}
