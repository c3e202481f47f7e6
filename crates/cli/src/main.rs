//! Localmart CLI - Database migrations and data repair.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! lm-cli migrate
//!
//! # Backfill missing seller attribution on orders
//! lm-cli repair seller-attribution
//!
//! # Report what would be repaired without writing
//! lm-cli repair seller-attribution --dry-run
//!
//! # Attribute multi-seller orders to their first item's seller
//! lm-cli repair seller-attribution --multi-seller first-item
//! ```
//!
//! # Exit status
//!
//! `0` when the command ran, even if individual orders could not be repaired;
//! `1` when it could not start (missing database URL, connection failure,
//! unreadable order snapshot).

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use localmart_storefront::services::attribution::{MultiSellerPolicy, RepairOptions};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "lm-cli")]
#[command(author, version, about = "Localmart CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Repair inconsistent data
    Repair {
        #[command(subcommand)]
        target: RepairTarget,
    },
}

#[derive(Subcommand)]
enum RepairTarget {
    /// Backfill the seller on orders that are missing one
    SellerAttribution {
        /// Infer and report, but write nothing
        #[arg(long)]
        dry_run: bool,

        /// How to treat orders whose items span several sellers
        #[arg(long, value_enum, default_value_t = MultiSellerArg::Skip)]
        multi_seller: MultiSellerArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MultiSellerArg {
    /// Leave the order unattributed and report it
    Skip,
    /// Use the seller of the order's first item
    FirstItem,
}

impl From<MultiSellerArg> for MultiSellerPolicy {
    fn from(arg: MultiSellerArg) -> Self {
        match arg {
            MultiSellerArg::Skip => Self::Skip,
            MultiSellerArg::FirstItem => Self::FirstItem,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let result = run(cli).await;
    if let Err(e) = &result {
        tracing::error!("Command failed: {e}");
    }
    ExitCode::from(exit_code(&result))
}

/// Process exit status for a command's result.
const fn exit_code(result: &Result<(), commands::CommandError>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::Repair { target } => match target {
            RepairTarget::SellerAttribution {
                dry_run,
                multi_seller,
            } => {
                let options = RepairOptions {
                    multi_seller: multi_seller.into(),
                    dry_run,
                };
                commands::repair::seller_attribution(options).await?;
            }
        },
    }
    Ok(())
}
