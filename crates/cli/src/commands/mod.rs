//! CLI subcommands.

pub mod migrate;
pub mod repair;

use localmart_storefront::config::{self, ConfigError};
use localmart_storefront::db::{self, RepositoryError};
use sqlx::PgPool;
use thiserror::Error;

/// Errors that stop a command before it can do its work.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Database URL is not configured.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Store error before any order was processed.
    #[error("Store error: {0}")]
    Store(#[from] RepositoryError),
}

/// Connect to the storefront database.
///
/// Reads `STOREFRONT_DATABASE_URL`, falling back to `DATABASE_URL`.
async fn connect() -> Result<PgPool, CommandError> {
    let database_url = config::get_database_url("STOREFRONT_DATABASE_URL")?;

    tracing::info!("Connecting to storefront database...");
    Ok(db::create_pool(&database_url).await?)
}
