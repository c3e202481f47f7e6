//! Database migration commands.
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back
//!   to `DATABASE_URL`)
//!
//! Migrations live in `crates/storefront/migrations/`.

use super::{CommandError, connect};

/// Run storefront database migrations.
///
/// # Errors
///
/// Returns `CommandError` if the database is unreachable or a migration fails.
pub async fn storefront() -> Result<(), CommandError> {
    let pool = connect().await?;

    tracing::info!("Running storefront migrations...");
    sqlx::migrate!("../storefront/migrations").run(&pool).await?;

    tracing::info!("Storefront migrations complete!");
    Ok(())
}
