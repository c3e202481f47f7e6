//! Data repair commands.
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back
//!   to `DATABASE_URL`)

use localmart_storefront::db::{OrderStore, PgStore};
use localmart_storefront::services::attribution::{
    RepairOptions, RepairReport, SellerAttributionRepair,
};

use super::{CommandError, connect};

/// Backfill the seller on orders that are missing one.
///
/// Per-order failures are logged and counted in the report; they do not make
/// the command fail.
///
/// # Errors
///
/// Returns `CommandError` if the database is unreachable or the list of
/// unattributed orders cannot be read.
pub async fn seller_attribution(options: RepairOptions) -> Result<RepairReport, CommandError> {
    let store = PgStore::new(connect().await?);
    repair_seller_attribution(&store, options).await
}

/// Run the seller attribution repair against `store`.
///
/// # Errors
///
/// Returns `CommandError::Store` if the list of unattributed orders cannot be
/// read.
pub async fn repair_seller_attribution(
    store: &dyn OrderStore,
    options: RepairOptions,
) -> Result<RepairReport, CommandError> {
    let report = SellerAttributionRepair::new(store, options).run().await?;

    if report.failed > 0 {
        tracing::warn!(
            failed = report.failed,
            "Some orders could not be repaired; re-run to retry them"
        );
    }

    Ok(report)
}
