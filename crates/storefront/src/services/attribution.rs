//! Seller attribution repair.
//!
//! Order creation and product-to-seller attribution are not written
//! together, so orders can end up with no `seller_id`. This job finds them
//! and backfills the seller from the order's line items.
//!
//! Each order is handled independently: a failure is logged and counted, and
//! the job moves on. Only orders still missing a seller are ever touched, so
//! re-running the job is safe.

use std::collections::BTreeSet;
use std::fmt;

use tracing::{debug, error, info, instrument, warn};

use localmart_core::{OrderId, SellerId};

use crate::db::{OrderStore, RepositoryError};
use crate::models::OrderItem;

/// What the line items of an order say about its seller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SellerInference {
    /// Every resolvable item belongs to one seller.
    SingleSeller(SellerId),
    /// Items belong to several sellers.
    MultiSeller {
        sellers: BTreeSet<SellerId>,
        /// Seller of the first resolvable item.
        first_item_seller: SellerId,
    },
    /// No seller could be determined.
    Unresolvable(Unresolvable),
}

/// Why no seller could be inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolvable {
    /// The order has no line items.
    NoItems,
    /// None of the items' products exist with a seller.
    NoSellerFound,
}

impl fmt::Display for Unresolvable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoItems => f.write_str("order has no items"),
            Self::NoSellerFound => f.write_str("no item resolves to a seller"),
        }
    }
}

/// How to treat orders whose items span several sellers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MultiSellerPolicy {
    /// Leave the order unattributed and report it.
    #[default]
    Skip,
    /// Attribute the order to the seller of its first item.
    FirstItem,
}

/// Options for a repair run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RepairOptions {
    /// Multi-seller handling.
    pub multi_seller: MultiSellerPolicy,
    /// Infer and report, but write nothing.
    pub dry_run: bool,
}

/// Counts from a repair run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Orders missing a seller when the run started.
    pub scanned: usize,
    /// Orders attributed (or that would be, in a dry run).
    pub repaired: usize,
    /// Orders skipped because they have no items.
    pub no_items: usize,
    /// Orders skipped because no item resolves to a seller.
    pub unresolvable: usize,
    /// Orders skipped because their items span several sellers.
    pub multi_seller: usize,
    /// Orders attributed by someone else while the run was in progress.
    pub already_attributed: usize,
    /// Orders that hit a store error.
    pub failed: usize,
}

/// Outcome for a single order.
enum Repair {
    Attributed(SellerId),
    WouldAttribute(SellerId),
    AlreadyAttributed,
    Skipped(Skip),
}

enum Skip {
    NoItems,
    Unresolvable,
    MultiSeller,
}

/// Backfills missing seller attribution on orders.
pub struct SellerAttributionRepair<'a> {
    store: &'a dyn OrderStore,
    options: RepairOptions,
}

impl<'a> SellerAttributionRepair<'a> {
    /// Create a new repair job.
    #[must_use]
    pub const fn new(store: &'a dyn OrderStore, options: RepairOptions) -> Self {
        Self { store, options }
    }

    /// Repair every order that is missing a seller when the run starts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` only if the initial snapshot of unattributed
    /// orders cannot be read. Per-order failures are counted in the report.
    #[instrument(skip(self), fields(dry_run = self.options.dry_run, policy = ?self.options.multi_seller))]
    pub async fn run(&self) -> Result<RepairReport, RepositoryError> {
        let order_ids = self.store.orders_missing_seller().await?;
        let mut report = RepairReport {
            scanned: order_ids.len(),
            ..RepairReport::default()
        };

        for order_id in order_ids {
            match self.repair_order(order_id).await {
                Ok(Repair::Attributed(seller_id)) => {
                    info!(%order_id, %seller_id, "Order attributed to seller");
                    report.repaired += 1;
                }
                Ok(Repair::WouldAttribute(seller_id)) => {
                    info!(%order_id, %seller_id, "Dry run: order would be attributed");
                    report.repaired += 1;
                }
                Ok(Repair::AlreadyAttributed) => {
                    debug!(%order_id, "Order attributed concurrently; nothing written");
                    report.already_attributed += 1;
                }
                Ok(Repair::Skipped(Skip::NoItems)) => report.no_items += 1,
                Ok(Repair::Skipped(Skip::Unresolvable)) => report.unresolvable += 1,
                Ok(Repair::Skipped(Skip::MultiSeller)) => report.multi_seller += 1,
                Err(e) => {
                    error!(%order_id, error = %e, "Failed to repair order; continuing");
                    report.failed += 1;
                }
            }
        }

        info!(
            scanned = report.scanned,
            repaired = report.repaired,
            no_items = report.no_items,
            unresolvable = report.unresolvable,
            multi_seller = report.multi_seller,
            already_attributed = report.already_attributed,
            failed = report.failed,
            dry_run = self.options.dry_run,
            "Seller attribution repair finished"
        );

        Ok(report)
    }

    async fn repair_order(&self, order_id: OrderId) -> Result<Repair, RepositoryError> {
        let items = self.store.order_items(order_id).await?;

        let seller_id = match self.infer_seller(order_id, &items).await? {
            SellerInference::SingleSeller(seller_id) => seller_id,
            SellerInference::MultiSeller {
                sellers,
                first_item_seller,
            } => match self.options.multi_seller {
                MultiSellerPolicy::Skip => {
                    warn!(
                        %order_id,
                        sellers = ?sellers,
                        "Order spans several sellers; leaving unattributed"
                    );
                    return Ok(Repair::Skipped(Skip::MultiSeller));
                }
                MultiSellerPolicy::FirstItem => {
                    warn!(
                        %order_id,
                        sellers = ?sellers,
                        seller_id = %first_item_seller,
                        "Order spans several sellers; using first item's seller"
                    );
                    first_item_seller
                }
            },
            SellerInference::Unresolvable(reason) => {
                warn!(%order_id, %reason, "Cannot infer seller; leaving unattributed");
                return Ok(Repair::Skipped(match reason {
                    Unresolvable::NoItems => Skip::NoItems,
                    Unresolvable::NoSellerFound => Skip::Unresolvable,
                }));
            }
        };

        if self.options.dry_run {
            return Ok(Repair::WouldAttribute(seller_id));
        }

        if self.store.assign_seller(order_id, seller_id).await? {
            Ok(Repair::Attributed(seller_id))
        } else {
            Ok(Repair::AlreadyAttributed)
        }
    }

    /// Infer the seller of an order from its items.
    ///
    /// Items are considered by `position`, whatever order they are passed in,
    /// so the first item is the one with the lowest position. Items whose
    /// product is missing, or has no seller, are logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if a product lookup fails.
    pub async fn infer_seller(
        &self,
        order_id: OrderId,
        items: &[OrderItem],
    ) -> Result<SellerInference, RepositoryError> {
        if items.is_empty() {
            return Ok(SellerInference::Unresolvable(Unresolvable::NoItems));
        }

        let mut first_item_seller = None;
        let mut sellers = BTreeSet::new();

        let mut ordered: Vec<&OrderItem> = items.iter().collect();
        ordered.sort_by_key(|item| item.position);

        for item in ordered {
            let Some(product) = self.store.get_product(item.product_id).await? else {
                warn!(%order_id, product_id = %item.product_id, "Item references a missing product");
                continue;
            };
            let Some(seller_id) = product.seller_id else {
                warn!(%order_id, product_id = %product.id, "Product has no seller");
                continue;
            };

            first_item_seller.get_or_insert(seller_id);
            sellers.insert(seller_id);
        }

        Ok(match first_item_seller {
            None => SellerInference::Unresolvable(Unresolvable::NoSellerFound),
            Some(seller_id) if sellers.len() == 1 => SellerInference::SingleSeller(seller_id),
            Some(first_item_seller) => SellerInference::MultiSeller {
                sellers,
                first_item_seller,
            },
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use localmart_core::ProductId;

    use super::*;
    use crate::testing::MemoryStore;

    fn repair(store: &MemoryStore) -> SellerAttributionRepair<'_> {
        SellerAttributionRepair::new(store, RepairOptions::default())
    }

    #[tokio::test]
    async fn test_single_seller_order_repaired() {
        let store = MemoryStore::new();
        let seller = SellerId::random();
        let product = store.add_product(Some(seller));
        let order = store.add_order(None);
        store.add_item(order, product);

        let report = repair(&store).run().await.unwrap();

        assert_eq!(report.scanned, 1);
        assert_eq!(report.repaired, 1);
        assert_eq!(store.order(order).unwrap().seller_id, Some(seller));
    }

    #[tokio::test]
    async fn test_second_run_processes_nothing() {
        let store = MemoryStore::new();
        let seller = SellerId::random();
        let product = store.add_product(Some(seller));
        let order = store.add_order(None);
        store.add_item(order, product);

        repair(&store).run().await.unwrap();
        let writes_after_first = store.writes().assign_seller;
        let report = repair(&store).run().await.unwrap();

        assert_eq!(report, RepairReport::default());
        assert_eq!(store.writes().assign_seller, writes_after_first);
        assert_eq!(store.order(order).unwrap().seller_id, Some(seller));
    }

    #[tokio::test]
    async fn test_attributed_orders_are_not_scanned() {
        let store = MemoryStore::new();
        store.add_order(Some(SellerId::random()));

        let report = repair(&store).run().await.unwrap();

        assert_eq!(report.scanned, 0);
        assert_eq!(store.writes().assign_seller, 0);
    }

    #[tokio::test]
    async fn test_order_without_items_skipped() {
        let store = MemoryStore::new();
        let order = store.add_order(None);

        let report = repair(&store).run().await.unwrap();

        assert_eq!(report.no_items, 1);
        assert_eq!(report.repaired, 0);
        assert!(store.order(order).unwrap().seller_id.is_none());
    }

    #[tokio::test]
    async fn test_missing_or_sellerless_products_unresolvable() {
        let store = MemoryStore::new();
        let sellerless = store.add_product(None);
        let order = store.add_order(None);
        store.add_item(order, sellerless);
        store.add_item(order, ProductId::random());

        let report = repair(&store).run().await.unwrap();

        assert_eq!(report.unresolvable, 1);
        assert!(store.order(order).unwrap().seller_id.is_none());
    }

    #[tokio::test]
    async fn test_unresolvable_items_ignored_when_others_resolve() {
        let store = MemoryStore::new();
        let seller = SellerId::random();
        let good = store.add_product(Some(seller));
        let order = store.add_order(None);
        store.add_item(order, ProductId::random());
        store.add_item(order, good);

        let report = repair(&store).run().await.unwrap();

        assert_eq!(report.repaired, 1);
        assert_eq!(store.order(order).unwrap().seller_id, Some(seller));
    }

    #[tokio::test]
    async fn test_multi_seller_skipped_by_default() {
        let store = MemoryStore::new();
        let first = store.add_product(Some(SellerId::random()));
        let second = store.add_product(Some(SellerId::random()));
        let order = store.add_order(None);
        store.add_item(order, first);
        store.add_item(order, second);

        let report = repair(&store).run().await.unwrap();

        assert_eq!(report.multi_seller, 1);
        assert!(store.order(order).unwrap().seller_id.is_none());
    }

    #[tokio::test]
    async fn test_multi_seller_first_item_policy() {
        let store = MemoryStore::new();
        let first_seller = SellerId::random();
        let first = store.add_product(Some(first_seller));
        let second = store.add_product(Some(SellerId::random()));
        let order = store.add_order(None);
        store.add_item(order, first);
        store.add_item(order, second);

        let options = RepairOptions {
            multi_seller: MultiSellerPolicy::FirstItem,
            dry_run: false,
        };
        let report = SellerAttributionRepair::new(&store, options)
            .run()
            .await
            .unwrap();

        assert_eq!(report.repaired, 1);
        assert_eq!(store.order(order).unwrap().seller_id, Some(first_seller));
    }

    #[tokio::test]
    async fn test_failure_on_one_order_does_not_stop_batch() {
        let store = MemoryStore::new();
        let seller = SellerId::random();
        let product = store.add_product(Some(seller));
        let broken = store.add_order(None);
        let healthy = store.add_order(None);
        store.add_item(broken, product);
        store.add_item(healthy, product);
        store.fail_assign_seller_for(broken);

        let report = repair(&store).run().await.unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.repaired, 1);
        assert!(store.order(broken).unwrap().seller_id.is_none());
        assert_eq!(store.order(healthy).unwrap().seller_id, Some(seller));
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let store = MemoryStore::new();
        let product = store.add_product(Some(SellerId::random()));
        let order = store.add_order(None);
        store.add_item(order, product);

        let options = RepairOptions {
            dry_run: true,
            ..RepairOptions::default()
        };
        let report = SellerAttributionRepair::new(&store, options)
            .run()
            .await
            .unwrap();

        assert_eq!(report.repaired, 1);
        assert_eq!(store.writes().assign_seller, 0);
        assert!(store.order(order).unwrap().seller_id.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_failure_is_an_error() {
        let store = MemoryStore::new();
        store.set_unavailable();

        assert!(repair(&store).run().await.is_err());
    }

    #[tokio::test]
    async fn test_infer_seller_variants() {
        let store = MemoryStore::new();
        let seller_a = SellerId::random();
        let seller_b = SellerId::random();
        let a = store.add_product(Some(seller_a));
        let b = store.add_product(Some(seller_b));
        let order = store.add_order(None);
        store.add_item(order, b);
        store.add_item(order, a);
        let job = repair(&store);

        let items = store.items(order);
        match job.infer_seller(order, &items).await.unwrap() {
            SellerInference::MultiSeller {
                sellers,
                first_item_seller,
            } => {
                assert_eq!(sellers, BTreeSet::from([seller_a, seller_b]));
                assert_eq!(first_item_seller, seller_b);
            }
            other => panic!("unexpected inference: {other:?}"),
        }

        assert_eq!(
            job.infer_seller(order, &[]).await.unwrap(),
            SellerInference::Unresolvable(Unresolvable::NoItems)
        );
    }

    #[tokio::test]
    async fn test_first_item_is_lowest_position() {
        let store = MemoryStore::new();
        let early_seller = SellerId::random();
        let late_seller = SellerId::random();
        let early = store.add_product(Some(early_seller));
        let late = store.add_product(Some(late_seller));
        let order = store.add_order(None);
        store.add_item(order, early);
        store.add_item(order, late);
        let job = repair(&store);

        let mut items = store.items(order);
        items.reverse();
        assert!(items.first().unwrap().position > items.last().unwrap().position);

        match job.infer_seller(order, &items).await.unwrap() {
            SellerInference::MultiSeller {
                first_item_seller, ..
            } => assert_eq!(first_item_seller, early_seller),
            other => panic!("unexpected inference: {other:?}"),
        }
    }
}
