//! Saving reusable payment methods against a gateway customer.
//!
//! Each multi-step flow here compensates its own partial failures:
//!
//! - A new customer whose mapping cannot be recorded is deleted again.
//! - A new customer that loses the race to be recorded is deleted, and the
//!   recorded one is used instead.
//! - A payment method attached by this call that cannot be made default is
//!   detached again. One the customer already held is left attached.
//!
//! When a compensation itself fails, the caller gets an inconsistency error
//! naming the dangling gateway object.

use tracing::{debug, error, info, instrument, warn};

use localmart_core::{CustomerId, PaymentMethodId, UserId};

use super::PaymentError;
use crate::db::ProfileStore;
use crate::stripe::{Metadata, PaymentGateway, USER_ID_METADATA_KEY};

/// A payment method saved as a customer's default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedPaymentMethod {
    /// Customer holding the payment method.
    pub customer_id: CustomerId,
    /// The saved payment method.
    pub payment_method_id: PaymentMethodId,
    /// Whether the customer was created by this call.
    pub customer_created: bool,
}

/// Stores payment methods for reuse by a buyer.
pub struct PaymentMethodVault<'a> {
    gateway: &'a dyn PaymentGateway,
    profiles: &'a dyn ProfileStore,
}

impl<'a> PaymentMethodVault<'a> {
    /// Create a new vault.
    #[must_use]
    pub const fn new(gateway: &'a dyn PaymentGateway, profiles: &'a dyn ProfileStore) -> Self {
        Self { gateway, profiles }
    }

    /// Attach `payment_method_id` to the user's customer and make it default.
    ///
    /// The user's customer is created on first use and reused afterwards. A
    /// payment method the customer already holds is not attached again.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::CustomerLookupFailed` if the stored customer
    /// cannot be read.
    /// Returns `PaymentError::Gateway` or `PaymentError::Store` for a failed
    /// step whose effects were rolled back.
    /// Returns `PaymentError::CustomerLeftDangling` or
    /// `PaymentError::PaymentMethodLeftAttached` if a rollback failed.
    #[instrument(skip(self), fields(payment_method_id = %payment_method_id, user_id = %user_id))]
    pub async fn save(
        &self,
        payment_method_id: &PaymentMethodId,
        user_id: UserId,
    ) -> Result<SavedPaymentMethod, PaymentError> {
        let (customer_id, customer_created) = self.resolve_customer(user_id).await?;

        let held = self
            .gateway
            .retrieve_payment_method(payment_method_id)
            .await?
            .customer
            .is_some_and(|owner| owner == customer_id);

        if held {
            debug!(%customer_id, "Payment method already attached to customer");
        } else {
            self.gateway
                .attach_payment_method(payment_method_id, &customer_id)
                .await?;
        }

        if let Err(cause) = self
            .gateway
            .set_default_payment_method(&customer_id, payment_method_id)
            .await
        {
            if held {
                warn!(%customer_id, error = %cause, "Setting default payment method failed; keeping it attached");
                return Err(PaymentError::Gateway(cause));
            }
            warn!(%customer_id, error = %cause, "Setting default payment method failed; detaching");
            return Err(match self.gateway.detach_payment_method(payment_method_id).await {
                Ok(()) => PaymentError::Gateway(cause),
                Err(cleanup) => {
                    error!(%customer_id, error = %cleanup, "Detaching payment method failed");
                    PaymentError::PaymentMethodLeftAttached {
                        payment_method_id: payment_method_id.clone(),
                        customer_id,
                        cause,
                        cleanup,
                    }
                }
            });
        }

        info!(%customer_id, customer_created, "Payment method saved as default");

        Ok(SavedPaymentMethod {
            customer_id,
            payment_method_id: payment_method_id.clone(),
            customer_created,
        })
    }

    /// The user's recorded customer, creating and recording one if needed.
    ///
    /// Returns the customer and whether this call created it.
    async fn resolve_customer(&self, user_id: UserId) -> Result<(CustomerId, bool), PaymentError> {
        if let Some(existing) = self
            .profiles
            .stripe_customer_id(user_id)
            .await
            .map_err(PaymentError::CustomerLookupFailed)?
        {
            return Ok((existing, false));
        }

        let metadata = Metadata::from([(USER_ID_METADATA_KEY.to_string(), user_id.to_string())]);
        let created = self.gateway.create_customer(&metadata).await?.id;

        let recorded = match self
            .profiles
            .save_stripe_customer_id(user_id, &created)
            .await
        {
            Ok(profile) => profile.stripe_customer_id,
            Err(e) => {
                warn!(customer_id = %created, error = %e, "Recording customer failed; deleting it");
                self.discard_customer(&created, e.to_string()).await?;
                return Err(PaymentError::Store(e));
            }
        };

        match recorded {
            Some(winner) if winner != created => {
                info!(
                    customer_id = %created,
                    recorded_customer_id = %winner,
                    "Another request recorded a customer first; deleting ours"
                );
                self.discard_customer(
                    &created,
                    format!("customer {winner} was recorded first"),
                )
                .await?;
                Ok((winner, false))
            }
            _ => {
                info!(customer_id = %created, "Customer created");
                Ok((created, true))
            }
        }
    }

    /// Delete a customer this call created but could not keep.
    async fn discard_customer(
        &self,
        customer_id: &CustomerId,
        cause: String,
    ) -> Result<(), PaymentError> {
        self.gateway
            .delete_customer(customer_id)
            .await
            .map_err(|cleanup| {
                error!(%customer_id, error = %cleanup, "Deleting unrecorded customer failed");
                PaymentError::CustomerLeftDangling {
                    customer_id: customer_id.clone(),
                    cause,
                    cleanup,
                }
            })
    }
}
