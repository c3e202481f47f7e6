//! Payment intent creation, including marketplace splits.

use rust_decimal::Decimal;
use tracing::{info, instrument};

use localmart_core::{AccountId, Money, PaymentIntentId, SellerId, application_fee};

use super::PaymentError;
use crate::config::PaymentSettings;
use crate::stripe::{
    CreatePaymentIntent, DestinationTransfer, GatewayError, Metadata, PaymentGateway,
    SELLER_ID_METADATA_KEY,
};

/// A freshly created payment intent, ready for the browser to complete.
#[derive(Debug, Clone)]
pub struct CreatedIntent {
    /// Gateway intent ID.
    pub payment_intent_id: PaymentIntentId,
    /// Secret the browser uses to collect payment.
    pub client_secret: String,
    /// Charged amount in minor units.
    pub amount: i64,
    /// Seller payout account, for split payments.
    pub destination: Option<AccountId>,
    /// Platform fee in minor units, for split payments.
    pub application_fee: Option<i64>,
}

/// Creates gateway payment intents.
///
/// Nothing is persisted locally; the order is untouched until confirmation.
pub struct PaymentIntentCreator<'a> {
    gateway: &'a dyn PaymentGateway,
    settings: PaymentSettings,
}

impl<'a> PaymentIntentCreator<'a> {
    /// Create a new intent creator.
    #[must_use]
    pub const fn new(gateway: &'a dyn PaymentGateway, settings: PaymentSettings) -> Self {
        Self { gateway, settings }
    }

    /// Create a payment intent for `amount` (in the currency's standard unit).
    ///
    /// When `seller_id` resolves to a connected account, the charge is routed
    /// to it and the platform keeps its fee. A seller without an account gets
    /// a standard charge; that is not an error.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::InvalidAmount` if the amount is not positive,
    /// before any gateway call.
    /// Returns `PaymentError::PaymentIntentCreationFailed` if the account
    /// lookup or the intent creation fails.
    #[instrument(skip(self, metadata), fields(amount = %amount, seller_id = ?seller_id))]
    pub async fn create(
        &self,
        amount: Decimal,
        seller_id: Option<SellerId>,
        mut metadata: Metadata,
    ) -> Result<CreatedIntent, PaymentError> {
        let minor = Money::new(amount, self.settings.currency)
            .to_minor_units()
            .map_err(|e| PaymentError::InvalidAmount(e.to_string()))?;

        let transfer = match seller_id {
            Some(seller_id) => {
                metadata.insert(SELLER_ID_METADATA_KEY.to_string(), seller_id.to_string());
                self.destination_for(seller_id, minor).await?
            }
            None => None,
        };

        let params = CreatePaymentIntent {
            amount: minor,
            currency: self.settings.currency,
            metadata,
            transfer,
        };

        let intent = self
            .gateway
            .create_payment_intent(&params)
            .await
            .map_err(PaymentError::PaymentIntentCreationFailed)?;

        let client_secret = intent.client_secret.ok_or_else(|| {
            PaymentError::PaymentIntentCreationFailed(GatewayError::Parse(format!(
                "payment intent {} has no client secret",
                intent.id
            )))
        })?;

        let (destination, application_fee) = params.transfer.map_or((None, None), |t| {
            (Some(t.destination), Some(t.application_fee_amount))
        });

        info!(
            payment_intent_id = %intent.id,
            amount = minor,
            split = destination.is_some(),
            "Payment intent created"
        );

        Ok(CreatedIntent {
            payment_intent_id: intent.id,
            client_secret,
            amount: minor,
            destination,
            application_fee,
        })
    }

    /// Resolve the split routing for a seller, if they have a payout account.
    async fn destination_for(
        &self,
        seller_id: SellerId,
        minor: i64,
    ) -> Result<Option<DestinationTransfer>, PaymentError> {
        let account = self
            .gateway
            .find_seller_account(seller_id)
            .await
            .map_err(PaymentError::PaymentIntentCreationFailed)?;

        let Some(account) = account else {
            info!(%seller_id, "Seller has no payout account; creating a standard charge");
            return Ok(None);
        };

        Ok(Some(DestinationTransfer {
            destination: account.id,
            application_fee_amount: application_fee(minor, self.settings.platform_fee_bps),
        }))
    }
}
