//! Gateway request and response types.
//!
//! Response types only declare the fields the storefront reads; everything
//! else the gateway returns is ignored during deserialization.

use std::collections::BTreeMap;

use serde::Deserialize;

use localmart_core::{
    AccountId, CurrencyCode, CustomerId, PaymentIntentId, PaymentIntentStatus, PaymentMethodId,
};

/// Free-form key/value metadata attached to gateway records.
pub type Metadata = BTreeMap<String, String>;

/// Metadata key linking a gateway customer back to a storefront user.
pub const USER_ID_METADATA_KEY: &str = "user_id";

/// Metadata key linking a connected account to a seller.
pub const SELLER_ID_METADATA_KEY: &str = "seller_id";

/// Parameters for creating a payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePaymentIntent {
    /// Amount in the smallest currency unit.
    pub amount: i64,
    /// Charge currency.
    pub currency: CurrencyCode,
    /// Caller-supplied metadata (order references, cart IDs, ...).
    pub metadata: Metadata,
    /// Marketplace split, when the seller has a payout account.
    pub transfer: Option<DestinationTransfer>,
}

/// Routing of a charge to a seller's connected account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationTransfer {
    /// Connected account receiving the funds.
    pub destination: AccountId,
    /// Portion retained by the platform, in the smallest currency unit.
    pub application_fee_amount: i64,
}

impl CreatePaymentIntent {
    /// Encode as gateway form parameters.
    #[must_use]
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("amount".to_string(), self.amount.to_string()),
            (
                "currency".to_string(),
                self.currency.gateway_code().to_string(),
            ),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];

        form.extend(metadata_form(&self.metadata));

        if let Some(transfer) = &self.transfer {
            form.push((
                "transfer_data[destination]".to_string(),
                transfer.destination.to_string(),
            ));
            form.push((
                "application_fee_amount".to_string(),
                transfer.application_fee_amount.to_string(),
            ));
        }

        form
    }
}

/// Encode metadata as `metadata[key]=value` form pairs.
#[must_use]
pub fn metadata_form(metadata: &Metadata) -> Vec<(String, String)> {
    metadata
        .iter()
        .map(|(key, value)| (format!("metadata[{key}]"), value.clone()))
        .collect()
}

/// A payment intent as returned by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    /// Intent ID (`pi_...`).
    pub id: PaymentIntentId,
    /// Lifecycle status.
    pub status: PaymentIntentStatus,
    /// Amount in the smallest currency unit.
    pub amount: i64,
    /// Lowercase currency code.
    pub currency: String,
    /// Secret the browser uses to complete payment. Never log this.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Platform fee, for split payments.
    #[serde(default)]
    pub application_fee_amount: Option<i64>,
    /// Split payment routing.
    #[serde(default)]
    pub transfer_data: Option<TransferData>,
    /// Metadata supplied at creation.
    #[serde(default)]
    pub metadata: Metadata,
}

/// Split payment routing on a returned intent.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferData {
    /// Connected account receiving the funds.
    pub destination: AccountId,
}

/// A customer as returned by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    /// Customer ID (`cus_...`).
    pub id: CustomerId,
    /// Metadata supplied at creation.
    #[serde(default)]
    pub metadata: Metadata,
    /// Invoice defaults.
    #[serde(default)]
    pub invoice_settings: InvoiceSettings,
}

/// Customer invoice defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceSettings {
    /// Payment method charged by default.
    #[serde(default)]
    pub default_payment_method: Option<PaymentMethodId>,
}

/// A payment method as returned by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentMethod {
    /// Payment method ID (`pm_...`).
    pub id: PaymentMethodId,
    /// Customer the method is attached to, if any.
    #[serde(default)]
    pub customer: Option<CustomerId>,
}

/// A connected (seller payout) account.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectedAccount {
    /// Account ID (`acct_...`).
    pub id: AccountId,
    /// Metadata; `seller_id` links the account to a seller.
    #[serde(default)]
    pub metadata: Metadata,
}

/// A page of a gateway list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct List<T> {
    /// Items on this page.
    pub data: Vec<T>,
    /// Whether more pages follow.
    #[serde(default)]
    pub has_more: bool,
}

/// Error envelope returned by the gateway for non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    /// The error details.
    pub error: ErrorBody,
}

/// Gateway error details.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    /// Error type.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Error code.
    #[serde(default)]
    pub code: Option<String>,
    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,
}
