//! Payment gateway client.
//!
//! # Architecture
//!
//! - [`PaymentGateway`] is the seam orchestration code depends on; it exposes
//!   only the handful of gateway operations the storefront needs.
//! - [`StripeClient`] implements it over the gateway's form-encoded REST API
//!   using `reqwest`, with a per-request timeout from configuration.
//! - Seller → connected account lookups are cached via `moka` (5 minute TTL).
//!
//! No call is retried: every failure is returned to the caller once.
//!
//! # Example
//!
//! ```rust,ignore
//! use localmart_storefront::stripe::{PaymentGateway, StripeClient};
//!
//! let gateway = StripeClient::new(&config.stripe)?;
//! let intent = gateway.retrieve_payment_intent(&intent_id).await?;
//! if intent.status.is_succeeded() {
//!     // mark the order paid
//! }
//! ```

mod client;
pub mod types;

pub use client::StripeClient;
pub use types::*;

use async_trait::async_trait;
use thiserror::Error;

use localmart_core::{CustomerId, PaymentIntentId, PaymentMethodId, SellerId};

/// Errors that can occur when interacting with the payment gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed (connection, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway rejected the request.
    #[error("API error: {status} {kind}{} - {message}", format_code(.code.as_deref()))]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error type (e.g., `card_error`, `invalid_request_error`).
        kind: String,
        /// Machine-readable error code, when provided.
        code: Option<String>,
        /// Human-readable message.
        message: String,
    },

    /// Response body could not be understood.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The gateway answered with a different record than the one requested.
    #[error("Gateway returned {returned} when asked for {requested}")]
    WrongRecord {
        /// ID that was requested.
        requested: String,
        /// ID that came back.
        returned: String,
    },
}

impl GatewayError {
    /// Machine-readable gateway error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => code.as_deref(),
            Self::Http(_) | Self::Parse(_) | Self::WrongRecord { .. } => None,
        }
    }
}

fn format_code(code: Option<&str>) -> String {
    code.map_or_else(String::new, |c| format!(" ({c})"))
}

/// Payment gateway operations used by the storefront.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent.
    async fn create_payment_intent(
        &self,
        params: &CreatePaymentIntent,
    ) -> Result<PaymentIntent, GatewayError>;

    /// Fetch the current state of a payment intent.
    async fn retrieve_payment_intent(
        &self,
        id: &PaymentIntentId,
    ) -> Result<PaymentIntent, GatewayError>;

    /// Find the connected account a seller receives payouts on.
    ///
    /// `Ok(None)` means the seller has not onboarded; this is not an error.
    async fn find_seller_account(
        &self,
        seller_id: SellerId,
    ) -> Result<Option<ConnectedAccount>, GatewayError>;

    /// Create a customer record.
    async fn create_customer(&self, metadata: &Metadata) -> Result<Customer, GatewayError>;

    /// Delete a customer record.
    async fn delete_customer(&self, id: &CustomerId) -> Result<(), GatewayError>;

    /// Fetch a payment method, including the customer it is attached to.
    async fn retrieve_payment_method(
        &self,
        id: &PaymentMethodId,
    ) -> Result<PaymentMethod, GatewayError>;

    /// Attach a payment method to a customer for reuse.
    async fn attach_payment_method(
        &self,
        payment_method_id: &PaymentMethodId,
        customer_id: &CustomerId,
    ) -> Result<(), GatewayError>;

    /// Detach a payment method from whichever customer holds it.
    async fn detach_payment_method(
        &self,
        payment_method_id: &PaymentMethodId,
    ) -> Result<(), GatewayError>;

    /// Make a payment method the customer's default for invoices.
    async fn set_default_payment_method(
        &self,
        customer_id: &CustomerId,
        payment_method_id: &PaymentMethodId,
    ) -> Result<Customer, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display_with_code() {
        let err = GatewayError::Api {
            status: 402,
            kind: "card_error".to_string(),
            code: Some("card_declined".to_string()),
            message: "Your card was declined.".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "API error: 402 card_error (card_declined) - Your card was declined."
        );
        assert_eq!(err.code(), Some("card_declined"));
    }

    #[test]
    fn test_api_error_display_without_code() {
        let err = GatewayError::Api {
            status: 500,
            kind: "api_error".to_string(),
            code: None,
            message: "Something went wrong".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 500 api_error - Something went wrong");
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_wrong_record_display() {
        let err = GatewayError::WrongRecord {
            requested: "pi_asked".to_string(),
            returned: "pi_other".to_string(),
        };
        assert_eq!(err.to_string(), "Gateway returned pi_other when asked for pi_asked");
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_parse_error_display() {
        let err = GatewayError::Parse("missing field `id`".to_string());
        assert_eq!(err.to_string(), "Parse error: missing field `id`");
    }
}
