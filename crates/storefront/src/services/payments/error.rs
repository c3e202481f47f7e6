//! Payment orchestration error types.

use thiserror::Error;

use localmart_core::{CustomerId, OrderId, PaymentIntentId, PaymentIntentStatus, PaymentMethodId};

use crate::db::RepositoryError;
use crate::stripe::GatewayError;

/// Coarse classification of a [`PaymentError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing input; rejected before any external call.
    Validation,
    /// The payment gateway failed or reported an unexpected state.
    Gateway,
    /// The order store failed.
    Store,
    /// The request contradicts state already recorded.
    Conflict,
    /// The gateway and the store disagree and need manual reconciliation.
    Inconsistency,
}

/// Errors that can occur during payment orchestration.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// A required request field is absent or blank.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A request field is present but malformed.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },

    /// The charge amount is not positive or cannot be represented.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Creating the payment intent (or resolving its payout account) failed.
    #[error("payment intent creation failed: {0}")]
    PaymentIntentCreationFailed(#[source] GatewayError),

    /// The gateway reports the intent has not succeeded.
    #[error("payment not successful: {status}")]
    PaymentNotSuccessful { status: PaymentIntentStatus },

    /// Any other gateway failure.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Order store failure.
    #[error("store error: {0}")]
    Store(#[from] RepositoryError),

    /// Looking up the user's gateway customer failed (not merely absent).
    #[error("customer lookup failed: {0}")]
    CustomerLookupFailed(#[source] RepositoryError),

    /// The order was already paid by a different payment intent.
    #[error("order {order_id} is already paid{}", format_existing(.existing.as_ref()))]
    AlreadyPaid {
        order_id: OrderId,
        existing: Option<PaymentIntentId>,
    },

    /// Money was captured but the order could not be marked paid.
    #[error(
        "payment {payment_intent_id} succeeded but order {order_id} was not marked paid: {reason}"
    )]
    OrderUpdateFailedAfterPayment {
        payment_intent_id: PaymentIntentId,
        order_id: OrderId,
        reason: String,
    },

    /// A gateway customer was created but neither recorded nor removed.
    #[error("customer {customer_id} was created but not recorded ({cause}); deleting it failed: {cleanup}")]
    CustomerLeftDangling {
        customer_id: CustomerId,
        cause: String,
        #[source]
        cleanup: GatewayError,
    },

    /// A payment method was attached but could not be made default nor detached.
    #[error(
        "payment method {payment_method_id} is attached to {customer_id} but not default ({cause}); detaching it failed: {cleanup}"
    )]
    PaymentMethodLeftAttached {
        payment_method_id: PaymentMethodId,
        customer_id: CustomerId,
        cause: GatewayError,
        #[source]
        cleanup: GatewayError,
    },
}

impl PaymentError {
    /// Classify the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField(_) | Self::InvalidField { .. } | Self::InvalidAmount(_) => {
                ErrorKind::Validation
            }
            Self::PaymentIntentCreationFailed(_)
            | Self::PaymentNotSuccessful { .. }
            | Self::Gateway(_) => ErrorKind::Gateway,
            Self::Store(_) | Self::CustomerLookupFailed(_) => ErrorKind::Store,
            Self::AlreadyPaid { .. } => ErrorKind::Conflict,
            Self::OrderUpdateFailedAfterPayment { .. }
            | Self::CustomerLeftDangling { .. }
            | Self::PaymentMethodLeftAttached { .. } => ErrorKind::Inconsistency,
        }
    }

    /// Machine-readable code reported to API clients.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "missing_field",
            Self::InvalidField { .. } => "invalid_field",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::PaymentIntentCreationFailed(_) => "payment_intent_creation_failed",
            Self::PaymentNotSuccessful { .. } => "payment_not_successful",
            Self::Gateway(_) => "gateway_error",
            Self::Store(_) => "store_error",
            Self::CustomerLookupFailed(_) => "customer_lookup_failed",
            Self::AlreadyPaid { .. } => "already_paid",
            Self::OrderUpdateFailedAfterPayment { .. } => "order_update_failed_after_payment",
            Self::CustomerLeftDangling { .. } => "customer_left_dangling",
            Self::PaymentMethodLeftAttached { .. } => "payment_method_left_attached",
        }
    }
}

fn format_existing(existing: Option<&PaymentIntentId>) -> String {
    existing.map_or_else(String::new, |id| format!(" by {id}"))
}
