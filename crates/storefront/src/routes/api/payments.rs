//! Payment API routes.
//!
//! JSON endpoints used by the checkout page. Required fields are validated
//! before any gateway or store call is made.

use axum::{Json, extract::State, extract::rejection::JsonRejection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use localmart_core::{CustomerId, OrderId, PaymentIntentId, PaymentMethodId, SellerId, UserId};

use crate::error::{Result, add_breadcrumb, set_sentry_user};
use crate::services::payments::{
    PaymentConfirmationReconciler, PaymentError, PaymentIntentCreator, PaymentMethodVault,
    parse_required,
};
use crate::state::AppState;
use crate::stripe::Metadata;

// ============================================================================
// Payment intents
// ============================================================================

/// Request to create a payment intent.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    /// Amount in the currency's standard unit (e.g. `19.99`).
    pub amount: Option<Decimal>,
    /// Seller to route the payout to.
    pub seller_id: Option<String>,
    /// Opaque metadata forwarded to the gateway.
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

/// Response from creating a payment intent.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentResponse {
    pub message: &'static str,
    pub client_secret: String,
    pub payment_intent_id: PaymentIntentId,
}

/// Create a payment intent.
///
/// POST /api/payments/intents
///
/// # Errors
///
/// Returns `ApiError` if validation or intent creation fails.
pub async fn create_intent(
    State(state): State<AppState>,
    body: std::result::Result<Json<CreateIntentRequest>, JsonRejection>,
) -> Result<Json<CreateIntentResponse>> {
    let Json(request) = body?;

    let amount = request.amount.ok_or(PaymentError::MissingField("amount"))?;
    let seller_id = request
        .seller_id
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_required::<SellerId>(Some(s), "sellerId"))
        .transpose()?;
    let metadata = request.metadata.map(flatten_metadata).unwrap_or_default();

    add_breadcrumb("payment", "Creating payment intent", None);

    let created = PaymentIntentCreator::new(state.gateway(), state.payments())
        .create(amount, seller_id, metadata)
        .await?;

    Ok(Json(CreateIntentResponse {
        message: "Payment intent created",
        client_secret: created.client_secret,
        payment_intent_id: created.payment_intent_id,
    }))
}

/// Convert JSON metadata into gateway string pairs.
///
/// Strings are used as-is; other values are stored as their JSON text.
fn flatten_metadata(metadata: Map<String, Value>) -> Metadata {
    metadata
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect()
}

// ============================================================================
// Confirmation
// ============================================================================

/// Request to confirm an order's payment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentRequest {
    pub payment_intent_id: Option<String>,
    pub order_id: Option<String>,
}

/// Response from confirming an order's payment.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentResponse {
    pub message: &'static str,
    pub order_id: OrderId,
    pub payment_intent_id: PaymentIntentId,
    pub already_confirmed: bool,
}

/// Confirm an order as paid once its payment intent has succeeded.
///
/// POST /api/payments/confirm
///
/// # Errors
///
/// Returns `ApiError` if validation fails, the payment has not succeeded,
/// or the order cannot be marked paid.
pub async fn confirm_payment(
    State(state): State<AppState>,
    body: std::result::Result<Json<ConfirmPaymentRequest>, JsonRejection>,
) -> Result<Json<ConfirmPaymentResponse>> {
    let Json(request) = body?;

    let payment_intent_id: PaymentIntentId =
        parse_required(request.payment_intent_id.as_deref(), "paymentIntentId")?;
    let order_id: OrderId = parse_required(request.order_id.as_deref(), "orderId")?;

    let order_ref = order_id.to_string();
    add_breadcrumb(
        "payment",
        "Confirming payment",
        Some(&[
            ("order_id", order_ref.as_str()),
            ("payment_intent_id", payment_intent_id.as_str()),
        ]),
    );

    let outcome = PaymentConfirmationReconciler::new(state.gateway(), state.orders())
        .confirm(&payment_intent_id, order_id)
        .await?;

    Ok(Json(ConfirmPaymentResponse {
        message: if outcome.already_confirmed() {
            "Payment already confirmed"
        } else {
            "Payment confirmed"
        },
        order_id,
        payment_intent_id,
        already_confirmed: outcome.already_confirmed(),
    }))
}

// ============================================================================
// Saved payment methods
// ============================================================================

/// Request to save a payment method for reuse.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePaymentMethodRequest {
    pub payment_method_id: Option<String>,
    pub user_id: Option<String>,
}

/// Response from saving a payment method.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePaymentMethodResponse {
    pub message: &'static str,
    pub customer_id: CustomerId,
    pub payment_method_id: PaymentMethodId,
}

/// Save a payment method as the user's default.
///
/// POST /api/payments/methods
///
/// # Errors
///
/// Returns `ApiError` if validation fails or any vault step fails.
pub async fn save_payment_method(
    State(state): State<AppState>,
    body: std::result::Result<Json<SavePaymentMethodRequest>, JsonRejection>,
) -> Result<Json<SavePaymentMethodResponse>> {
    let Json(request) = body?;

    let payment_method_id: PaymentMethodId =
        parse_required(request.payment_method_id.as_deref(), "paymentMethodId")?;
    let user_id: UserId = parse_required(request.user_id.as_deref(), "userId")?;

    set_sentry_user(&user_id);

    let saved = PaymentMethodVault::new(state.gateway(), state.profiles())
        .save(&payment_method_id, user_id)
        .await?;

    Ok(Json(SavePaymentMethodResponse {
        message: "Payment method saved",
        customer_id: saved.customer_id,
        payment_method_id: saved.payment_method_id,
    }))
}
