//! API error handling with Sentry integration.
//!
//! Provides `ApiError`, which captures server-side failures to Sentry before
//! responding. Every error response is a JSON envelope:
//!
//! ```json
//! { "message": "missing required field: orderId", "error": "missing_field" }
//! ```

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::services::payments::{ErrorKind, PaymentError};

/// Application-level error type for the storefront API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Payment orchestration failed.
    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// The request body is not valid JSON for the endpoint.
    #[error("malformed request body: {0}")]
    MalformedBody(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::MalformedBody(rejection.body_text())
    }
}

/// JSON error envelope.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable description.
    pub message: String,
    /// Machine-readable error code.
    pub error: &'static str,
    /// Gateway status of the payment intent, for unsuccessful payments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedBody(_) => StatusCode::BAD_REQUEST,
            Self::Payment(PaymentError::PaymentNotSuccessful { .. }) => {
                StatusCode::PAYMENT_REQUIRED
            }
            Self::Payment(err) => match err.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Gateway => StatusCode::BAD_GATEWAY,
                ErrorKind::Store | ErrorKind::Inconsistency => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            Self::MalformedBody(_) => ErrorBody {
                message: self.to_string(),
                error: "malformed_body",
                status: None,
            },
            Self::Payment(err) => ErrorBody {
                // Don't expose store internals to clients
                message: if err.kind() == ErrorKind::Store {
                    "Internal server error".to_string()
                } else {
                    err.to_string()
                },
                error: err.code(),
                status: match err {
                    PaymentError::PaymentNotSuccessful { status } => Some(status.to_string()),
                    _ => None,
                },
            },
        }
    }

    /// Report server-side failures to Sentry.
    fn capture(&self) {
        let Self::Payment(err) = self else {
            return;
        };

        match err.kind() {
            ErrorKind::Inconsistency => {
                let event_id = sentry::with_scope(
                    |scope| {
                        scope.set_tag("payment.inconsistency", err.code());
                        for (key, value) in inconsistency_tags(err) {
                            scope.set_tag(key, value);
                        }
                    },
                    || sentry::capture_error(err),
                );
                tracing::error!(
                    error = %err,
                    sentry_event_id = %event_id,
                    "Gateway and store disagree; manual reconciliation required"
                );
            }
            ErrorKind::Store | ErrorKind::Gateway
                if !matches!(err, PaymentError::PaymentNotSuccessful { .. }) =>
            {
                let event_id = sentry::capture_error(err);
                tracing::error!(
                    error = %err,
                    sentry_event_id = %event_id,
                    "Request error"
                );
            }
            _ => {}
        }
    }
}

/// Identifiers to tag an inconsistency event with.
fn inconsistency_tags(err: &PaymentError) -> Vec<(&'static str, String)> {
    match err {
        PaymentError::OrderUpdateFailedAfterPayment {
            payment_intent_id,
            order_id,
            ..
        } => vec![
            ("payment_intent_id", payment_intent_id.to_string()),
            ("order_id", order_id.to_string()),
        ],
        PaymentError::CustomerLeftDangling { customer_id, .. } => {
            vec![("customer_id", customer_id.to_string())]
        }
        PaymentError::PaymentMethodLeftAttached {
            payment_method_id,
            customer_id,
            ..
        } => vec![
            ("payment_method_id", payment_method_id.to_string()),
            ("customer_id", customer_id.to_string()),
        ],
        _ => Vec::new(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.capture();
        (self.status_code(), Json(self.body())).into_response()
    }
}

/// Result type alias for `ApiError`.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Set the Sentry user context for the rest of the request.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

/// Add a breadcrumb for a payment step.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("payment", "Confirming payment", Some(&[("order_id", "...")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
