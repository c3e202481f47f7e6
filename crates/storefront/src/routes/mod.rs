//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (store reachable)
//!
//! # Payments API (JSON)
//! POST /api/payments/intents   - Create a payment intent
//! POST /api/payments/confirm   - Confirm an order as paid
//! POST /api/payments/methods   - Save a payment method as default
//! ```

pub mod api;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn,
    routing::{get, post},
};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::middleware::request_id_middleware;
use crate::state::AppState;

/// Create the payment API router.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/intents", post(api::payments::create_intent))
        .route("/confirm", post(api::payments::confirm_payment))
        .route("/methods", post(api::payments::save_payment_method))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/api/payments", payment_routes())
}

/// Build the application with tracing and request-id middleware.
///
/// Sentry layers are added by the binary, outside this router.
pub fn app(state: AppState) -> Router {
    routes()
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.orders().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, header};
    use localmart_core::PaymentIntentStatus;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::config::PaymentSettings;
    use crate::middleware::request_id::REQUEST_ID_HEADER;
    use crate::testing::{FakeGateway, MemoryStore};

    fn test_app(gateway: Arc<FakeGateway>, store: Arc<MemoryStore>) -> Router {
        let state = AppState::from_parts(gateway, store.clone(), store, PaymentSettings::default());
        app(state)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(Arc::new(FakeGateway::new()), Arc::new(MemoryStore::new()));

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn test_readiness_reports_unreachable_store() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable();
        let app = test_app(Arc::new(FakeGateway::new()), store);

        let response = app
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_create_intent() {
        let gateway = Arc::new(FakeGateway::new());
        let app = test_app(gateway.clone(), Arc::new(MemoryStore::new()));

        let response = app
            .oneshot(post_json(
                "/api/payments/intents",
                r#"{"amount": "1000.00", "metadata": {"cartId": "c1"}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Payment intent created");
        assert!(body["clientSecret"].as_str().is_some());
        assert!(body["paymentIntentId"].as_str().unwrap().starts_with("pi_"));
        assert_eq!(gateway.last_intent_params().unwrap().amount, 100_000);
    }

    #[tokio::test]
    async fn test_create_intent_requires_amount() {
        let gateway = Arc::new(FakeGateway::new());
        let app = test_app(gateway.clone(), Arc::new(MemoryStore::new()));

        let response = app
            .oneshot(post_json("/api/payments/intents", "{}"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "missing_field");
        assert_eq!(gateway.calls().total(), 0);
    }

    #[tokio::test]
    async fn test_create_intent_rejects_negative_amount() {
        let gateway = Arc::new(FakeGateway::new());
        let app = test_app(gateway.clone(), Arc::new(MemoryStore::new()));

        let response = app
            .oneshot(post_json("/api/payments/intents", r#"{"amount": -5}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid_amount");
        assert_eq!(gateway.calls().total(), 0);
    }

    #[tokio::test]
    async fn test_malformed_json_uses_envelope() {
        let app = test_app(Arc::new(FakeGateway::new()), Arc::new(MemoryStore::new()));

        let response = app
            .oneshot(post_json("/api/payments/confirm", "{not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "malformed_body");
        assert!(body["message"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_confirm_payment_flow() {
        let gateway = Arc::new(FakeGateway::new());
        let store = Arc::new(MemoryStore::new());
        let order_id = store.add_order(None);
        gateway.set_intent_status("pi_ok", PaymentIntentStatus::Succeeded);
        let app = test_app(gateway, store.clone());
        let request = json!({ "paymentIntentId": "pi_ok", "orderId": order_id }).to_string();

        let response = app
            .clone()
            .oneshot(post_json("/api/payments/confirm", &request))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["alreadyConfirmed"], false);
        assert_eq!(body["orderId"], order_id.to_string());

        let replay = app
            .oneshot(post_json("/api/payments/confirm", &request))
            .await
            .unwrap();
        assert_eq!(replay.status(), StatusCode::OK);
        assert_eq!(body_json(replay).await["alreadyConfirmed"], true);
        assert_eq!(store.writes().mark_paid, 1);
    }

    #[tokio::test]
    async fn test_confirm_unsuccessful_payment() {
        let gateway = Arc::new(FakeGateway::new());
        let store = Arc::new(MemoryStore::new());
        let order_id = store.add_order(None);
        gateway.set_intent_status("pi_wait", PaymentIntentStatus::Processing);
        let app = test_app(gateway, store.clone());
        let request = json!({ "paymentIntentId": "pi_wait", "orderId": order_id }).to_string();

        let response = app
            .oneshot(post_json("/api/payments/confirm", &request))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "payment_not_successful");
        assert_eq!(body["status"], "processing");
        assert_eq!(store.writes().mark_paid, 0);
    }

    #[tokio::test]
    async fn test_confirm_requires_both_ids() {
        let gateway = Arc::new(FakeGateway::new());
        let app = test_app(gateway.clone(), Arc::new(MemoryStore::new()));

        let response = app
            .oneshot(post_json(
                "/api/payments/confirm",
                r#"{"paymentIntentId": "pi_1"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["message"],
            "missing required field: orderId"
        );
        assert_eq!(gateway.calls().total(), 0);
    }

    #[tokio::test]
    async fn test_save_payment_method() {
        let gateway = Arc::new(FakeGateway::new());
        let store = Arc::new(MemoryStore::new());
        let app = test_app(gateway.clone(), store.clone());
        let user_id = localmart_core::UserId::random();
        let request = json!({ "paymentMethodId": "pm_card", "userId": user_id }).to_string();

        let response = app
            .oneshot(post_json("/api/payments/methods", &request))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["paymentMethodId"], "pm_card");
        assert_eq!(
            body["customerId"].as_str(),
            store.customer_for(user_id).as_ref().map(|c| c.as_str())
        );
    }
}
