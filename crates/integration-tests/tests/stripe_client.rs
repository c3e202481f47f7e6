//! Contract tests for `StripeClient` against a mock gateway.
//!
//! | Method | Path | Test |
//! |--------|------|------|
//! | POST | `/v1/payment_intents` | `create_intent_*` |
//! | GET | `/v1/payment_intents/{id}` | `retrieve_intent_*` |
//! | GET | `/v1/accounts` | `find_seller_account_*` |
//! | POST/DELETE | `/v1/customers` | `customer_*` |
//! | GET | `/v1/payment_methods/{id}` | `payment_method_*` |
//! | POST | `/v1/payment_methods/{id}/attach` | `attach_*` |

#![allow(clippy::unwrap_used)]

use localmart_core::{
    AccountId, CurrencyCode, CustomerId, PaymentIntentId, PaymentIntentStatus, PaymentMethodId,
    SellerId,
};
use localmart_integration_tests::stripe_config;
use localmart_storefront::stripe::{
    CreatePaymentIntent, DestinationTransfer, GatewayError, Metadata, PaymentGateway,
    StripeClient,
};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> StripeClient {
    StripeClient::new(&stripe_config(&server.uri())).unwrap()
}

fn intent_json(id: &str, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "object": "payment_intent",
        "status": status,
        "amount": 100_000,
        "currency": "usd",
        "client_secret": format!("{id}_secret_abc"),
        "metadata": {}
    })
}

// ── POST /v1/payment_intents ─────────────────────────────────────────

#[tokio::test]
async fn create_intent_sends_form_encoded_split() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .and(header("authorization", "Bearer sk_test_integration"))
        .and(body_string_contains("amount=100000"))
        .and(body_string_contains("currency=usd"))
        .and(body_string_contains("transfer_data%5Bdestination%5D=acct_seller"))
        .and(body_string_contains("application_fee_amount=5000"))
        .and(body_string_contains("metadata%5Bcart_id%5D=cart-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(intent_json(
            "pi_split",
            "requires_payment_method",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let params = CreatePaymentIntent {
        amount: 100_000,
        currency: CurrencyCode::USD,
        metadata: Metadata::from([("cart_id".to_string(), "cart-9".to_string())]),
        transfer: Some(DestinationTransfer {
            destination: AccountId::new("acct_seller").unwrap(),
            application_fee_amount: 5_000,
        }),
    };

    let intent = client(&server).create_payment_intent(&params).await.unwrap();
    assert_eq!(intent.id.as_str(), "pi_split");
    assert_eq!(intent.client_secret.as_deref(), Some("pi_split_secret_abc"));
    assert_eq!(intent.status, PaymentIntentStatus::RequiresPaymentMethod);
}

#[tokio::test]
async fn create_intent_surfaces_error_envelope() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "type": "invalid_request_error",
                "code": "amount_too_small",
                "message": "Amount must be at least 50 cents"
            }
        })))
        .mount(&server)
        .await;

    let params = CreatePaymentIntent {
        amount: 10,
        currency: CurrencyCode::USD,
        metadata: Metadata::new(),
        transfer: None,
    };

    let err = client(&server)
        .create_payment_intent(&params)
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("amount_too_small"));
    assert!(matches!(err, GatewayError::Api { status: 400, .. }));
}

// ── GET /v1/payment_intents/{id} ─────────────────────────────────────

#[tokio::test]
async fn retrieve_intent_keeps_unknown_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/pi_new"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(intent_json("pi_new", "requires_review")),
        )
        .mount(&server)
        .await;

    let intent = client(&server)
        .retrieve_payment_intent(&PaymentIntentId::new("pi_new").unwrap())
        .await
        .unwrap();
    assert_eq!(
        intent.status,
        PaymentIntentStatus::Other("requires_review".to_string())
    );
    assert!(!intent.status.is_succeeded());
}

#[tokio::test]
async fn retrieve_intent_rejects_garbage_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/pi_bad"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client(&server)
        .retrieve_payment_intent(&PaymentIntentId::new("pi_bad").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Parse(_)));
}

// ── GET /v1/accounts ─────────────────────────────────────────────────

#[tokio::test]
async fn find_seller_account_follows_pagination() {
    let server = MockServer::start().await;
    let seller_id = SellerId::random();

    Mock::given(method("GET"))
        .and(path("/v1/accounts"))
        .and(query_param("starting_after", "acct_other"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                { "id": "acct_match", "metadata": { "seller_id": seller_id.to_string() } }
            ],
            "has_more": false
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/accounts"))
        .and(query_param("limit", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                { "id": "acct_other", "metadata": { "seller_id": "someone-else" } }
            ],
            "has_more": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = client(&server);
    let account = gateway.find_seller_account(seller_id).await.unwrap().unwrap();
    assert_eq!(account.id.as_str(), "acct_match");

    // Served from the cache; the `expect(1)` counts are verified on drop.
    let cached = gateway.find_seller_account(seller_id).await.unwrap().unwrap();
    assert_eq!(cached.id, account.id);
}

#[tokio::test]
async fn find_seller_account_returns_none_when_absent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [],
            "has_more": false
        })))
        .expect(2)
        .mount(&server)
        .await;

    let gateway = client(&server);
    let seller_id = SellerId::random();
    assert!(gateway.find_seller_account(seller_id).await.unwrap().is_none());
    // Misses are not cached.
    assert!(gateway.find_seller_account(seller_id).await.unwrap().is_none());
}

// ── Customers ────────────────────────────────────────────────────────

#[tokio::test]
async fn customer_create_sends_metadata() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/customers"))
        .and(body_string_contains("metadata%5Buser_id%5D=user-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cus_new",
            "object": "customer",
            "metadata": { "user_id": "user-1" }
        })))
        .mount(&server)
        .await;

    let metadata = Metadata::from([("user_id".to_string(), "user-1".to_string())]);
    let customer = client(&server).create_customer(&metadata).await.unwrap();
    assert_eq!(customer.id.as_str(), "cus_new");
    assert!(customer.invoice_settings.default_payment_method.is_none());
}

#[tokio::test]
async fn customer_delete_uses_delete_method() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/v1/customers/cus_gone"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cus_gone",
            "object": "customer",
            "deleted": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .delete_customer(&CustomerId::new("cus_gone").unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn customer_default_payment_method_is_set() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/customers/cus_1"))
        .and(body_string_contains(
            "invoice_settings%5Bdefault_payment_method%5D=pm_card",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cus_1",
            "object": "customer",
            "invoice_settings": { "default_payment_method": "pm_card" }
        })))
        .mount(&server)
        .await;

    let customer = client(&server)
        .set_default_payment_method(
            &CustomerId::new("cus_1").unwrap(),
            &PaymentMethodId::new("pm_card").unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        customer.invoice_settings.default_payment_method,
        PaymentMethodId::new("pm_card")
    );
}

// ── GET /v1/payment_methods/{id} ─────────────────────────────────────

#[tokio::test]
async fn payment_method_reports_owning_customer() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/payment_methods/pm_saved"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pm_saved",
            "object": "payment_method",
            "type": "card",
            "customer": "cus_owner"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let payment_method = client(&server)
        .retrieve_payment_method(&PaymentMethodId::new("pm_saved").unwrap())
        .await
        .unwrap();
    assert_eq!(payment_method.id.as_str(), "pm_saved");
    assert_eq!(payment_method.customer, CustomerId::new("cus_owner"));
}

#[tokio::test]
async fn payment_method_with_malformed_customer_is_parse_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/payment_methods/pm_odd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pm_odd",
            "customer": "cus_1/../acct_2"
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .retrieve_payment_method(&PaymentMethodId::new("pm_odd").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Parse(_)));
}

// ── POST /v1/payment_methods/{id}/attach ─────────────────────────────

#[tokio::test]
async fn attach_reports_declined_card() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/payment_methods/pm_bad/attach"))
        .and(body_string_contains("customer=cus_1"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "error": {
                "type": "card_error",
                "code": "card_declined",
                "message": "Your card was declined."
            }
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .attach_payment_method(
            &PaymentMethodId::new("pm_bad").unwrap(),
            &CustomerId::new("cus_1").unwrap(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("card_declined"));
}
