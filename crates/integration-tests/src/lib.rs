//! Integration tests for Localmart.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p localmart-integration-tests
//! ```
//!
//! No database or network access is needed: the gateway client is exercised
//! against a local `wiremock` server, and the API router runs over the
//! in-memory store and scripted gateway from `localmart_storefront::testing`.
//!
//! # Test Categories
//!
//! - `stripe_client` - Gateway REST client request encoding and responses
//! - `payments_api` - Payment endpoints end to end through the router

use std::time::Duration;

use localmart_storefront::config::StripeConfig;
use secrecy::SecretString;

/// Gateway configuration pointed at a mock server.
///
/// # Panics
///
/// Panics if `api_base` is not a valid URL.
#[must_use]
pub fn stripe_config(api_base: &str) -> StripeConfig {
    StripeConfig {
        secret_key: SecretString::from("sk_test_integration"),
        api_base: url::Url::parse(api_base).expect("mock server URI is a valid URL"),
        timeout: Duration::from_secs(5),
    }
}
