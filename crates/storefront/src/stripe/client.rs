//! REST client for the payment gateway.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use localmart_core::{CustomerId, PaymentIntentId, PaymentMethodId, SellerId};

use super::types::{
    ConnectedAccount, CreatePaymentIntent, Customer, ErrorEnvelope, List, Metadata, PaymentIntent,
    PaymentMethod, SELLER_ID_METADATA_KEY, metadata_form,
};
use super::{GatewayError, PaymentGateway};
use crate::config::StripeConfig;

/// Page size used when scanning connected accounts.
const ACCOUNTS_PAGE_SIZE: &str = "100";

/// Client for the payment gateway REST API.
///
/// Cheap to clone; clones share the HTTP connection pool and account cache.
#[derive(Clone)]
pub struct StripeClient {
    inner: Arc<StripeClientInner>,
}

struct StripeClientInner {
    client: reqwest::Client,
    api_base: Url,
    accounts: Cache<SellerId, ConnectedAccount>,
}

impl StripeClient {
    /// Create a new gateway client.
    ///
    /// # Errors
    ///
    /// Returns error if the secret key is not a valid header value, the API
    /// base cannot carry a path, or the HTTP client fails to build.
    pub fn new(config: &StripeConfig) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();

        let mut auth_value =
            HeaderValue::from_str(&format!("Bearer {}", config.secret_key.expose_secret()))
                .map_err(|e| GatewayError::Parse(format!("Invalid secret key format: {e}")))?;
        auth_value.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_value);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        if config.api_base.cannot_be_a_base() {
            return Err(GatewayError::Parse(format!(
                "Invalid API base: {}",
                config.api_base
            )));
        }

        let accounts = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Ok(Self {
            inner: Arc::new(StripeClientInner {
                client,
                api_base: config.api_base.clone(),
                accounts,
            }),
        })
    }

    /// Build `{api_base}/v1/{segments...}`.
    ///
    /// Each segment is percent-encoded as a single path segment, so an ID can
    /// never reach a different resource.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.inner.api_base.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|()| GatewayError::Parse(format!("Invalid API base: {}", self.inner.api_base)))?
            .pop_if_empty()
            .push("v1")
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, GatewayError> {
        let response = self.inner.client.get(url).send().await?;
        read_response(response).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        url: Url,
        form: &[(String, String)],
    ) -> Result<T, GatewayError> {
        let response = self
            .inner
            .client
            .post(url)
            .form(form)
            .send()
            .await?;
        read_response(response).await
    }

    /// Fetch one page of connected accounts.
    async fn list_accounts(
        &self,
        starting_after: Option<&str>,
    ) -> Result<List<ConnectedAccount>, GatewayError> {
        let mut url = self.endpoint(&["accounts"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", ACCOUNTS_PAGE_SIZE);
            if let Some(cursor) = starting_after {
                query.append_pair("starting_after", cursor);
            }
        }

        self.get(url).await
    }
}

/// Turn a response into `T`, or into a `GatewayError::Api` for non-2xx.
async fn read_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, GatewayError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(api_error(status.as_u16(), &body));
    }

    serde_json::from_str(&body).map_err(|e| {
        tracing::error!(
            error = %e,
            body = %body.chars().take(500).collect::<String>(),
            "Failed to parse gateway response"
        );
        GatewayError::Parse(e.to_string())
    })
}

/// Build an API error from a non-2xx response body.
///
/// Falls back to the raw (truncated) body when it is not the gateway's
/// standard error envelope.
fn api_error(status: u16, body: &str) -> GatewayError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) => GatewayError::Api {
            status,
            kind: error.kind,
            code: error.code,
            message: error.message.unwrap_or_default(),
        },
        Err(_) => GatewayError::Api {
            status,
            kind: "unknown".to_string(),
            code: None,
            message: body.chars().take(200).collect(),
        },
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    #[instrument(skip(self, params), fields(amount = params.amount, currency = %params.currency))]
    async fn create_payment_intent(
        &self,
        params: &CreatePaymentIntent,
    ) -> Result<PaymentIntent, GatewayError> {
        self.post(self.endpoint(&["payment_intents"])?, &params.to_form())
            .await
    }

    #[instrument(skip(self), fields(payment_intent_id = %id))]
    async fn retrieve_payment_intent(
        &self,
        id: &PaymentIntentId,
    ) -> Result<PaymentIntent, GatewayError> {
        self.get(self.endpoint(&["payment_intents", id.as_str()])?)
            .await
    }

    #[instrument(skip(self), fields(seller_id = %seller_id))]
    async fn find_seller_account(
        &self,
        seller_id: SellerId,
    ) -> Result<Option<ConnectedAccount>, GatewayError> {
        if let Some(account) = self.inner.accounts.get(&seller_id).await {
            debug!("Cache hit for seller account");
            return Ok(Some(account));
        }

        let wanted = seller_id.to_string();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.list_accounts(cursor.as_deref()).await?;
            cursor = page.data.last().map(|account| account.id.to_string());

            let found = page.data.into_iter().find(|account| {
                account
                    .metadata
                    .get(SELLER_ID_METADATA_KEY)
                    .is_some_and(|value| *value == wanted)
            });

            if let Some(account) = found {
                self.inner.accounts.insert(seller_id, account.clone()).await;
                return Ok(Some(account));
            }

            if !page.has_more || cursor.is_none() {
                return Ok(None);
            }
        }
    }

    #[instrument(skip(self, metadata))]
    async fn create_customer(&self, metadata: &Metadata) -> Result<Customer, GatewayError> {
        self.post(self.endpoint(&["customers"])?, &metadata_form(metadata))
            .await
    }

    #[instrument(skip(self), fields(customer_id = %id))]
    async fn delete_customer(&self, id: &CustomerId) -> Result<(), GatewayError> {
        let response = self
            .inner
            .client
            .delete(self.endpoint(&["customers", id.as_str()])?)
            .send()
            .await?;
        let _: serde_json::Value = read_response(response).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(payment_method_id = %id))]
    async fn retrieve_payment_method(
        &self,
        id: &PaymentMethodId,
    ) -> Result<PaymentMethod, GatewayError> {
        self.get(self.endpoint(&["payment_methods", id.as_str()])?)
            .await
    }

    #[instrument(skip(self), fields(payment_method_id = %payment_method_id, customer_id = %customer_id))]
    async fn attach_payment_method(
        &self,
        payment_method_id: &PaymentMethodId,
        customer_id: &CustomerId,
    ) -> Result<(), GatewayError> {
        let form = [("customer".to_string(), customer_id.to_string())];
        let url = self.endpoint(&["payment_methods", payment_method_id.as_str(), "attach"])?;
        let _: serde_json::Value = self.post(url, &form).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(payment_method_id = %payment_method_id))]
    async fn detach_payment_method(
        &self,
        payment_method_id: &PaymentMethodId,
    ) -> Result<(), GatewayError> {
        let url = self.endpoint(&["payment_methods", payment_method_id.as_str(), "detach"])?;
        let _: serde_json::Value = self.post(url, &[]).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(customer_id = %customer_id, payment_method_id = %payment_method_id))]
    async fn set_default_payment_method(
        &self,
        customer_id: &CustomerId,
        payment_method_id: &PaymentMethodId,
    ) -> Result<Customer, GatewayError> {
        let form = [(
            "invoice_settings[default_payment_method]".to_string(),
            payment_method_id.to_string(),
        )];
        self.post(self.endpoint(&["customers", customer_id.as_str()])?, &form)
            .await
    }
}
