//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::{PaymentSettings, StorefrontConfig};
use crate::db::{OrderStore, PgStore, ProfileStore};
use crate::stripe::{GatewayError, PaymentGateway, StripeClient};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and owns the single gateway and
/// store handles of the process. Services borrow them per request.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    gateway: Arc<dyn PaymentGateway>,
    orders: Arc<dyn OrderStore>,
    profiles: Arc<dyn ProfileStore>,
    payments: PaymentSettings,
}

impl AppState {
    /// Create production state from configuration and a connected store.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway client cannot be built.
    pub fn new(config: &StorefrontConfig, store: PgStore) -> Result<Self, GatewayError> {
        let gateway = StripeClient::new(&config.stripe)?;
        let store = Arc::new(store);

        Ok(Self::from_parts(
            Arc::new(gateway),
            store.clone(),
            store,
            config.payments,
        ))
    }

    /// Assemble state from explicit handles.
    #[must_use]
    pub fn from_parts(
        gateway: Arc<dyn PaymentGateway>,
        orders: Arc<dyn OrderStore>,
        profiles: Arc<dyn ProfileStore>,
        payments: PaymentSettings,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                gateway,
                orders,
                profiles,
                payments,
            }),
        }
    }

    /// Get the payment gateway.
    #[must_use]
    pub fn gateway(&self) -> &dyn PaymentGateway {
        self.inner.gateway.as_ref()
    }

    /// Get the order store.
    #[must_use]
    pub fn orders(&self) -> &dyn OrderStore {
        self.inner.orders.as_ref()
    }

    /// Get the profile store.
    #[must_use]
    pub fn profiles(&self) -> &dyn ProfileStore {
        self.inner.profiles.as_ref()
    }

    /// Get the payment settings.
    #[must_use]
    pub fn payments(&self) -> PaymentSettings {
        self.inner.payments
    }
}
