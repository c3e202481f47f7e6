//! In-memory fakes for the store and gateway seams.
//!
//! Available to this crate's tests and, with the `test-support` feature, to
//! other crates. Both fakes record how often each operation ran and can be
//! told to fail specific operations.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use localmart_core::{
    AccountId, CustomerId, OrderId, OrderItemId, OrderStatus, PaymentIntentId,
    PaymentIntentStatus, PaymentMethodId, PaymentStatus, ProductId, SellerId, UserId,
};

use crate::db::{MarkPaidOutcome, OrderStore, ProfileStore, RepositoryError};
use crate::models::{Order, OrderItem, Product, UserProfile};
use crate::stripe::{
    ConnectedAccount, CreatePaymentIntent, Customer, GatewayError, InvoiceSettings, Metadata,
    PaymentGateway, PaymentIntent, PaymentMethod, SELLER_ID_METADATA_KEY, TransferData,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn store_failure() -> RepositoryError {
    RepositoryError::Database(sqlx::Error::PoolTimedOut)
}

fn gateway_failure(status: u16, message: &str) -> GatewayError {
    GatewayError::Api {
        status,
        kind: "api_error".to_string(),
        code: None,
        message: message.to_string(),
    }
}

// =============================================================================
// MemoryStore
// =============================================================================

/// Rows actually written by a [`MemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreWrites {
    /// Orders moved to paid.
    pub mark_paid: usize,
    /// Orders given a seller.
    pub assign_seller: usize,
    /// Profiles whose customer was recorded.
    pub save_customer: usize,
}

#[derive(Default)]
struct StoreState {
    orders: BTreeMap<OrderId, Order>,
    items: Vec<OrderItem>,
    next_position: i64,
    products: HashMap<ProductId, Product>,
    customers: HashMap<UserId, CustomerId>,
    writes: StoreWrites,
    unavailable: bool,
    fail_mark_paid: bool,
    fail_customer_lookup: bool,
    fail_customer_save: bool,
    fail_assign_seller: HashSet<OrderId>,
    record_on_save: HashMap<UserId, CustomerId>,
}

/// In-memory [`OrderStore`] and [`ProfileStore`].
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an unpaid, pending order.
    pub fn add_order(&self, seller_id: Option<SellerId>) -> OrderId {
        let id = OrderId::random();
        let now = Utc::now();
        lock(&self.state).orders.insert(
            id,
            Order {
                id,
                buyer_id: Some(UserId::random()),
                payment_status: PaymentStatus::Unpaid,
                status: OrderStatus::Pending,
                payment_intent_id: None,
                seller_id,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    /// Insert a product.
    pub fn add_product(&self, seller_id: Option<SellerId>) -> ProductId {
        let id = ProductId::random();
        lock(&self.state).products.insert(
            id,
            Product {
                id,
                seller_id,
                name: format!("Product {id}"),
            },
        );
        id
    }

    /// Append a line item to an order.
    pub fn add_item(&self, order_id: OrderId, product_id: ProductId) -> OrderItemId {
        let id = OrderItemId::random();
        let mut state = lock(&self.state);
        state.next_position += 1;
        let position = state.next_position;
        state.items.push(OrderItem {
            id,
            order_id,
            product_id,
            position,
        });
        id
    }

    /// Current state of an order.
    #[must_use]
    pub fn order(&self, id: OrderId) -> Option<Order> {
        lock(&self.state).orders.get(&id).cloned()
    }

    /// Line items of an order.
    #[must_use]
    pub fn items(&self, order_id: OrderId) -> Vec<OrderItem> {
        lock(&self.state)
            .items
            .iter()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect()
    }

    /// Customer recorded for a user.
    #[must_use]
    pub fn customer_for(&self, user_id: UserId) -> Option<CustomerId> {
        lock(&self.state).customers.get(&user_id).cloned()
    }

    /// Rows written so far.
    #[must_use]
    pub fn writes(&self) -> StoreWrites {
        lock(&self.state).writes
    }

    /// Make every operation fail.
    pub fn set_unavailable(&self) {
        lock(&self.state).unavailable = true;
    }

    /// Make `mark_paid` fail.
    pub fn fail_mark_paid(&self) {
        lock(&self.state).fail_mark_paid = true;
    }

    /// Make customer lookups fail.
    pub fn fail_customer_lookup(&self) {
        lock(&self.state).fail_customer_lookup = true;
    }

    /// Make recording a customer fail.
    pub fn fail_customer_save(&self) {
        lock(&self.state).fail_customer_save = true;
    }

    /// Make `assign_seller` fail for one order.
    pub fn fail_assign_seller_for(&self, order_id: OrderId) {
        lock(&self.state).fail_assign_seller.insert(order_id);
    }

    /// Simulate a concurrent request recording `customer_id` for `user_id`
    /// just before this store records one.
    pub fn record_customer_on_save(&self, user_id: UserId, customer_id: CustomerId) {
        lock(&self.state).record_on_save.insert(user_id, customer_id);
    }

    fn check_available(state: &StoreState) -> Result<(), RepositoryError> {
        if state.unavailable {
            Err(store_failure())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Self::check_available(&lock(&self.state))
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let state = lock(&self.state);
        Self::check_available(&state)?;
        Ok(state.orders.get(&id).cloned())
    }

    async fn mark_paid(
        &self,
        id: OrderId,
        payment_intent_id: &PaymentIntentId,
    ) -> Result<MarkPaidOutcome, RepositoryError> {
        let mut state = lock(&self.state);
        Self::check_available(&state)?;
        if state.fail_mark_paid {
            return Err(store_failure());
        }

        let Some(order) = state.orders.get_mut(&id) else {
            return Ok(MarkPaidOutcome::NotFound);
        };
        if order.is_paid() {
            return Ok(MarkPaidOutcome::AlreadyPaid {
                payment_intent_id: order.payment_intent_id.clone(),
            });
        }

        order.payment_status = PaymentStatus::Paid;
        order.payment_intent_id = Some(payment_intent_id.clone());
        order.status = OrderStatus::Processing;
        order.updated_at = Utc::now();
        state.writes.mark_paid += 1;
        Ok(MarkPaidOutcome::Updated)
    }

    async fn orders_missing_seller(&self) -> Result<Vec<OrderId>, RepositoryError> {
        let state = lock(&self.state);
        Self::check_available(&state)?;
        let mut orders: Vec<&Order> = state
            .orders
            .values()
            .filter(|order| order.seller_id.is_none())
            .collect();
        orders.sort_by_key(|order| (order.created_at, order.id));
        Ok(orders.into_iter().map(|order| order.id).collect())
    }

    async fn order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        Self::check_available(&lock(&self.state))?;
        Ok(self.items(order_id))
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let state = lock(&self.state);
        Self::check_available(&state)?;
        Ok(state.products.get(&id).cloned())
    }

    async fn assign_seller(
        &self,
        order_id: OrderId,
        seller_id: SellerId,
    ) -> Result<bool, RepositoryError> {
        let mut state = lock(&self.state);
        Self::check_available(&state)?;
        if state.fail_assign_seller.contains(&order_id) {
            return Err(store_failure());
        }

        match state.orders.get_mut(&order_id) {
            Some(order) if order.seller_id.is_none() => {
                order.seller_id = Some(seller_id);
                order.updated_at = Utc::now();
                state.writes.assign_seller += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn stripe_customer_id(
        &self,
        user_id: UserId,
    ) -> Result<Option<CustomerId>, RepositoryError> {
        let state = lock(&self.state);
        Self::check_available(&state)?;
        if state.fail_customer_lookup {
            return Err(store_failure());
        }
        Ok(state.customers.get(&user_id).cloned())
    }

    async fn save_stripe_customer_id(
        &self,
        user_id: UserId,
        customer_id: &CustomerId,
    ) -> Result<UserProfile, RepositoryError> {
        let mut state = lock(&self.state);
        Self::check_available(&state)?;
        if state.fail_customer_save {
            return Err(store_failure());
        }

        if let Some(winner) = state.record_on_save.remove(&user_id) {
            state.customers.insert(user_id, winner);
        }

        let recorded = state
            .customers
            .entry(user_id)
            .or_insert_with(|| customer_id.clone())
            .clone();
        if recorded == *customer_id {
            state.writes.save_customer += 1;
        }

        Ok(UserProfile {
            id: user_id,
            stripe_customer_id: Some(recorded),
        })
    }
}

// =============================================================================
// FakeGateway
// =============================================================================

/// Number of times each [`FakeGateway`] operation was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayCalls {
    pub create_payment_intent: usize,
    pub retrieve_payment_intent: usize,
    pub find_seller_account: usize,
    pub create_customer: usize,
    pub delete_customer: usize,
    pub retrieve_payment_method: usize,
    pub attach_payment_method: usize,
    pub detach_payment_method: usize,
    pub set_default_payment_method: usize,
}

impl GatewayCalls {
    /// Calls across all operations.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.create_payment_intent
            + self.retrieve_payment_intent
            + self.find_seller_account
            + self.create_customer
            + self.delete_customer
            + self.retrieve_payment_method
            + self.attach_payment_method
            + self.detach_payment_method
            + self.set_default_payment_method
    }
}

#[derive(Default)]
struct GatewayState {
    calls: GatewayCalls,
    next_id: usize,
    intents: HashMap<PaymentIntentId, PaymentIntent>,
    intent_params: Vec<CreatePaymentIntent>,
    accounts: Vec<ConnectedAccount>,
    customers: HashMap<CustomerId, Customer>,
    attachments: HashMap<PaymentMethodId, CustomerId>,
    fail_intent_creation: bool,
    fail_account_lookup: bool,
    fail_customer_deletion: bool,
    fail_attach: bool,
    fail_detach: bool,
    fail_set_default: bool,
}

impl GatewayState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_fake_{}", self.next_id)
    }
}

/// Scripted in-memory [`PaymentGateway`].
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<GatewayState>,
}

impl FakeGateway {
    /// Create a gateway with no intents, accounts or customers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls made so far.
    #[must_use]
    pub fn calls(&self) -> GatewayCalls {
        lock(&self.state).calls
    }

    /// Parameters of the most recent intent creation.
    #[must_use]
    pub fn last_intent_params(&self) -> Option<CreatePaymentIntent> {
        lock(&self.state).intent_params.last().cloned()
    }

    /// Register (or overwrite) an intent with the given status.
    pub fn set_intent_status(&self, id: &str, status: PaymentIntentStatus) {
        let Some(id) = PaymentIntentId::new(id) else {
            return;
        };
        let mut state = lock(&self.state);
        let intent = state
            .intents
            .entry(id.clone())
            .or_insert_with(|| PaymentIntent {
                id,
                status: status.clone(),
                amount: 1000,
                currency: "usd".to_string(),
                client_secret: None,
                application_fee_amount: None,
                transfer_data: None,
                metadata: Metadata::new(),
            });
        intent.status = status;
    }

    /// Answer lookups of `requested` with the intent stored as `served`.
    pub fn serve_intent_as(&self, requested: &str, served: &str) {
        let (Some(requested), Some(served)) =
            (PaymentIntentId::new(requested), PaymentIntentId::new(served))
        else {
            return;
        };
        let mut state = lock(&self.state);
        if let Some(intent) = state.intents.get(&served).cloned() {
            state.intents.insert(requested, intent);
        }
    }

    /// Give a seller a connected account.
    pub fn add_seller_account(&self, seller_id: SellerId, account_id: &str) {
        let Some(id) = AccountId::new(account_id) else {
            return;
        };
        lock(&self.state).accounts.push(ConnectedAccount {
            id,
            metadata: Metadata::from([(
                SELLER_ID_METADATA_KEY.to_string(),
                seller_id.to_string(),
            )]),
        });
    }

    /// Register an existing customer.
    pub fn add_customer(&self, id: &CustomerId) {
        lock(&self.state).customers.insert(
            id.clone(),
            Customer {
                id: id.clone(),
                metadata: Metadata::new(),
                invoice_settings: InvoiceSettings::default(),
            },
        );
    }

    /// Metadata of a live customer.
    #[must_use]
    pub fn customer_metadata(&self, id: &CustomerId) -> Option<Metadata> {
        lock(&self.state)
            .customers
            .get(id)
            .map(|customer| customer.metadata.clone())
    }

    /// Default payment method of a live customer.
    #[must_use]
    pub fn default_payment_method(&self, id: &CustomerId) -> Option<PaymentMethodId> {
        lock(&self.state)
            .customers
            .get(id)
            .and_then(|customer| customer.invoice_settings.default_payment_method.clone())
    }

    /// Customer a payment method is attached to.
    #[must_use]
    pub fn attached_customer(&self, id: &PaymentMethodId) -> Option<CustomerId> {
        lock(&self.state).attachments.get(id).cloned()
    }

    /// Number of customers not deleted.
    #[must_use]
    pub fn live_customers(&self) -> usize {
        lock(&self.state).customers.len()
    }

    /// Make intent creation fail.
    pub fn fail_intent_creation(&self) {
        lock(&self.state).fail_intent_creation = true;
    }

    /// Make connected account lookups fail.
    pub fn fail_account_lookup(&self) {
        lock(&self.state).fail_account_lookup = true;
    }

    /// Make customer deletion fail.
    pub fn fail_customer_deletion(&self) {
        lock(&self.state).fail_customer_deletion = true;
    }

    /// Make attaching payment methods fail.
    pub fn fail_attach(&self) {
        lock(&self.state).fail_attach = true;
    }

    /// Make detaching payment methods fail.
    pub fn fail_detach(&self) {
        lock(&self.state).fail_detach = true;
    }

    /// Make setting the default payment method fail.
    pub fn fail_set_default(&self) {
        lock(&self.state).fail_set_default = true;
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_payment_intent(
        &self,
        params: &CreatePaymentIntent,
    ) -> Result<PaymentIntent, GatewayError> {
        let mut state = lock(&self.state);
        state.calls.create_payment_intent += 1;
        if state.fail_intent_creation {
            return Err(gateway_failure(500, "intent creation failed"));
        }

        let Some(id) = PaymentIntentId::new(state.next_id("pi")) else {
            return Err(GatewayError::Parse("empty intent id".to_string()));
        };
        let intent = PaymentIntent {
            client_secret: Some(format!("{id}_secret")),
            id: id.clone(),
            status: PaymentIntentStatus::RequiresPaymentMethod,
            amount: params.amount,
            currency: params.currency.gateway_code().to_string(),
            application_fee_amount: params
                .transfer
                .as_ref()
                .map(|t| t.application_fee_amount),
            transfer_data: params.transfer.as_ref().map(|t| TransferData {
                destination: t.destination.clone(),
            }),
            metadata: params.metadata.clone(),
        };

        state.intent_params.push(params.clone());
        state.intents.insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_payment_intent(
        &self,
        id: &PaymentIntentId,
    ) -> Result<PaymentIntent, GatewayError> {
        let mut state = lock(&self.state);
        state.calls.retrieve_payment_intent += 1;
        state.intents.get(id).cloned().ok_or_else(|| GatewayError::Api {
            status: 404,
            kind: "invalid_request_error".to_string(),
            code: Some("resource_missing".to_string()),
            message: format!("No such payment_intent: '{id}'"),
        })
    }

    async fn find_seller_account(
        &self,
        seller_id: SellerId,
    ) -> Result<Option<ConnectedAccount>, GatewayError> {
        let mut state = lock(&self.state);
        state.calls.find_seller_account += 1;
        if state.fail_account_lookup {
            return Err(gateway_failure(500, "account lookup failed"));
        }

        let wanted = seller_id.to_string();
        Ok(state
            .accounts
            .iter()
            .find(|account| account.metadata.get(SELLER_ID_METADATA_KEY) == Some(&wanted))
            .cloned())
    }

    async fn create_customer(&self, metadata: &Metadata) -> Result<Customer, GatewayError> {
        let mut state = lock(&self.state);
        state.calls.create_customer += 1;

        let Some(id) = CustomerId::new(state.next_id("cus")) else {
            return Err(GatewayError::Parse("empty customer id".to_string()));
        };
        let customer = Customer {
            id: id.clone(),
            metadata: metadata.clone(),
            invoice_settings: InvoiceSettings::default(),
        };
        state.customers.insert(id, customer.clone());
        Ok(customer)
    }

    async fn delete_customer(&self, id: &CustomerId) -> Result<(), GatewayError> {
        let mut state = lock(&self.state);
        state.calls.delete_customer += 1;
        if state.fail_customer_deletion {
            return Err(gateway_failure(500, "customer deletion failed"));
        }
        state.customers.remove(id);
        state.attachments.retain(|_, customer| *customer != *id);
        Ok(())
    }

    async fn retrieve_payment_method(
        &self,
        id: &PaymentMethodId,
    ) -> Result<PaymentMethod, GatewayError> {
        let mut state = lock(&self.state);
        state.calls.retrieve_payment_method += 1;
        Ok(PaymentMethod {
            id: id.clone(),
            customer: state.attachments.get(id).cloned(),
        })
    }

    async fn attach_payment_method(
        &self,
        payment_method_id: &PaymentMethodId,
        customer_id: &CustomerId,
    ) -> Result<(), GatewayError> {
        let mut state = lock(&self.state);
        state.calls.attach_payment_method += 1;
        if state.fail_attach {
            return Err(gateway_failure(402, "card declined"));
        }
        state
            .attachments
            .insert(payment_method_id.clone(), customer_id.clone());
        Ok(())
    }

    async fn detach_payment_method(
        &self,
        payment_method_id: &PaymentMethodId,
    ) -> Result<(), GatewayError> {
        let mut state = lock(&self.state);
        state.calls.detach_payment_method += 1;
        if state.fail_detach {
            return Err(gateway_failure(500, "detach failed"));
        }
        state.attachments.remove(payment_method_id);
        Ok(())
    }

    async fn set_default_payment_method(
        &self,
        customer_id: &CustomerId,
        payment_method_id: &PaymentMethodId,
    ) -> Result<Customer, GatewayError> {
        let mut state = lock(&self.state);
        state.calls.set_default_payment_method += 1;
        if state.fail_set_default {
            return Err(gateway_failure(500, "customer update failed"));
        }

        let customer = state.customers.get_mut(customer_id).ok_or_else(|| GatewayError::Api {
            status: 404,
            kind: "invalid_request_error".to_string(),
            code: Some("resource_missing".to_string()),
            message: format!("No such customer: '{customer_id}'"),
        })?;
        customer.invoice_settings.default_payment_method = Some(payment_method_id.clone());
        Ok(customer.clone())
    }
}
