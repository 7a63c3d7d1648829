//! In-memory fakes of every external collaborator.
//!
//! Enabled with the `testing` feature. Each fake can be told to fail so tests
//! can drive the rollback, degradation and partial-failure paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::Mutex;

use danceflow_core::{
    AttendeeDetails, CartKey, CartRowId, CartSnapshot, EventTicketTypeId, LineItem, OrderId,
    PlaceholderAttendee, PlaceholderId, Price, TicketLineItem, UnitCorrelationId, UserId,
};

use crate::db::{CartRowRepository, PlaceholderRepository, RepositoryError};
use crate::error::{CheckoutError, ValidationError, ValidationReason};
use crate::handoff::{HandoffStoreError, KeyValueStore};
use crate::services::{
    AuthError, AuthSession, Identity, OrderRequest, OrderValidationService, PaymentCheckoutRequest,
    PaymentService, ValidatedItem, ValidatedOrder,
};

fn injected() -> RepositoryError {
    RepositoryError::Conflict("injected failure".to_string())
}

// =============================================================================
// Cart rows
// =============================================================================

/// Cart rows kept in memory.
#[derive(Default)]
pub struct MemoryCartRows {
    carts: Mutex<HashMap<UserId, CartSnapshot>>,
    next_id: AtomicI32,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    writes: AtomicUsize,
    write_delay_ms: AtomicU64,
}

impl MemoryCartRows {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// What is stored for `user`.
    pub async fn snapshot(&self, user: UserId) -> CartSnapshot {
        self.carts.lock().await.get(&user).cloned().unwrap_or_default()
    }

    /// Make every subsequent write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent read fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Delay every write, to exercise cancellation.
    pub fn set_write_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.write_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of write calls received, failed ones included.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn begin_write(&self) -> Result<(), RepositoryError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(injected());
        }
        Ok(())
    }

    fn next_row_id(&self) -> CartRowId {
        CartRowId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl CartRowRepository for MemoryCartRows {
    async fn load(&self, user: UserId) -> Result<CartSnapshot, RepositoryError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected());
        }
        Ok(self.snapshot(user).await)
    }

    async fn upsert_product(&self, user: UserId, line: &LineItem) -> Result<CartRowId, RepositoryError> {
        self.begin_write().await?;
        let mut carts = self.carts.lock().await;
        let cart = carts.entry(user).or_default();
        if let Some(existing) = cart.lines.iter_mut().find(|l| l.key() == line.key()) {
            existing.quantity = line.quantity;
            existing.product = line.product.clone();
            return existing.server_row_id.ok_or(RepositoryError::NotFound);
        }
        let id = self.next_row_id();
        cart.lines.push(LineItem {
            server_row_id: Some(id),
            ..line.clone()
        });
        Ok(id)
    }

    async fn upsert_ticket(
        &self,
        user: UserId,
        line: &TicketLineItem,
    ) -> Result<CartRowId, RepositoryError> {
        self.begin_write().await?;
        let mut carts = self.carts.lock().await;
        let cart = carts.entry(user).or_default();
        if let Some(existing) = cart
            .tickets
            .iter_mut()
            .find(|t| t.ticket_type.id == line.ticket_type.id)
        {
            existing.quantity = line.quantity;
            existing.ticket_type = line.ticket_type.clone();
            return existing.server_row_id.ok_or(RepositoryError::NotFound);
        }
        let id = self.next_row_id();
        cart.tickets.push(TicketLineItem {
            server_row_id: Some(id),
            ..line.clone()
        });
        Ok(id)
    }

    async fn delete(&self, user: UserId, key: &CartKey) -> Result<(), RepositoryError> {
        self.begin_write().await?;
        if let Some(cart) = self.carts.lock().await.get_mut(&user) {
            match key {
                CartKey::Ticket(id) => cart.tickets.retain(|t| t.ticket_type.id != *id),
                CartKey::Product { .. } => cart.lines.retain(|l| l.key() != *key),
            }
        }
        Ok(())
    }

    async fn clear(&self, user: UserId) -> Result<(), RepositoryError> {
        self.begin_write().await?;
        self.carts.lock().await.remove(&user);
        Ok(())
    }
}

// =============================================================================
// Placeholders
// =============================================================================

struct StoredPlaceholder {
    record: PlaceholderAttendee,
    details: Option<AttendeeDetails>,
}

/// Placeholder attendee records kept in memory.
#[derive(Default)]
pub struct MemoryPlaceholders {
    records: Mutex<Vec<StoredPlaceholder>>,
    next_id: AtomicI32,
    fail_once: Mutex<HashSet<PlaceholderId>>,
    fail_reads: AtomicBool,
}

impl MemoryPlaceholders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an unassigned placeholder, as the order system would.
    pub async fn insert(
        &self,
        user: UserId,
        ticket_type: EventTicketTypeId,
        created_at: DateTime<Utc>,
        correlation_id: Option<UnitCorrelationId>,
    ) -> PlaceholderId {
        let id = PlaceholderId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.records.lock().await.push(StoredPlaceholder {
            record: PlaceholderAttendee {
                id,
                user_id: user,
                ticket_type_id: ticket_type,
                created_at,
                correlation_id,
            },
            details: None,
        });
        id
    }

    /// Attendee details written onto placeholder `id`, if any.
    pub async fn assigned(&self, id: PlaceholderId) -> Option<AttendeeDetails> {
        self.records
            .lock()
            .await
            .iter()
            .find(|p| p.record.id == id)
            .and_then(|p| p.details.clone())
    }

    /// Placeholders of `user` still waiting for attendee details.
    pub async fn unassigned_count(&self, user: UserId) -> usize {
        self.records
            .lock()
            .await
            .iter()
            .filter(|p| p.record.user_id == user && p.details.is_none())
            .count()
    }

    /// Make the next assignment of `id` fail.
    pub async fn fail_assign_once(&self, id: PlaceholderId) {
        self.fail_once.lock().await.insert(id);
    }

    /// Make every subsequent read fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PlaceholderRepository for MemoryPlaceholders {
    async fn unassigned(
        &self,
        user: UserId,
        ticket_types: &[EventTicketTypeId],
    ) -> Result<Vec<PlaceholderAttendee>, RepositoryError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected());
        }
        let mut open: Vec<PlaceholderAttendee> = self
            .records
            .lock()
            .await
            .iter()
            .filter(|p| {
                p.record.user_id == user
                    && p.details.is_none()
                    && ticket_types.contains(&p.record.ticket_type_id)
            })
            .map(|p| p.record.clone())
            .collect();
        open.sort_by_key(|p| (p.created_at, p.id));
        Ok(open)
    }

    async fn assign(&self, id: PlaceholderId, details: &AttendeeDetails) -> Result<(), RepositoryError> {
        if self.fail_once.lock().await.remove(&id) {
            return Err(injected());
        }
        let mut records = self.records.lock().await;
        match records.iter_mut().find(|p| p.record.id == id) {
            Some(stored) if stored.details.is_none() => {
                stored.details = Some(details.clone());
                Ok(())
            }
            _ => Err(RepositoryError::Conflict(format!(
                "placeholder {id} is missing or already assigned"
            ))),
        }
    }
}

// =============================================================================
// Order service
// =============================================================================

/// A canned order-service failure.
#[derive(Debug, Clone)]
pub enum StubFailure {
    Rejected(Vec<ValidationReason>),
    Unauthorized,
    Unavailable(String),
}

impl From<StubFailure> for CheckoutError {
    fn from(failure: StubFailure) -> Self {
        match failure {
            StubFailure::Rejected(reasons) => ValidationError::Rejected { reasons }.into(),
            StubFailure::Unauthorized => AuthError::SessionExpired.into(),
            StubFailure::Unavailable(message) => Self::ExternalService(message),
        }
    }
}

/// Order service that accepts every request and, when wired to placeholders,
/// creates one placeholder per ticket unit.
pub struct StubOrderService {
    next_order_id: AtomicI32,
    placeholders: Option<(Arc<MemoryPlaceholders>, UserId)>,
    echo_unit_ids: bool,
    failure: Mutex<Option<StubFailure>>,
    requests: Mutex<Vec<OrderRequest>>,
}

impl Default for StubOrderService {
    fn default() -> Self {
        Self::new()
    }
}

impl StubOrderService {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_order_id: AtomicI32::new(1000),
            placeholders: None,
            echo_unit_ids: false,
            failure: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create placeholders for `user` on every order. With `echo_unit_ids`
    /// each placeholder carries the unit id of its slot.
    #[must_use]
    pub fn with_placeholders(
        mut self,
        placeholders: Arc<MemoryPlaceholders>,
        user: UserId,
        echo_unit_ids: bool,
    ) -> Self {
        self.placeholders = Some((placeholders, user));
        self.echo_unit_ids = echo_unit_ids;
        self
    }

    /// Fail the next call.
    pub async fn fail_next(&self, failure: StubFailure) {
        *self.failure.lock().await = Some(failure);
    }

    /// Every request received so far.
    pub async fn requests(&self) -> Vec<OrderRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl OrderValidationService for StubOrderService {
    async fn validate_and_create_order(
        &self,
        request: &OrderRequest,
        _access_token: &SecretString,
    ) -> Result<ValidatedOrder, CheckoutError> {
        self.requests.lock().await.push(request.clone());
        if let Some(failure) = self.failure.lock().await.take() {
            return Err(failure.into());
        }

        let mut validated_items: Vec<ValidatedItem> = request
            .product_items
            .iter()
            .map(|item| ValidatedItem {
                name: format!("Product {}", item.product_id),
                unit_amount: item.unit_price,
                quantity: item.quantity,
                product_id: Some(item.product_id),
                event_ticket_type_id: None,
            })
            .collect();
        validated_items.extend(request.ticket_items.iter().map(|item| ValidatedItem {
            name: format!("Ticket {}", item.event_ticket_type_id),
            unit_amount: item.unit_price,
            quantity: item.quantity,
            product_id: None,
            event_ticket_type_id: Some(item.event_ticket_type_id),
        }));
        let total_amount: Price = validated_items
            .iter()
            .map(|item| item.unit_amount.times(item.quantity))
            .sum();

        if let Some((placeholders, user)) = &self.placeholders {
            let base = Utc::now();
            let mut offset = 0;
            for item in &request.ticket_items {
                let slots = request
                    .attendees_by_ticket_type
                    .get(&item.event_ticket_type_id)
                    .map_or(&[][..], Vec::as_slice);
                for unit in 0..item.quantity {
                    let correlation = if self.echo_unit_ids {
                        usize::try_from(unit)
                            .ok()
                            .and_then(|unit| slots.get(unit))
                            .map(|slot| slot.unit_id)
                    } else {
                        None
                    };
                    offset += 1;
                    placeholders
                        .insert(
                            *user,
                            item.event_ticket_type_id,
                            base + chrono::Duration::milliseconds(offset),
                            correlation,
                        )
                        .await;
                }
            }
        }

        Ok(ValidatedOrder {
            order_id: OrderId::new(self.next_order_id.fetch_add(1, Ordering::SeqCst)),
            total_amount,
            validated_items,
        })
    }
}

// =============================================================================
// Payment service
// =============================================================================

/// Payment service returning a fake hosted-checkout URL.
#[derive(Default)]
pub struct StubPaymentService {
    fail: AtomicBool,
    requests: Mutex<Vec<PaymentCheckoutRequest>>,
}

impl StubPaymentService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail.
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn requests(&self) -> Vec<PaymentCheckoutRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl PaymentService for StubPaymentService {
    async fn create_checkout(&self, request: &PaymentCheckoutRequest) -> Result<String, CheckoutError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CheckoutError::ExternalService(
                "Card payments are temporarily unavailable".to_string(),
            ));
        }
        let mut requests = self.requests.lock().await;
        requests.push(request.clone());
        Ok(format!("https://pay.example/checkout/{}", requests.len()))
    }
}

// =============================================================================
// Auth session
// =============================================================================

/// Auth session with a controllable clock.
pub struct FakeAuthSession {
    identity: Option<Identity>,
    expires_at: std::sync::Mutex<Option<DateTime<Utc>>>,
    refreshed_expiry: Option<DateTime<Utc>>,
    fail_refresh: AtomicBool,
    refreshes: AtomicUsize,
}

impl FakeAuthSession {
    /// A session for `user` valid for the next hour.
    #[must_use]
    pub fn signed_in(user: UserId, is_member: bool) -> Self {
        Self {
            identity: Some(Identity {
                user_id: user,
                is_member,
            }),
            expires_at: std::sync::Mutex::new(Some(Utc::now() + chrono::Duration::hours(1))),
            refreshed_expiry: None,
            fail_refresh: AtomicBool::new(false),
            refreshes: AtomicUsize::new(0),
        }
    }

    /// A session without an identity.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            identity: None,
            expires_at: std::sync::Mutex::new(None),
            refreshed_expiry: None,
            fail_refresh: AtomicBool::new(false),
            refreshes: AtomicUsize::new(0),
        }
    }

    /// Set the current token expiry.
    #[must_use]
    pub fn expiring_at(self, at: DateTime<Utc>) -> Self {
        *self.expires_at.lock().unwrap_or_else(PoisonError::into_inner) = Some(at);
        self
    }

    /// Expiry a refresh moves the token to. Defaults to one hour from now.
    #[must_use]
    pub fn refreshing_to(mut self, at: DateTime<Utc>) -> Self {
        self.refreshed_expiry = Some(at);
        self
    }

    /// Make refreshes fail.
    pub fn fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthSession for FakeAuthSession {
    fn identity(&self) -> Option<Identity> {
        self.identity.clone()
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        *self.expires_at.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn access_token(&self) -> Option<SecretString> {
        self.identity
            .as_ref()
            .map(|identity| SecretString::from(format!("token-{}", identity.user_id)))
    }

    async fn refresh(&self) -> Result<(), AuthError> {
        if self.identity.is_none() {
            return Err(AuthError::SignInRequired);
        }
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(AuthError::RefreshFailed("injected failure".to_string()));
        }
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let next = self
            .refreshed_expiry
            .unwrap_or_else(|| Utc::now() + chrono::Duration::hours(1));
        *self.expires_at.lock().unwrap_or_else(PoisonError::into_inner) = Some(next);
        Ok(())
    }
}

// =============================================================================
// Handoff storage
// =============================================================================

/// Key/value store that rejects every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingKeyValueStore;

#[async_trait]
impl KeyValueStore for FailingKeyValueStore {
    async fn get(&self, _key: &str) -> Result<Option<Value>, HandoffStoreError> {
        Err(HandoffStoreError::Storage("store offline".to_string()))
    }

    async fn insert(&self, _key: &str, _value: Value) -> Result<(), HandoffStoreError> {
        Err(HandoffStoreError::Storage("store offline".to_string()))
    }

    async fn remove(&self, _key: &str) -> Result<(), HandoffStoreError> {
        Err(HandoffStoreError::Storage("store offline".to_string()))
    }
}
