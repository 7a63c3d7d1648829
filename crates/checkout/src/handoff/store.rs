//! Durable handoff storage.
//!
//! The handoff record is stored as plain JSON entries under fixed keys, so any
//! key/value store that survives a browser redirect can hold it. Production
//! uses the server-side session; tests and the CLI use [`MemoryKeyValueStore`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tower_sessions::Session;
use tracing::debug;

use danceflow_core::{
    AttendeeSlot, OrderId, PendingCheckout, PlaceholderClaim, TicketLineItem, UnitCorrelationId,
};

/// Keys of the handoff record.
pub mod keys {
    /// Order created at handoff.
    pub const PENDING_ORDER_ID: &str = "pendingOrderId";

    /// Ticket lines as they were when the order was created.
    pub const PENDING_TICKET_ITEMS: &str = "pendingTicketItems";

    /// Attendee slots in allocation order.
    pub const PENDING_ATTENDEES: &str = "pendingAttendees";

    /// Units already written onto placeholder records.
    pub const PENDING_BOUND_UNITS: &str = "pendingBoundUnits";

    /// Placeholders claimed for units ahead of their writes.
    pub const PENDING_CLAIMS: &str = "pendingClaims";
}

/// Failure of the handoff store.
#[derive(Debug, Error)]
pub enum HandoffStoreError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Some entries of the record exist and others are missing.
    #[error("incomplete handoff record: missing {0}")]
    Incomplete(&'static str),
}

impl From<tower_sessions::session::Error> for HandoffStoreError {
    fn from(err: tower_sessions::session::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Minimal key/value storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, HandoffStoreError>;
    async fn insert(&self, key: &str, value: Value) -> Result<(), HandoffStoreError>;
    async fn remove(&self, key: &str) -> Result<(), HandoffStoreError>;
}

#[async_trait]
impl KeyValueStore for Session {
    async fn get(&self, key: &str) -> Result<Option<Value>, HandoffStoreError> {
        Ok(self.get_value(key).await?)
    }

    async fn insert(&self, key: &str, value: Value) -> Result<(), HandoffStoreError> {
        self.insert_value(key, value).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), HandoffStoreError> {
        self.remove_value(key).await?;
        Ok(())
    }
}

/// In-process key/value store.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<Mutex<HashMap<String, Value>>>,
}

impl MemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, HandoffStoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn insert(&self, key: &str, value: Value) -> Result<(), HandoffStoreError> {
        self.entries.lock().await.insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), HandoffStoreError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// Typed access to the handoff record.
#[derive(Clone)]
pub struct PendingCheckoutStore {
    kv: Arc<dyn KeyValueStore>,
}

impl PendingCheckoutStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Read the record, if one was written.
    ///
    /// # Errors
    ///
    /// Returns `Incomplete` when the order id exists without its ticket lines or
    /// attendees, and `Serialization` for entries that do not decode.
    pub async fn load(&self) -> Result<Option<PendingCheckout>, HandoffStoreError> {
        let Some(order_id) = self.kv.get(keys::PENDING_ORDER_ID).await? else {
            return Ok(None);
        };
        let order_id: OrderId = serde_json::from_value(order_id)?;

        let ticket_items: Vec<TicketLineItem> = serde_json::from_value(
            self.kv
                .get(keys::PENDING_TICKET_ITEMS)
                .await?
                .ok_or(HandoffStoreError::Incomplete(keys::PENDING_TICKET_ITEMS))?,
        )?;
        let attendees: Vec<AttendeeSlot> = serde_json::from_value(
            self.kv
                .get(keys::PENDING_ATTENDEES)
                .await?
                .ok_or(HandoffStoreError::Incomplete(keys::PENDING_ATTENDEES))?,
        )?;
        let bound_units: Vec<UnitCorrelationId> = match self.kv.get(keys::PENDING_BOUND_UNITS).await? {
            Some(value) => serde_json::from_value(value)?,
            None => Vec::new(),
        };
        let claims: Vec<PlaceholderClaim> = match self.kv.get(keys::PENDING_CLAIMS).await? {
            Some(value) => serde_json::from_value(value)?,
            None => Vec::new(),
        };

        Ok(Some(PendingCheckout {
            order_id,
            ticket_items,
            attendees,
            bound_units,
            claims,
        }))
    }

    /// Write the full record. The order id goes last, so a record is only
    /// visible once all its entries exist.
    ///
    /// # Errors
    ///
    /// Returns the storage failure.
    pub async fn save(&self, pending: &PendingCheckout) -> Result<(), HandoffStoreError> {
        self.kv
            .insert(keys::PENDING_TICKET_ITEMS, serde_json::to_value(&pending.ticket_items)?)
            .await?;
        self.kv
            .insert(keys::PENDING_ATTENDEES, serde_json::to_value(&pending.attendees)?)
            .await?;
        self.record_progress(pending).await?;
        self.kv
            .insert(keys::PENDING_ORDER_ID, serde_json::to_value(pending.order_id)?)
            .await?;
        debug!(order_id = %pending.order_id, "Handoff record saved");
        Ok(())
    }

    /// Replace the reconciliation progress of the record: its claims, then
    /// its bound units.
    ///
    /// # Errors
    ///
    /// Returns the storage failure.
    pub async fn record_progress(&self, pending: &PendingCheckout) -> Result<(), HandoffStoreError> {
        self.kv
            .insert(keys::PENDING_CLAIMS, serde_json::to_value(&pending.claims)?)
            .await?;
        self.kv
            .insert(keys::PENDING_BOUND_UNITS, serde_json::to_value(&pending.bound_units)?)
            .await
    }

    /// Delete the record. The order id goes first, so a half-deleted record
    /// reads as absent.
    ///
    /// # Errors
    ///
    /// Returns the storage failure.
    pub async fn delete(&self) -> Result<(), HandoffStoreError> {
        self.kv.remove(keys::PENDING_ORDER_ID).await?;
        self.kv.remove(keys::PENDING_TICKET_ITEMS).await?;
        self.kv.remove(keys::PENDING_ATTENDEES).await?;
        self.kv.remove(keys::PENDING_BOUND_UNITS).await?;
        self.kv.remove(keys::PENDING_CLAIMS).await?;
        debug!("Handoff record deleted");
        Ok(())
    }
}
