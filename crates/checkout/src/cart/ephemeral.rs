//! Guest carts held in memory.
//!
//! Guest carts live in a `moka` cache keyed by guest session id. An entry is
//! created on the first mutation and expires after the configured idle TTL.

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::debug;

use danceflow_core::{CartSnapshot, GuestSessionId};

use super::backend::{ApplyOutcome, BackendKind, CartBackend};
use super::mutation::CartWrite;
use crate::error::RemoteError;

/// Shared cache of every guest cart.
#[derive(Clone)]
pub struct GuestCartCache {
    cache: Cache<GuestSessionId, CartSnapshot>,
}

impl GuestCartCache {
    /// Create a cache holding up to `capacity` carts, each kept `ttl` after
    /// its last write.
    #[must_use]
    pub fn new(ttl: Duration, capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_idle(ttl)
            .build();
        Self { cache }
    }

    /// The stored cart of `guest`, if one was ever written.
    pub async fn get(&self, guest: GuestSessionId) -> Option<CartSnapshot> {
        self.cache.get(&guest).await
    }

    async fn put(&self, guest: GuestSessionId, cart: CartSnapshot) {
        self.cache.insert(guest, cart).await;
    }

    async fn evict(&self, guest: GuestSessionId) {
        self.cache.invalidate(&guest).await;
    }
}

impl std::fmt::Debug for GuestCartCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestCartCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

/// Backend for one guest session.
pub struct EphemeralBackend {
    guest: GuestSessionId,
    cache: GuestCartCache,
}

impl EphemeralBackend {
    #[must_use]
    pub const fn new(guest: GuestSessionId, cache: GuestCartCache) -> Self {
        Self { guest, cache }
    }
}

#[async_trait]
impl CartBackend for EphemeralBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Ephemeral
    }

    async fn load(&self) -> Result<CartSnapshot, RemoteError> {
        Ok(self.cache.get(self.guest).await.unwrap_or_default())
    }

    async fn apply(&self, write: &CartWrite, after: &CartSnapshot) -> Result<ApplyOutcome, RemoteError> {
        debug!(guest = %self.guest, write = ?write, "Storing guest cart");
        self.cache.put(self.guest, after.clone()).await;
        Ok(ApplyOutcome::default())
    }

    async fn release(&self) {
        debug!(guest = %self.guest, "Evicting guest cart");
        self.cache.evict(self.guest).await;
    }
}
