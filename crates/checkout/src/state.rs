//! Services shared by every checkout session.

use std::sync::Arc;

use danceflow_core::{GuestSessionId, UserId};

use crate::cart::{CartBackend, EphemeralBackend, GuestCartCache, RemoteBackend};
use crate::config::{CheckoutConfig, CheckoutSettings};
use crate::db::{self, CartRowRepository, PgCartRows, PgPlaceholders, PlaceholderRepository};
use crate::handoff::OrderHandoff;
use crate::reconcile::AttendeeReconciler;
use crate::services::{HttpOrderService, HttpPaymentService, OrderValidationService, PaymentService};

/// Error wiring the production services.
#[derive(Debug, thiserror::Error)]
pub enum ServicesInitError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid service url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Collaborators shared across sessions.
///
/// Cheaply cloneable via `Arc`. Sessions borrow what they need from here and
/// own only their per-session state.
#[derive(Clone)]
pub struct CheckoutServices {
    inner: Arc<CheckoutServicesInner>,
}

struct CheckoutServicesInner {
    settings: CheckoutSettings,
    guest_carts: GuestCartCache,
    cart_rows: Arc<dyn CartRowRepository>,
    placeholders: Arc<dyn PlaceholderRepository>,
    orders: Arc<dyn OrderValidationService>,
    payments: Arc<dyn PaymentService>,
}

impl CheckoutServices {
    /// Assemble services from explicit collaborators.
    #[must_use]
    pub fn new(
        settings: CheckoutSettings,
        cart_rows: Arc<dyn CartRowRepository>,
        placeholders: Arc<dyn PlaceholderRepository>,
        orders: Arc<dyn OrderValidationService>,
        payments: Arc<dyn PaymentService>,
    ) -> Self {
        let guest_carts = GuestCartCache::new(settings.guest_cart_ttl, settings.guest_cart_capacity);
        Self {
            inner: Arc::new(CheckoutServicesInner {
                settings,
                guest_carts,
                cart_rows,
                placeholders,
                orders,
                payments,
            }),
        }
    }

    /// Wire Postgres repositories and HTTP clients from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable or a service URL is
    /// invalid.
    pub async fn from_config(config: CheckoutConfig) -> Result<Self, ServicesInitError> {
        let pool = db::create_pool(&config.database_url).await?;
        let orders = HttpOrderService::new(&config.order_service_url)?;
        let payments = HttpPaymentService::new(&config.payment)?;

        Ok(Self::new(
            config.settings,
            Arc::new(PgCartRows::new(pool.clone())),
            Arc::new(PgPlaceholders::new(pool)),
            Arc::new(orders),
            Arc::new(payments),
        ))
    }

    #[must_use]
    pub fn settings(&self) -> &CheckoutSettings {
        &self.inner.settings
    }

    #[must_use]
    pub fn guest_carts(&self) -> &GuestCartCache {
        &self.inner.guest_carts
    }

    #[must_use]
    pub fn placeholders(&self) -> &dyn PlaceholderRepository {
        self.inner.placeholders.as_ref()
    }

    /// Cart backend for a guest session.
    #[must_use]
    pub fn guest_backend(&self, guest: GuestSessionId) -> Box<dyn CartBackend> {
        Box::new(EphemeralBackend::new(guest, self.inner.guest_carts.clone()))
    }

    /// Cart backend for a signed-in user.
    #[must_use]
    pub fn user_backend(&self, user: UserId) -> Box<dyn CartBackend> {
        Box::new(RemoteBackend::new(user, self.inner.cart_rows.clone()))
    }

    #[must_use]
    pub fn handoff(&self) -> OrderHandoff<'_> {
        OrderHandoff::new(
            self.inner.orders.as_ref(),
            self.inner.payments.as_ref(),
            &self.inner.settings,
        )
    }

    #[must_use]
    pub fn reconciler(&self) -> AttendeeReconciler<'_> {
        AttendeeReconciler::new(self.inner.placeholders.as_ref())
    }
}
