//! Per-session checkout context.
//!
//! A [`CheckoutSession`] is created when a visitor starts browsing (guest) or
//! signs in, and disposed when they sign out. It owns the session's cart store,
//! wizard and handoff record; everything shared lives in
//! [`CheckoutServices`].

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, instrument};

use danceflow_core::{
    AttendeeSlot, CartKey, CartSnapshot, ContactDetails, GuestSessionId, ProductRef, TicketTypeRef,
};

use crate::cart::{CartStore, MergeReport};
use crate::error::{CheckoutError, Result};
use crate::handoff::{HandoffRedirect, KeyValueStore, PendingCheckoutStore};
use crate::pricing::{CartTotals, PriceEngine};
use crate::reconcile::ReconcileReport;
use crate::services::auth::{AuthError, AuthSession, Identity};
use crate::state::CheckoutServices;
use crate::wizard::{CheckoutWizard, WizardStep};

/// One visitor's cart and checkout flow.
pub struct CheckoutSession {
    services: CheckoutServices,
    cart: CartStore,
    wizard: CheckoutWizard,
    pending: PendingCheckoutStore,
    auth: Option<Arc<dyn AuthSession>>,
    identity: Option<Identity>,
}

impl CheckoutSession {
    /// Open a session for an anonymous visitor.
    #[instrument(skip(services, handoff))]
    pub async fn open_guest(
        services: CheckoutServices,
        guest: GuestSessionId,
        handoff: Arc<dyn KeyValueStore>,
    ) -> Self {
        let mut cart = CartStore::new(services.guest_backend(guest));
        cart.load().await;
        Self {
            services,
            cart,
            wizard: CheckoutWizard::new(),
            pending: PendingCheckoutStore::new(handoff),
            auth: None,
            identity: None,
        }
    }

    /// Open a session for a signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SignInRequired` if `auth` has no identity.
    #[instrument(skip_all)]
    pub async fn open_authenticated(
        services: CheckoutServices,
        auth: Arc<dyn AuthSession>,
        handoff: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let identity = auth.identity().ok_or(AuthError::SignInRequired)?;
        let mut cart = CartStore::new(services.user_backend(identity.user_id));
        cart.load().await;
        info!(user_id = %identity.user_id, "Checkout session opened");
        Ok(Self {
            services,
            cart,
            wizard: CheckoutWizard::new(),
            pending: PendingCheckoutStore::new(handoff),
            auth: Some(auth),
            identity: Some(identity),
        })
    }

    /// Sign the visitor in, carrying the guest cart over according to the
    /// configured [`SignInPolicy`](crate::cart::SignInPolicy).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SignInRequired` if `auth` has no identity. The
    /// guest session is consumed either way.
    #[instrument(skip_all)]
    pub async fn sign_in(self, auth: Arc<dyn AuthSession>) -> Result<(Self, MergeReport)> {
        let identity = auth.identity().ok_or(AuthError::SignInRequired)?;
        let remote = self.services.user_backend(identity.user_id);
        let policy = self.services.settings().sign_in_policy;

        let (cart, report) = self.cart.into_authenticated(remote, policy).await;
        let mut wizard = self.wizard;
        wizard.sync_attendees(&cart.snapshot());

        info!(user_id = %identity.user_id, policy = ?policy, "Signed in");
        Ok((
            Self {
                services: self.services,
                cart,
                wizard,
                pending: self.pending,
                auth: Some(auth),
                identity: Some(identity),
            },
            report,
        ))
    }

    /// End the session. The remote cart stays; nothing else survives.
    pub fn sign_out(self) {
        if let Some(identity) = &self.identity {
            info!(user_id = %identity.user_id, "Checkout session closed");
        }
    }

    #[must_use]
    pub const fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn is_member(&self) -> bool {
        self.identity.as_ref().is_some_and(|i| i.is_member)
    }

    // -------------------------------------------------------------------------
    // Cart
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn cart(&self) -> CartSnapshot {
        self.cart.snapshot()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartSnapshot> {
        self.cart.subscribe()
    }

    #[must_use]
    pub fn totals(&self) -> CartTotals {
        PriceEngine::new(self.is_member()).totals(&self.cart.snapshot())
    }

    /// Reload the cart from its backend.
    pub async fn reload(&mut self) -> CartSnapshot {
        let cart = self.cart.load().await;
        self.wizard.sync_attendees(&cart);
        cart
    }

    /// # Errors
    ///
    /// See [`CartStore::add_product`].
    pub async fn add_product(
        &mut self,
        product: ProductRef,
        quantity: u32,
        variant: Option<String>,
    ) -> Result<CartSnapshot> {
        let result = self.cart.add_product(product, quantity, variant).await;
        self.after_cart_change(result)
    }

    /// # Errors
    ///
    /// See [`CartStore::add_ticket`].
    pub async fn add_ticket(&mut self, ticket: TicketTypeRef, quantity: u32) -> Result<CartSnapshot> {
        let result = self.cart.add_ticket(ticket, quantity).await;
        self.after_cart_change(result)
    }

    /// # Errors
    ///
    /// See [`CartStore::remove_line`].
    pub async fn remove_line(&mut self, key: &CartKey) -> Result<CartSnapshot> {
        let result = self.cart.remove_line(key).await;
        self.after_cart_change(result)
    }

    /// # Errors
    ///
    /// See [`CartStore::set_quantity`].
    pub async fn set_quantity(&mut self, key: &CartKey, quantity: u32) -> Result<CartSnapshot> {
        let result = self.cart.set_quantity(key, quantity).await;
        self.after_cart_change(result)
    }

    /// # Errors
    ///
    /// See [`CartStore::clear`].
    pub async fn clear(&mut self) -> Result<CartSnapshot> {
        let result = self.cart.clear().await;
        self.after_cart_change(result)
    }

    fn after_cart_change(&mut self, result: Result<CartSnapshot>) -> Result<CartSnapshot> {
        self.wizard.sync_attendees(&self.cart.snapshot());
        if let Err(err) = &result {
            err.report();
            self.wizard.set_message(err.user_message());
        }
        result
    }

    // -------------------------------------------------------------------------
    // Wizard
    // -------------------------------------------------------------------------

    #[must_use]
    pub const fn step(&self) -> WizardStep {
        self.wizard.step()
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.wizard.message()
    }

    #[must_use]
    pub fn attendees(&self) -> &[AttendeeSlot] {
        self.wizard.attendees()
    }

    pub fn attendee_mut(&mut self, index: usize) -> Option<&mut AttendeeSlot> {
        self.wizard.attendee_mut(index)
    }

    pub const fn contact_mut(&mut self) -> &mut ContactDetails {
        self.wizard.contact_mut()
    }

    /// # Errors
    ///
    /// See [`CheckoutWizard::advance`].
    pub fn advance(&mut self) -> Result<WizardStep> {
        Ok(self.wizard.advance(&self.cart.snapshot())?)
    }

    pub fn back(&mut self) -> WizardStep {
        self.wizard.back(&self.cart.snapshot())
    }

    /// Validate the wizard and hand off to payment.
    ///
    /// On failure the cart is untouched and the message is shown on the
    /// current step.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SignInRequired` for a guest, or any error of
    /// [`OrderHandoff::submit`](crate::handoff::OrderHandoff::submit).
    #[instrument(skip(self))]
    pub async fn submit(&mut self) -> Result<HandoffRedirect> {
        let result = self.try_submit().await;
        if let Err(err) = &result {
            err.report();
            self.wizard.set_message(err.user_message());
        }
        result
    }

    async fn try_submit(&mut self) -> Result<HandoffRedirect> {
        let auth = self.auth.clone().ok_or(AuthError::SignInRequired)?;
        let cart = self.cart.snapshot();
        self.wizard.validate_submit(&cart)?;

        let redirect = self
            .services
            .handoff()
            .submit(
                auth.as_ref(),
                &mut self.cart,
                self.wizard.attendees(),
                self.wizard.contact(),
                &self.pending,
                Utc::now(),
            )
            .await?;

        self.wizard = CheckoutWizard::new();
        Ok(redirect)
    }

    // -------------------------------------------------------------------------
    // After payment
    // -------------------------------------------------------------------------

    /// Bind the attendees of the pending checkout to their tickets.
    ///
    /// # Errors
    ///
    /// Returns `NoPendingCheckout` without a handoff record, and the errors of
    /// [`AttendeeReconciler::reconcile`](crate::reconcile::AttendeeReconciler::reconcile).
    #[instrument(skip(self))]
    pub async fn resume_after_payment(&mut self) -> Result<ReconcileReport> {
        let identity = self.identity.as_ref().ok_or(AuthError::SignInRequired)?;
        self.services
            .reconciler()
            .reconcile(identity.user_id, &self.pending)
            .await
            .inspect_err(CheckoutError::report)
    }

    /// Re-run reconciliation for attendees left unassigned by an earlier run.
    ///
    /// # Errors
    ///
    /// See [`resume_after_payment`](Self::resume_after_payment).
    pub async fn retry_reconciliation(&mut self) -> Result<ReconcileReport> {
        self.resume_after_payment().await
    }
}
