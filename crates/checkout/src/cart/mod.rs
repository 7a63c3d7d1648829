//! The cart store.
//!
//! [`CartStore`] owns the local snapshot of one session's cart and mirrors every
//! change to its backend:
//!
//! 1. The mutation is validated and applied to a copy of the snapshot.
//! 2. The copy is published to subscribers immediately.
//! 3. The paired backend write is issued.
//! 4. If the write fails, the pre-mutation snapshot is restored exactly.
//!
//! Nothing is retried. Mutations take `&mut self`, so two operations on the
//! same store never interleave.

mod backend;
mod ephemeral;
mod mutation;
mod remote;

pub use backend::{ApplyOutcome, BackendKind, CartBackend};
pub use ephemeral::{EphemeralBackend, GuestCartCache};
pub use mutation::{CartItemRef, CartMutation, CartWrite};
pub use remote::RemoteBackend;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use danceflow_core::{
    CartKey, CartRowId, CartSnapshot, EventTicketTypeId, ProductRef, TicketTypeRef,
};

use crate::error::{CheckoutError, Result, add_breadcrumb};

/// What happens to a guest cart when the visitor signs in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignInPolicy {
    /// Fold guest lines into the remote cart.
    #[default]
    Merge,
    /// Reload the remote cart and drop the guest cart.
    Discard,
}

/// Outcome of folding a guest cart into a remote one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Guest lines added to the remote cart.
    pub merged: Vec<CartKey>,
    /// Remote lines whose quantity was raised to the guest quantity.
    pub raised: Vec<CartKey>,
    /// Guest lines that could not be written.
    pub failed: Vec<CartKey>,
}

impl MergeReport {
    /// Whether every guest line made it into the remote cart.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Restores the captured snapshot unless disarmed.
///
/// Covers both a failed write and a mutation future dropped mid-flight.
struct RollbackGuard<'a> {
    sender: &'a watch::Sender<CartSnapshot>,
    before: Option<CartSnapshot>,
}

impl<'a> RollbackGuard<'a> {
    const fn new(sender: &'a watch::Sender<CartSnapshot>, before: CartSnapshot) -> Self {
        Self {
            sender,
            before: Some(before),
        }
    }

    fn disarm(mut self) {
        self.before = None;
    }
}

impl Drop for RollbackGuard<'_> {
    fn drop(&mut self) {
        if let Some(before) = self.before.take() {
            self.sender.send_replace(before);
        }
    }
}

/// One session's cart.
pub struct CartStore {
    backend: Box<dyn CartBackend>,
    snapshot: watch::Sender<CartSnapshot>,
}

impl CartStore {
    /// Create a store over `backend` with an empty snapshot. Call
    /// [`load`](Self::load) to read what the backend holds.
    #[must_use]
    pub fn new(backend: Box<dyn CartBackend>) -> Self {
        let (snapshot, _) = watch::channel(CartSnapshot::empty());
        Self { backend, snapshot }
    }

    /// The backend kind chosen for this session.
    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// A copy of the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receive every published snapshot, optimistic ones and rollbacks included.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartSnapshot> {
        self.snapshot.subscribe()
    }

    /// Refresh the snapshot from the backend.
    ///
    /// A failed read is logged and the current snapshot is kept.
    #[instrument(skip(self), fields(backend = %self.backend.kind()))]
    pub async fn load(&mut self) -> CartSnapshot {
        match self.backend.load().await {
            Ok(cart) => {
                debug!(items = cart.item_count(), "Cart loaded");
                self.snapshot.send_replace(cart);
            }
            Err(e) => warn!(error = %e, "Cart load failed; keeping current cart"),
        }
        self.snapshot()
    }

    /// Add `quantity` units of a product, merging into an existing line.
    ///
    /// # Errors
    ///
    /// Returns a validation error for zero quantity, or `RemoteWrite` after
    /// rolling back if the backend rejects the write.
    pub async fn add_product(
        &mut self,
        product: ProductRef,
        quantity: u32,
        variant: Option<String>,
    ) -> Result<CartSnapshot> {
        self.apply(CartMutation::Add {
            item: CartItemRef::Product(product),
            quantity,
            variant,
        })
        .await
    }

    /// Add `quantity` units of a ticket type, merging into an existing line.
    ///
    /// # Errors
    ///
    /// See [`add_product`](Self::add_product).
    pub async fn add_ticket(&mut self, ticket: TicketTypeRef, quantity: u32) -> Result<CartSnapshot> {
        self.apply(CartMutation::Add {
            item: CartItemRef::Ticket(ticket),
            quantity,
            variant: None,
        })
        .await
    }

    /// Add a line of either kind.
    ///
    /// # Errors
    ///
    /// See [`add_product`](Self::add_product).
    pub async fn add_line(
        &mut self,
        item: CartItemRef,
        quantity: u32,
        variant: Option<String>,
    ) -> Result<CartSnapshot> {
        self.apply(CartMutation::Add {
            item,
            quantity,
            variant,
        })
        .await
    }

    /// Remove the line under `key`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownLine` for a missing key, or `RemoteWrite` after rolling
    /// back.
    pub async fn remove_line(&mut self, key: &CartKey) -> Result<CartSnapshot> {
        self.apply(CartMutation::Remove(key.clone())).await
    }

    /// Set the quantity of the line under `key`. Zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns `UnknownLine` for a missing key, or `RemoteWrite` after rolling
    /// back.
    pub async fn set_quantity(&mut self, key: &CartKey, quantity: u32) -> Result<CartSnapshot> {
        self.apply(CartMutation::SetQuantity {
            key: key.clone(),
            quantity,
        })
        .await
    }

    /// Remove every line.
    ///
    /// # Errors
    ///
    /// Returns `RemoteWrite` after rolling back.
    pub async fn clear(&mut self) -> Result<CartSnapshot> {
        self.apply(CartMutation::Clear).await
    }

    /// Run one mutation through the optimistic write path.
    ///
    /// # Errors
    ///
    /// Local validation failures are returned before the backend is touched.
    /// Backend failures restore the pre-mutation snapshot and are returned as
    /// `CheckoutError::RemoteWrite`.
    #[instrument(skip(self, mutation), fields(op = mutation.label(), backend = %self.backend.kind()))]
    pub async fn apply(&mut self, mutation: CartMutation) -> Result<CartSnapshot> {
        let before = self.snapshot();
        let mut after = before.clone();
        let write = mutation.apply_to(&mut after)?;

        add_breadcrumb("cart", mutation.label(), &[("write", format!("{write:?}"))]);

        let guard = RollbackGuard::new(&self.snapshot, before);
        self.snapshot.send_replace(after.clone());

        match self.backend.apply(&write, &after).await {
            Ok(outcome) => {
                guard.disarm();
                if let (CartWrite::Upsert(key), Some(row_id)) = (&write, outcome.row_id) {
                    self.snapshot
                        .send_if_modified(|cart| record_row_id(cart, key, row_id));
                }
                Ok(self.snapshot())
            }
            Err(e) => {
                drop(guard);
                warn!(error = %e, "Cart write failed; restored previous cart");
                Err(CheckoutError::RemoteWrite(e))
            }
        }
    }

    /// Hand the cart over to a signed-in user's backend.
    ///
    /// The remote cart is loaded first. With [`SignInPolicy::Merge`] every
    /// guest line missing remotely is added, and lines present on both sides
    /// keep the larger quantity. Each write goes through the normal rollback
    /// path, so a failed line is reported and the rest still merge. With
    /// [`SignInPolicy::Discard`] the guest cart is dropped.
    ///
    /// The guest backend is released afterwards, except when merging could not
    /// start because the remote cart failed to load.
    #[instrument(skip(self, remote), fields(from = %self.backend.kind()))]
    pub async fn into_authenticated(
        self,
        remote: Box<dyn CartBackend>,
        policy: SignInPolicy,
    ) -> (Self, MergeReport) {
        let guest = self.snapshot();
        let mut store = Self::new(remote);
        let mut report = MergeReport::default();

        match policy {
            SignInPolicy::Discard => {
                store.load().await;
                if !guest.is_empty() {
                    info!(dropped = guest.item_count(), "Guest cart discarded on sign-in");
                }
            }
            SignInPolicy::Merge => match store.backend.load().await {
                Ok(remote_cart) => {
                    store.snapshot.send_replace(remote_cart);
                    store.merge_guest(&guest, &mut report).await;
                    info!(
                        merged = report.merged.len(),
                        raised = report.raised.len(),
                        failed = report.failed.len(),
                        "Guest cart merged on sign-in"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "Remote cart load failed; guest cart kept for a later sign-in");
                    report.failed = guest.keys();
                    return (store, report);
                }
            },
        }

        self.backend.release().await;
        (store, report)
    }

    async fn merge_guest(&mut self, guest: &CartSnapshot, report: &mut MergeReport) {
        let products = guest.lines.iter().map(|line| {
            (
                line.key(),
                line.quantity,
                CartItemRef::Product(line.product.clone()),
                line.variant.clone(),
            )
        });
        let tickets = guest.tickets.iter().map(|line| {
            (
                line.key(),
                line.quantity,
                CartItemRef::Ticket(line.ticket_type.clone()),
                None,
            )
        });

        for (key, guest_quantity, item, variant) in products.chain(tickets).collect::<Vec<_>>() {
            let outcome = match self.snapshot.borrow().quantity_of(&key) {
                None => Some((
                    CartMutation::Add {
                        item,
                        quantity: guest_quantity,
                        variant,
                    },
                    true,
                )),
                Some(remote_quantity) if remote_quantity < guest_quantity => Some((
                    CartMutation::SetQuantity {
                        key: key.clone(),
                        quantity: guest_quantity,
                    },
                    false,
                )),
                Some(_) => None,
            };

            let Some((mutation, added)) = outcome else {
                continue;
            };
            match self.apply(mutation).await {
                Ok(_) if added => report.merged.push(key),
                Ok(_) => report.raised.push(key),
                Err(_) => report.failed.push(key),
            }
        }
    }
}

fn record_row_id(cart: &mut CartSnapshot, key: &CartKey, row_id: CartRowId) -> bool {
    let slot = match key {
        CartKey::Ticket(id) => ticket_row_slot(cart, *id),
        CartKey::Product { .. } => cart
            .lines
            .iter_mut()
            .find(|l| l.key() == *key)
            .map(|l| &mut l.server_row_id),
    };
    slot.is_some_and(|slot| {
        let changed = *slot != Some(row_id);
        *slot = Some(row_id);
        changed
    })
}

fn ticket_row_slot(cart: &mut CartSnapshot, id: EventTicketTypeId) -> Option<&mut Option<CartRowId>> {
    cart.tickets
        .iter_mut()
        .find(|t| t.ticket_type.id == id)
        .map(|t| &mut t.server_row_id)
}
