//! Danceflow checkout engine.
//!
//! Keeps a shopping cart consistent across guest and signed-in sessions, prices
//! it for members, drives the checkout wizard, hands the order off to the
//! payment provider, and binds attendees to their tickets once payment
//! completes.
//!
//! # Modules
//!
//! - [`cart`] - Cart store with optimistic writes and rollback
//! - [`pricing`] - Member-aware effective prices and totals
//! - [`attendees`] - Ticket units to attendee slots and back
//! - [`wizard`] - `Cart -> Attendees -> Contact` state machine
//! - [`handoff`] - Order creation, payment redirect, durable handoff record
//! - [`reconcile`] - Attendee-to-placeholder binding after payment
//! - [`session`] - Per-visitor context tying the above together
//! - [`state`] - Services shared across sessions
//! - [`services`] - Auth, order and payment collaborators
//! - [`db`] - `PostgreSQL` repositories

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod attendees;
pub mod cart;
pub mod config;
pub mod db;
pub mod error;
pub mod handoff;
pub mod pricing;
pub mod reconcile;
pub mod services;
pub mod session;
pub mod state;
pub mod wizard;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cart::{CartStore, MergeReport, SignInPolicy};
pub use config::{CheckoutConfig, CheckoutSettings};
pub use error::{CheckoutError, Result, ValidationError};
pub use handoff::{HandoffRedirect, OrderHandoff, PendingCheckoutStore};
pub use pricing::{CartTotals, PriceEngine};
pub use reconcile::{AttendeeReconciler, NextView, ReconcileProgress, ReconcileReport};
pub use session::CheckoutSession;
pub use state::CheckoutServices;
pub use wizard::{CheckoutWizard, WizardStep};
