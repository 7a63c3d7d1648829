//! Core types for Danceflow.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod attendee;
pub mod cart;
pub mod contact;
pub mod id;
pub mod price;

pub use attendee::{AttendeeDetails, AttendeeSlot, PendingCheckout, PlaceholderAttendee, PlaceholderClaim};
pub use cart::{CartKey, CartSnapshot, LineItem, PassCategory, ProductRef, TicketLineItem, TicketTypeRef};
pub use contact::{ContactDetails, Email, EmailError, ShippingAddress};
pub use id::*;
pub use price::{CurrencyCode, Price};
