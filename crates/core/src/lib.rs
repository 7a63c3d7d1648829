//! Danceflow Core - Shared types library.
//!
//! This crate provides the types shared by the checkout engine and its tools:
//! - `checkout` - Cart synchronization, pricing, checkout wizard and payment handoff
//! - `cli` - Migrations and reconciliation tooling
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, prices, contact details, cart lines and attendee records

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
