//! Database operations for checkout `PostgreSQL`.
//!
//! # Schema: `checkout`
//!
//! ## Tables
//!
//! - `cart_product_row` - Remote cart merchandise rows, keyed by `(user_id, product_id, variant)`
//! - `cart_ticket_row` - Remote cart ticket rows, keyed by `(user_id, event_ticket_type_id)`
//! - `attendee_placeholder` - One row per purchased ticket unit, written by the
//!   order system and completed by the attendee reconciler
//!
//! # Migrations
//!
//! Migrations are stored in `crates/checkout/migrations/` and run via:
//! ```bash
//! danceflow migrate
//! ```

pub mod cart_rows;
pub mod placeholders;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use cart_rows::{CartRowRepository, PgCartRows};
pub use placeholders::{PgPlaceholders, PlaceholderRepository};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation or lost update.
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
