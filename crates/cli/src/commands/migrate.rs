//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! danceflow migrate
//! ```
//!
//! # Environment Variables
//!
//! - `CHECKOUT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! # Migration Files
//!
//! Checkout migrations live in `crates/checkout/migrations/`.

use danceflow_checkout::CheckoutConfig;
use danceflow_checkout::db;

use super::CommandError;

/// Run checkout database migrations.
///
/// # Errors
///
/// Returns an error if the database URL is missing, the database is
/// unreachable, or a migration fails.
pub async fn checkout() -> Result<(), CommandError> {
    let database_url = CheckoutConfig::database_url_from_env()?;

    tracing::info!("Connecting to checkout database...");
    let pool = db::create_pool(&database_url).await?;

    tracing::info!("Running checkout migrations...");
    sqlx::migrate!("../checkout/migrations").run(&pool).await?;

    tracing::info!("Checkout migrations complete!");
    Ok(())
}
