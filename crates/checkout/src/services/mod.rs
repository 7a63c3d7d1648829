//! External collaborators of the checkout engine.
//!
//! - [`auth`] - The signed-in session (identity, expiry, refresh)
//! - [`orders`] - Order validation and creation
//! - [`payments`] - Hosted payment checkout
//!
//! Each collaborator is a trait so sessions can be wired with the HTTP
//! clients in production and with in-memory fakes in tests.

pub mod auth;
pub mod orders;
pub mod payments;

pub use auth::{AuthError, AuthSession, Identity};
pub use orders::{HttpOrderService, OrderRequest, OrderValidationService, ValidatedItem, ValidatedOrder};
pub use payments::{HttpPaymentService, PaymentCheckoutRequest, PaymentItem, PaymentKind, PaymentService};

/// Maximum number of response body characters kept in logs and messages.
const MAX_BODY_EXCERPT: usize = 200;

/// First characters of a response body, for diagnostics.
fn excerpt(body: &str) -> String {
    body.chars().take(MAX_BODY_EXCERPT).collect()
}

/// Pull a human-readable message out of an error response body.
///
/// Accepts `{"message": ".."}` and `{"error": {"message": ".."}}`; otherwise
/// falls back to an excerpt of the raw body.
fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|value| {
            value
                .get("message")
                .or_else(|| value.get("error").and_then(|e| e.get("message")))
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
        })
        .unwrap_or_else(|| excerpt(body))
}
