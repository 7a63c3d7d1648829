//! Unified error handling with Sentry integration.
//!
//! [`CheckoutError`] is the single error returned by every engine operation.
//! Its variants follow the failure taxonomy of the checkout flow:
//!
//! - `Validation` blocks a transition before any network effect.
//! - `RemoteWrite` means an optimistic change was applied and has been rolled back.
//! - `RemoteRead` is normally swallowed by the caller and degrades to empty state.
//! - `Auth` asks the user to sign in again.
//! - `ExternalService` is an explicit rejection, shown verbatim.
//!
//! Nothing in this crate retries; every recoverable failure needs a new user action.

use thiserror::Error;

use danceflow_core::{CartKey, EmailError, Price};

use crate::attendees::AllocationError;
use crate::db::RepositoryError;
use crate::handoff::HandoffStoreError;
use crate::services::auth::AuthError;

/// Engine-level error type.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Local or server-side validation failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A remote write failed after the optimistic local change was applied.
    #[error("remote write failed: {0}")]
    RemoteWrite(RemoteError),

    /// A remote read failed.
    #[error("remote read failed: {0}")]
    RemoteRead(RemoteError),

    /// Missing or expired session.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// The order or payment service rejected the request.
    #[error("{0}")]
    ExternalService(String),

    /// Reading or writing the durable handoff record failed.
    #[error("handoff storage error: {0}")]
    Handoff(#[from] HandoffStoreError),

    /// Reconciliation was requested without a pending checkout.
    #[error("no pending checkout")]
    NoPendingCheckout,
}

impl From<AllocationError> for CheckoutError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::SlotCountMismatch { expected, actual } => {
                Self::Validation(ValidationError::AttendeeCountMismatch { expected, actual })
            }
        }
    }
}

/// Failure of a remote cart or placeholder store.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Database access failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// The collaborator is unavailable for another reason.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// A contact field the Contact step requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactField {
    Name,
    Email,
}

impl core::fmt::Display for ContactField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Name => "name",
            Self::Email => "email",
        })
    }
}

/// Validation failures, local or reported by the order service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("your cart is empty")]
    EmptyCart,

    #[error("quantity must be at least 1")]
    InvalidQuantity,

    #[error("{0} is not in the cart")]
    UnknownLine(CartKey),

    /// Zero-based slot indices with a blank first or last name.
    #[error("please enter a first and last name for attendee {}", format_positions(.missing))]
    IncompleteAttendees { missing: Vec<usize> },

    #[error("expected {expected} attendees but {actual} were entered")]
    AttendeeCountMismatch { expected: usize, actual: usize },

    #[error("please enter your {0}")]
    MissingContact(ContactField),

    #[error("please enter a valid email address ({0})")]
    InvalidEmail(EmailError),

    #[error("shipping address is incomplete: missing {}", .missing.join(", "))]
    MissingShipping { missing: Vec<&'static str> },

    /// Structured rejection from the order-validation service.
    #[error("{}", format_reasons(.reasons))]
    Rejected { reasons: Vec<ValidationReason> },
}

/// One reason the order-validation service rejected an order.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ValidationReason {
    OutOfStock { item: String, available: u32 },
    PriceMismatch {
        item: String,
        /// The price the order service charges now.
        expected: Price,
        /// The price the submitted order carried, as shown in the cart.
        actual: Price,
    },
    InvalidShipping { field: String, message: String },
    Other { message: String },
}

impl core::fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutOfStock { item, available } => {
                write!(f, "{item} is out of stock ({available} left)")
            }
            Self::PriceMismatch {
                item,
                expected,
                actual,
            } => write!(f, "the price of {item} is now {expected} (your cart showed {actual})"),
            Self::InvalidShipping { field, message } => write!(f, "shipping {field}: {message}"),
            Self::Other { message } => f.write_str(message),
        }
    }
}

fn format_positions(indices: &[usize]) -> String {
    indices
        .iter()
        .map(|i| (i + 1).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_reasons(reasons: &[ValidationReason]) -> String {
    if reasons.is_empty() {
        return "the order could not be validated".to_string();
    }
    reasons
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl CheckoutError {
    /// Message to show inline at the point of the failed action.
    ///
    /// Internal details of storage and transport failures are hidden.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(err) => err.to_string(),
            Self::RemoteWrite(_) => "We couldn't save that change. Please try again.".to_string(),
            Self::RemoteRead(_) => "We couldn't load your cart right now.".to_string(),
            Self::Auth(_) => "Please sign in to continue.".to_string(),
            Self::ExternalService(message) => message.clone(),
            Self::Handoff(_) => "We couldn't start the payment. Please try again.".to_string(),
            Self::NoPendingCheckout => "There is no checkout in progress.".to_string(),
        }
    }

    /// Whether the user must sign in before retrying.
    #[must_use]
    pub const fn requires_sign_in(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Capture unexpected failures to Sentry and log them.
    ///
    /// Validation and auth failures are user-facing outcomes and are not
    /// captured.
    pub fn report(&self) {
        if matches!(
            self,
            Self::RemoteWrite(_) | Self::RemoteRead(_) | Self::ExternalService(_) | Self::Handoff(_)
        ) {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Checkout error"
            );
        } else {
            tracing::debug!(error = %self, "Checkout action rejected");
        }
    }
}

/// Result type alias for `CheckoutError`.
pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Add a breadcrumb for a checkout action.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of cart and
/// wizard actions leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: &[(&str, String)]) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    for (key, value) in data {
        breadcrumb.data.insert(
            (*key).to_string(),
            serde_json::Value::String(value.clone()),
        );
    }

    sentry::add_breadcrumb(breadcrumb);
}
