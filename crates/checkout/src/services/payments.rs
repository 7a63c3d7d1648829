//! Hosted payment checkout client.
//!
//! The provider hosts the payment page. We create a checkout session from the
//! validated order and send the browser to the returned URL; the provider
//! redirects back to the success or cancel URL afterwards.

use std::collections::BTreeMap;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};
use url::Url;

use danceflow_core::CurrencyCode;

use super::{error_message, excerpt};
use crate::config::PaymentConfig;
use crate::error::CheckoutError;

/// How the provider should charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    /// One-off purchase of cart contents.
    Purchase,
    /// Recurring membership billing.
    Subscription,
}

/// One line of the payment page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentItem {
    pub name: String,
    /// Unit amount in the smallest currency unit.
    pub unit_amount_cents: i64,
    pub quantity: u32,
}

/// Parameters of a hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentCheckoutRequest {
    pub kind: PaymentKind,
    pub currency: CurrencyCode,
    pub items: Vec<PaymentItem>,
    /// Opaque key/value pairs echoed back by the provider's webhooks.
    pub metadata: BTreeMap<String, String>,
    pub success_url: String,
    pub cancel_url: String,
}

/// Creates hosted payment checkouts.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Create a checkout session and return the URL to send the browser to.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::ExternalService` if the provider rejects the
    /// request or cannot be reached.
    async fn create_checkout(&self, request: &PaymentCheckoutRequest) -> Result<String, CheckoutError>;
}

#[derive(Serialize)]
struct CreateSessionBody<'a> {
    mode: PaymentKind,
    currency: &'a str,
    line_items: &'a [PaymentItem],
    metadata: &'a BTreeMap<String, String>,
    success_url: &'a str,
    cancel_url: &'a str,
}

#[derive(Deserialize)]
struct CreateSessionResponse {
    url: String,
}

/// HTTP client for the payment provider.
#[derive(Clone)]
pub struct HttpPaymentService {
    client: reqwest::Client,
    endpoint: Url,
    api_key: SecretString,
}

impl std::fmt::Debug for HttpPaymentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPaymentService")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpPaymentService {
    /// Create a client from the payment configuration.
    ///
    /// # Errors
    ///
    /// Returns a `url::ParseError` if the endpoint cannot be derived.
    pub fn new(config: &PaymentConfig) -> Result<Self, url::ParseError> {
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: config.service_url.join("checkout/sessions")?,
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl PaymentService for HttpPaymentService {
    #[instrument(skip_all, fields(kind = ?request.kind, items = request.items.len()))]
    async fn create_checkout(&self, request: &PaymentCheckoutRequest) -> Result<String, CheckoutError> {
        let body = CreateSessionBody {
            mode: request.kind,
            currency: request.currency.code(),
            line_items: &request.items,
            metadata: &request.metadata,
            success_url: &request.success_url,
            cancel_url: &request.cancel_url,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Payment provider request failed");
                CheckoutError::ExternalService(
                    "The payment provider is unavailable. Please try again.".to_string(),
                )
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            error!(error = %e, "Failed to read payment provider response");
            CheckoutError::ExternalService(
                "The payment provider sent an unreadable response.".to_string(),
            )
        })?;

        if !status.is_success() {
            error!(
                status = %status,
                body = %excerpt(&text),
                "Payment provider returned non-success status"
            );
            return Err(CheckoutError::ExternalService(error_message(&text)));
        }

        let session: CreateSessionResponse = serde_json::from_str(&text).map_err(|e| {
            error!(error = %e, body = %excerpt(&text), "Failed to parse checkout session");
            CheckoutError::ExternalService(
                "The payment provider sent an unexpected response.".to_string(),
            )
        })?;

        Ok(session.url)
    }
}
