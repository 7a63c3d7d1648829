//! Order-validation service client.
//!
//! The service re-checks stock and prices, creates the order together with one
//! placeholder attendee record per ticket unit, and returns the validated
//! breakdown the payment checkout is built from.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument, warn};
use url::Url;

use danceflow_core::{
    AttendeeSlot, ContactDetails, EventTicketTypeId, OrderId, Price, ProductId, ShippingAddress,
};

use super::{AuthError, error_message, excerpt};
use crate::error::{CheckoutError, ValidationError, ValidationReason};

/// A merchandise entry of an order request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderProductItem {
    pub product_id: ProductId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub quantity: u32,
    /// Price shown to the buyer, checked server-side for mismatches.
    pub unit_price: Price,
}

/// A ticket entry of an order request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTicketItem {
    pub event_ticket_type_id: EventTicketTypeId,
    pub quantity: u32,
    pub unit_price: Price,
}

/// Buyer and delivery details of an order request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfo {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<ShippingAddress>,
}

impl From<&ContactDetails> for ShippingInfo {
    fn from(contact: &ContactDetails) -> Self {
        Self {
            name: contact.name.trim().to_owned(),
            email: contact.email.trim().to_owned(),
            phone: contact.phone.trim().to_owned(),
            address: contact.shipping.clone(),
        }
    }
}

/// Everything the order service needs to validate and create an order.
///
/// Attendees are grouped per ticket type in allocation order; each carries the
/// `unitId` the service should store on the placeholder it creates for that
/// unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub product_items: Vec<OrderProductItem>,
    pub ticket_items: Vec<OrderTicketItem>,
    pub shipping_info: ShippingInfo,
    pub attendees_by_ticket_type: BTreeMap<EventTicketTypeId, Vec<AttendeeSlot>>,
}

/// One validated line of an order, priced by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedItem {
    pub name: String,
    pub unit_amount: Price,
    pub quantity: u32,
    #[serde(default)]
    pub product_id: Option<ProductId>,
    #[serde(default)]
    pub event_ticket_type_id: Option<EventTicketTypeId>,
}

/// The created order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedOrder {
    pub order_id: OrderId,
    pub total_amount: Price,
    pub validated_items: Vec<ValidatedItem>,
}

/// Validates a cart server-side and creates the order.
#[async_trait]
pub trait OrderValidationService: Send + Sync {
    /// Validate the request and create the order with its placeholders.
    ///
    /// # Errors
    ///
    /// - `CheckoutError::Validation(ValidationError::Rejected)` for stock, price
    ///   or shipping problems
    /// - `CheckoutError::Auth` for a missing or expired session
    /// - `CheckoutError::ExternalService` for any other rejection
    async fn validate_and_create_order(
        &self,
        request: &OrderRequest,
        access_token: &SecretString,
    ) -> Result<ValidatedOrder, CheckoutError>;
}

#[derive(Deserialize)]
struct RejectionBody {
    #[serde(default)]
    reasons: Vec<ValidationReason>,
}

/// HTTP client for the order-validation service.
#[derive(Clone)]
pub struct HttpOrderService {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpOrderService {
    /// Create a client for the service rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns a `url::ParseError` if the endpoint cannot be derived.
    pub fn new(base_url: &Url) -> Result<Self, url::ParseError> {
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: base_url.join("orders/validate")?,
        })
    }
}

#[async_trait]
impl OrderValidationService for HttpOrderService {
    #[instrument(skip_all, fields(tickets = request.ticket_items.len(), products = request.product_items.len()))]
    async fn validate_and_create_order(
        &self,
        request: &OrderRequest,
        access_token: &SecretString,
    ) -> Result<ValidatedOrder, CheckoutError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(access_token.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Order service request failed");
                CheckoutError::ExternalService(
                    "The order service is unavailable. Please try again.".to_string(),
                )
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            error!(error = %e, "Failed to read order service response");
            CheckoutError::ExternalService("The order service sent an unreadable response.".to_string())
        })?;

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(CheckoutError::Auth(AuthError::SessionExpired))
            }
            StatusCode::UNPROCESSABLE_ENTITY | StatusCode::BAD_REQUEST => {
                match serde_json::from_str::<RejectionBody>(&body) {
                    Ok(rejection) if !rejection.reasons.is_empty() => {
                        warn!(reasons = ?rejection.reasons, "Order rejected by validation");
                        Err(ValidationError::Rejected {
                            reasons: rejection.reasons,
                        }
                        .into())
                    }
                    _ => Err(CheckoutError::ExternalService(error_message(&body))),
                }
            }
            status if !status.is_success() => {
                error!(
                    status = %status,
                    body = %excerpt(&body),
                    "Order service returned non-success status"
                );
                Err(CheckoutError::ExternalService(error_message(&body)))
            }
            _ => serde_json::from_str::<ValidatedOrder>(&body).map_err(|e| {
                error!(error = %e, body = %excerpt(&body), "Failed to parse validated order");
                CheckoutError::ExternalService(
                    "The order service sent an unexpected response.".to_string(),
                )
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base_url() {
        let service = HttpOrderService::new(&Url::parse("https://orders.example/api/").unwrap()).unwrap();
        assert_eq!(service.endpoint.as_str(), "https://orders.example/api/orders/validate");
    }

    #[test]
    fn test_request_serializes_attendees_by_ticket_type() {
        let mut slot = AttendeeSlot::blank();
        slot.first_name = "Kiri".to_string();
        slot.last_name = "Tane".to_string();
        let unit_id = slot.unit_id;

        let request = OrderRequest {
            product_items: Vec::new(),
            ticket_items: vec![OrderTicketItem {
                event_ticket_type_id: EventTicketTypeId::new(12),
                quantity: 1,
                unit_price: Price::from_cents(3000),
            }],
            shipping_info: ShippingInfo {
                name: "Kiri Tane".to_string(),
                email: "kiri@example.com".to_string(),
                phone: String::new(),
                address: None,
            },
            attendees_by_ticket_type: BTreeMap::from([(EventTicketTypeId::new(12), vec![slot])]),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["ticketItems"][0]["eventTicketTypeId"], 12);
        assert_eq!(json["ticketItems"][0]["unitPrice"], "30.00");
        assert_eq!(
            json["attendeesByTicketType"]["12"][0]["unitId"],
            unit_id.to_string()
        );
        assert!(json["shippingInfo"].get("address").is_none());
    }

    #[test]
    fn test_validated_order_deserializes() {
        let json = r#"{
            "orderId": 991,
            "totalAmount": "72.00",
            "validatedItems": [
                {"name": "Full pass", "unitAmount": "27.00", "quantity": 1, "eventTicketTypeId": 4},
                {"name": "Academy hoodie", "unitAmount": "45.00", "quantity": 1, "productId": 8}
            ]
        }"#;
        let order: ValidatedOrder = serde_json::from_str(json).unwrap();
        assert_eq!(order.order_id, OrderId::new(991));
        assert_eq!(order.total_amount, Price::from_cents(7200));
        assert_eq!(order.validated_items[1].product_id, Some(ProductId::new(8)));
    }
}
