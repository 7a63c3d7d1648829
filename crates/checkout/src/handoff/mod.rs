//! Handoff from the wizard to the payment provider.
//!
//! Submission runs in a fixed order:
//!
//! 1. Group attendee slots per ticket type (local, no network).
//! 2. Refresh the session if it expires within the configured leeway.
//! 3. Validate and create the order.
//! 4. Create the hosted payment checkout.
//! 5. Persist the [`PendingCheckout`] record.
//! 6. Clear the cart.
//!
//! A failure in steps 1-5 leaves the cart untouched. A failure in step 6
//! removes the record again so a live cart never coexists with a pending
//! checkout.

mod store;

pub use store::{HandoffStoreError, KeyValueStore, MemoryKeyValueStore, PendingCheckoutStore, keys};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, instrument};

use danceflow_core::{
    AttendeeSlot, CartSnapshot, ContactDetails, EventTicketTypeId, OrderId, PendingCheckout,
};

use crate::attendees;
use crate::cart::CartStore;
use crate::config::CheckoutSettings;
use crate::error::{Result, add_breadcrumb};
use crate::pricing::PriceEngine;
use crate::services::auth::{AuthSession, ensure_fresh};
use crate::services::orders::{OrderProductItem, OrderTicketItem, ShippingInfo};
use crate::services::{
    OrderRequest, OrderValidationService, PaymentCheckoutRequest, PaymentItem, PaymentKind,
    PaymentService, ValidatedOrder,
};

/// Where to send the browser after a successful handoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandoffRedirect {
    pub order_id: OrderId,
    pub checkout_url: String,
}

/// Packages a validated wizard into an order and a payment checkout.
pub struct OrderHandoff<'a> {
    orders: &'a dyn OrderValidationService,
    payments: &'a dyn PaymentService,
    settings: &'a CheckoutSettings,
}

impl<'a> OrderHandoff<'a> {
    #[must_use]
    pub const fn new(
        orders: &'a dyn OrderValidationService,
        payments: &'a dyn PaymentService,
        settings: &'a CheckoutSettings,
    ) -> Self {
        Self {
            orders,
            payments,
            settings,
        }
    }

    /// Submit the cart.
    ///
    /// `attendees` must be the wizard's slots for the current cart, and
    /// `contact` its validated contact details.
    ///
    /// # Errors
    ///
    /// - `Validation` when slots and ticket lines disagree or the order service
    ///   rejects the order
    /// - `Auth` without a usable session
    /// - `ExternalService` when the order or payment service fails
    /// - `Handoff` when the record cannot be written
    /// - `RemoteWrite` when the cart cannot be cleared (the record is removed)
    #[instrument(skip_all)]
    pub async fn submit(
        &self,
        auth: &dyn AuthSession,
        cart: &mut CartStore,
        attendees: &[AttendeeSlot],
        contact: &ContactDetails,
        pending: &PendingCheckoutStore,
        now: DateTime<Utc>,
    ) -> Result<HandoffRedirect> {
        let snapshot = cart.snapshot();
        let attendees_by_ticket_type = attendees::group(attendees, &snapshot.tickets)?;

        let (identity, token) = ensure_fresh(auth, self.settings.refresh_leeway, now).await?;
        let request = build_request(
            &snapshot,
            PriceEngine::new(identity.is_member),
            contact,
            attendees_by_ticket_type,
        );

        let order = self.orders.validate_and_create_order(&request, &token).await?;
        add_breadcrumb(
            "checkout",
            "order created",
            &[("order_id", order.order_id.to_string())],
        );

        let checkout_url = self
            .payments
            .create_checkout(&self.payment_request(&order, &identity.user_id.to_string()))
            .await?;

        let record = PendingCheckout {
            order_id: order.order_id,
            ticket_items: snapshot.tickets.clone(),
            attendees: attendees.to_vec(),
            bound_units: Vec::new(),
            claims: Vec::new(),
        };
        pending.save(&record).await?;

        if let Err(e) = cart.clear().await {
            if let Err(cleanup) = pending.delete().await {
                error!(error = %cleanup, order_id = %order.order_id, "Failed to remove handoff record after cart clear failure");
            }
            return Err(e);
        }

        info!(order_id = %order.order_id, total = %order.total_amount, "Handing off to payment");
        Ok(HandoffRedirect {
            order_id: order.order_id,
            checkout_url,
        })
    }

    fn payment_request(&self, order: &ValidatedOrder, user_id: &str) -> PaymentCheckoutRequest {
        let items = order
            .validated_items
            .iter()
            .map(|item| PaymentItem {
                name: item.name.clone(),
                unit_amount_cents: item.unit_amount.cents(),
                quantity: item.quantity,
            })
            .collect();

        let metadata = BTreeMap::from([
            ("order_id".to_string(), order.order_id.to_string()),
            ("user_id".to_string(), user_id.to_string()),
            ("total".to_string(), order.total_amount.to_string()),
        ]);

        PaymentCheckoutRequest {
            kind: PaymentKind::Purchase,
            currency: self.settings.currency,
            items,
            metadata,
            success_url: self.settings.success_url(),
            cancel_url: self.settings.cancel_url(),
        }
    }
}

fn build_request(
    cart: &CartSnapshot,
    engine: PriceEngine,
    contact: &ContactDetails,
    attendees_by_ticket_type: BTreeMap<EventTicketTypeId, Vec<AttendeeSlot>>,
) -> OrderRequest {
    OrderRequest {
        product_items: cart
            .lines
            .iter()
            .map(|line| OrderProductItem {
                product_id: line.product.id,
                variant: line.variant.clone(),
                quantity: line.quantity,
                unit_price: engine.product_unit_price(line),
            })
            .collect(),
        ticket_items: cart
            .tickets
            .iter()
            .filter(|line| line.quantity > 0)
            .map(|line| OrderTicketItem {
                event_ticket_type_id: line.ticket_type.id,
                quantity: line.quantity,
                unit_price: engine.ticket_unit_price(line),
            })
            .collect(),
        shipping_info: ShippingInfo::from(contact),
        attendees_by_ticket_type,
    }
}
