//! Cart line items and snapshots.
//!
//! A cart holds two kinds of lines: merchandise ([`LineItem`]) and event
//! tickets ([`TicketLineItem`]). Both lists are ordered; the ticket order is
//! significant because attendee slots are allocated by walking it.

use serde::{Deserialize, Serialize};

use super::id::{CartRowId, EventId, EventTicketTypeId, ProductId};
use super::price::Price;

/// A named price tier embedded in a multi-category pass product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassCategory {
    pub name: String,
    pub price: Price,
    #[serde(default)]
    pub member_price: Option<Price>,
}

/// Denormalized product data carried on a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
    #[serde(default)]
    pub member_price: Option<Price>,
    /// Category tiers for passes; empty for ordinary merchandise.
    #[serde(default)]
    pub categories: Vec<PassCategory>,
}

/// Denormalized event ticket type data carried on a ticket line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketTypeRef {
    pub id: EventTicketTypeId,
    pub event_id: EventId,
    pub event_name: String,
    /// Ticket category label (e.g. "Full pass", "Saturday night").
    pub category: String,
    pub price: Price,
    #[serde(default)]
    pub member_price: Option<Price>,
}

/// Merchandise line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product: ProductRef,
    pub quantity: u32,
    #[serde(default)]
    pub variant: Option<String>,
    /// Row id in the remote cart, once the row exists there.
    #[serde(default)]
    pub server_row_id: Option<CartRowId>,
}

impl LineItem {
    /// The identity of this line within a cart.
    #[must_use]
    pub fn key(&self) -> CartKey {
        CartKey::Product {
            product_id: self.product.id,
            variant: self.variant.clone(),
        }
    }
}

/// Event ticket line: `quantity` units of one ticket type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketLineItem {
    pub ticket_type: TicketTypeRef,
    pub quantity: u32,
    #[serde(default)]
    pub server_row_id: Option<CartRowId>,
}

impl TicketLineItem {
    /// The identity of this line within a cart.
    #[must_use]
    pub const fn key(&self) -> CartKey {
        CartKey::Ticket(self.ticket_type.id)
    }
}

/// Identity of a cart line.
///
/// Mirrors the remote row keys: `(user, product, variant)` for merchandise and
/// `(user, ticket type)` for tickets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartKey {
    Product {
        product_id: ProductId,
        variant: Option<String>,
    },
    Ticket(EventTicketTypeId),
}

impl core::fmt::Display for CartKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Product {
                product_id,
                variant: Some(variant),
            } => write!(f, "product:{product_id}:{variant}"),
            Self::Product {
                product_id,
                variant: None,
            } => write!(f, "product:{product_id}"),
            Self::Ticket(id) => write!(f, "ticket:{id}"),
        }
    }
}

/// Ordered contents of one cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    #[serde(default)]
    pub lines: Vec<LineItem>,
    #[serde(default)]
    pub tickets: Vec<TicketLineItem>,
}

impl CartSnapshot {
    /// An empty cart.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            lines: Vec::new(),
            tickets: Vec::new(),
        }
    }

    /// Whether the cart has no lines of either kind.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.tickets.is_empty()
    }

    /// Whether any merchandise is present (shipping is then required).
    #[must_use]
    pub fn has_products(&self) -> bool {
        !self.lines.is_empty()
    }

    /// Whether any ticket units are present.
    #[must_use]
    pub fn has_tickets(&self) -> bool {
        self.ticket_units() > 0
    }

    /// Total number of ticket units (the required attendee slot count).
    #[must_use]
    pub fn ticket_units(&self) -> usize {
        self.tickets.iter().map(|t| t.quantity as usize).sum()
    }

    /// Total unit count across both kinds, for a cart badge.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines
            .iter()
            .map(|l| l.quantity)
            .chain(self.tickets.iter().map(|t| t.quantity))
            .sum()
    }

    /// Quantity currently held under `key`, if the line exists.
    #[must_use]
    pub fn quantity_of(&self, key: &CartKey) -> Option<u32> {
        match key {
            CartKey::Ticket(id) => self
                .tickets
                .iter()
                .find(|t| t.ticket_type.id == *id)
                .map(|t| t.quantity),
            CartKey::Product { .. } => self
                .lines
                .iter()
                .find(|l| l.key() == *key)
                .map(|l| l.quantity),
        }
    }

    /// Every line key, merchandise first, in list order.
    #[must_use]
    pub fn keys(&self) -> Vec<CartKey> {
        self.lines
            .iter()
            .map(LineItem::key)
            .chain(self.tickets.iter().map(TicketLineItem::key))
            .collect()
    }
}
