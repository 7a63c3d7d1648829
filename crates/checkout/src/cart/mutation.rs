//! Cart mutations as commands.
//!
//! A [`CartMutation`] is applied to a copy of the current snapshot first. The
//! resulting [`CartWrite`] tells the backend which row to persist; the store
//! keeps the pre-mutation snapshot to restore if that write fails.

use danceflow_core::{CartKey, CartSnapshot, LineItem, ProductRef, TicketLineItem, TicketTypeRef};

use crate::error::ValidationError;

/// Something that can be put in the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartItemRef {
    Product(ProductRef),
    Ticket(TicketTypeRef),
}

impl CartItemRef {
    /// The line key this item lands under.
    ///
    /// Tickets have no variants; a variant passed with a ticket is ignored.
    #[must_use]
    pub fn key(&self, variant: Option<&str>) -> CartKey {
        match self {
            Self::Product(product) => CartKey::Product {
                product_id: product.id,
                variant: variant.map(str::to_owned),
            },
            Self::Ticket(ticket) => CartKey::Ticket(ticket.id),
        }
    }
}

/// A user-initiated cart change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartMutation {
    Add {
        item: CartItemRef,
        quantity: u32,
        variant: Option<String>,
    },
    Remove(CartKey),
    SetQuantity {
        key: CartKey,
        quantity: u32,
    },
    Clear,
}

/// The remote effect of an applied mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartWrite {
    /// Persist the line now held under this key.
    Upsert(CartKey),
    /// Delete the row under this key.
    Delete(CartKey),
    /// Delete every row.
    Clear,
}

impl CartMutation {
    /// Short name used in logs and breadcrumbs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add_line",
            Self::Remove(_) => "remove_line",
            Self::SetQuantity { .. } => "set_quantity",
            Self::Clear => "clear",
        }
    }

    /// Apply the mutation to `cart` in place.
    ///
    /// On error `cart` is left unchanged.
    ///
    /// # Errors
    ///
    /// - `ValidationError::InvalidQuantity` when adding zero units or when the
    ///   resulting quantity would overflow
    /// - `ValidationError::UnknownLine` when removing or updating a missing key
    pub fn apply_to(&self, cart: &mut CartSnapshot) -> Result<CartWrite, ValidationError> {
        match self {
            Self::Add {
                item,
                quantity,
                variant,
            } => {
                if *quantity == 0 {
                    return Err(ValidationError::InvalidQuantity);
                }
                let key = item.key(variant.as_deref());
                match cart.quantity_of(&key) {
                    Some(current) => {
                        let total = current
                            .checked_add(*quantity)
                            .ok_or(ValidationError::InvalidQuantity)?;
                        set_line_quantity(cart, &key, total);
                    }
                    None => push_line(cart, item, *quantity, variant.clone()),
                }
                Ok(CartWrite::Upsert(key))
            }
            Self::Remove(key) => {
                if cart.quantity_of(key).is_none() {
                    return Err(ValidationError::UnknownLine(key.clone()));
                }
                remove_line(cart, key);
                Ok(CartWrite::Delete(key.clone()))
            }
            Self::SetQuantity { key, quantity } => {
                if cart.quantity_of(key).is_none() {
                    return Err(ValidationError::UnknownLine(key.clone()));
                }
                if *quantity == 0 {
                    remove_line(cart, key);
                    Ok(CartWrite::Delete(key.clone()))
                } else {
                    set_line_quantity(cart, key, *quantity);
                    Ok(CartWrite::Upsert(key.clone()))
                }
            }
            Self::Clear => {
                *cart = CartSnapshot::empty();
                Ok(CartWrite::Clear)
            }
        }
    }
}

fn push_line(cart: &mut CartSnapshot, item: &CartItemRef, quantity: u32, variant: Option<String>) {
    match item {
        CartItemRef::Product(product) => cart.lines.push(LineItem {
            product: product.clone(),
            quantity,
            variant,
            server_row_id: None,
        }),
        CartItemRef::Ticket(ticket) => cart.tickets.push(TicketLineItem {
            ticket_type: ticket.clone(),
            quantity,
            server_row_id: None,
        }),
    }
}

fn set_line_quantity(cart: &mut CartSnapshot, key: &CartKey, quantity: u32) {
    match key {
        CartKey::Ticket(id) => {
            if let Some(line) = cart.tickets.iter_mut().find(|t| t.ticket_type.id == *id) {
                line.quantity = quantity;
            }
        }
        CartKey::Product { .. } => {
            if let Some(line) = cart.lines.iter_mut().find(|l| l.key() == *key) {
                line.quantity = quantity;
            }
        }
    }
}

fn remove_line(cart: &mut CartSnapshot, key: &CartKey) {
    match key {
        CartKey::Ticket(id) => cart.tickets.retain(|t| t.ticket_type.id != *id),
        CartKey::Product { .. } => cart.lines.retain(|l| l.key() != *key),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use danceflow_core::{EventId, EventTicketTypeId, Price, ProductId};

    use super::*;

    fn shoes() -> ProductRef {
        ProductRef {
            id: ProductId::new(1),
            name: "Practice shoes".to_string(),
            price: Price::from_cents(2000),
            member_price: Some(Price::from_cents(1500)),
            categories: Vec::new(),
        }
    }

    fn ticket_x() -> TicketTypeRef {
        TicketTypeRef {
            id: EventTicketTypeId::new(10),
            event_id: EventId::new(3),
            event_name: "Bachata Weekender".to_string(),
            category: "Full pass".to_string(),
            price: Price::from_cents(3000),
            member_price: None,
        }
    }

    fn add(item: CartItemRef, quantity: u32, variant: Option<&str>) -> CartMutation {
        CartMutation::Add {
            item,
            quantity,
            variant: variant.map(str::to_owned),
        }
    }

    #[test]
    fn test_add_existing_key_increments_quantity() {
        let mut cart = CartSnapshot::empty();
        add(CartItemRef::Product(shoes()), 2, Some("38")).apply_to(&mut cart).unwrap();
        let write = add(CartItemRef::Product(shoes()), 1, Some("38"))
            .apply_to(&mut cart)
            .unwrap();

        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.lines[0].quantity, 3);
        assert_eq!(write, CartWrite::Upsert(cart.lines[0].key()));
    }

    #[test]
    fn test_variants_are_separate_lines() {
        let mut cart = CartSnapshot::empty();
        add(CartItemRef::Product(shoes()), 1, Some("38")).apply_to(&mut cart).unwrap();
        add(CartItemRef::Product(shoes()), 1, Some("40")).apply_to(&mut cart).unwrap();
        add(CartItemRef::Product(shoes()), 1, None).apply_to(&mut cart).unwrap();
        assert_eq!(cart.lines.len(), 3);
    }

    #[test]
    fn test_add_zero_is_rejected_without_change() {
        let mut cart = CartSnapshot::empty();
        let err = add(CartItemRef::Ticket(ticket_x()), 0, None).apply_to(&mut cart);
        assert_eq!(err, Err(ValidationError::InvalidQuantity));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_set_quantity_zero_removes_line() {
        let mut cart = CartSnapshot::empty();
        add(CartItemRef::Ticket(ticket_x()), 3, None).apply_to(&mut cart).unwrap();
        let key = CartKey::Ticket(EventTicketTypeId::new(10));

        let write = CartMutation::SetQuantity {
            key: key.clone(),
            quantity: 0,
        }
        .apply_to(&mut cart)
        .unwrap();

        assert_eq!(write, CartWrite::Delete(key));
        assert!(cart.tickets.is_empty());
    }

    #[test]
    fn test_unknown_line_is_rejected() {
        let mut cart = CartSnapshot::empty();
        let key = CartKey::Ticket(EventTicketTypeId::new(99));
        assert_eq!(
            CartMutation::Remove(key.clone()).apply_to(&mut cart),
            Err(ValidationError::UnknownLine(key.clone()))
        );
        assert_eq!(
            CartMutation::SetQuantity { key: key.clone(), quantity: 2 }.apply_to(&mut cart),
            Err(ValidationError::UnknownLine(key))
        );
    }

    #[test]
    fn test_ticket_ignores_variant() {
        let item = CartItemRef::Ticket(ticket_x());
        assert_eq!(item.key(Some("VIP")), CartKey::Ticket(EventTicketTypeId::new(10)));
    }

    #[test]
    fn test_overflowing_add_is_rejected() {
        let mut cart = CartSnapshot::empty();
        add(CartItemRef::Ticket(ticket_x()), u32::MAX, None).apply_to(&mut cart).unwrap();
        let before = cart.clone();
        assert_eq!(
            add(CartItemRef::Ticket(ticket_x()), 1, None).apply_to(&mut cart),
            Err(ValidationError::InvalidQuantity)
        );
        assert_eq!(cart, before);
    }
}
