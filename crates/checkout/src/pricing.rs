//! Member-aware pricing.
//!
//! Everything here is a pure function of a cart snapshot and the buyer's
//! membership. Unit prices are resolved first, then multiplied per line; the
//! cart total is the sum of the rounded line totals so it always matches what
//! is displayed.

use serde::Serialize;

use danceflow_core::{CartKey, CartSnapshot, LineItem, Price, TicketLineItem};

/// The price a buyer pays for one unit.
///
/// The member price applies only to members, and only when it is a real
/// discount: strictly positive and strictly below the base price.
#[must_use]
pub fn effective_price(base: Price, member: Option<Price>, is_member: bool) -> Price {
    match member {
        Some(member) if is_member && member.is_positive() && member < base => member,
        _ => base,
    }
}

/// Base and member price of a merchandise line.
///
/// Multi-category passes carry their tiers as categories; the selected variant
/// picks the tier by name. Without a match the product's own prices apply.
#[must_use]
pub fn line_prices(line: &LineItem) -> (Price, Option<Price>) {
    line.variant
        .as_deref()
        .and_then(|variant| {
            line.product
                .categories
                .iter()
                .find(|category| category.name == variant)
        })
        .map_or((line.product.price, line.product.member_price), |category| {
            (category.price, category.member_price)
        })
}

/// Priced cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineTotal {
    pub key: CartKey,
    pub name: String,
    pub unit_base: Price,
    pub unit_effective: Price,
    pub quantity: u32,
    pub line_total: Price,
    pub line_savings: Price,
}

/// Priced cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    pub lines: Vec<LineTotal>,
    pub total: Price,
    pub savings: Price,
}

/// Prices carts for one buyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceEngine {
    is_member: bool,
}

impl PriceEngine {
    #[must_use]
    pub const fn new(is_member: bool) -> Self {
        Self { is_member }
    }

    #[must_use]
    pub const fn is_member(&self) -> bool {
        self.is_member
    }

    /// Effective unit price of a merchandise line.
    #[must_use]
    pub fn product_unit_price(&self, line: &LineItem) -> Price {
        let (base, member) = line_prices(line);
        effective_price(base, member, self.is_member)
    }

    /// Effective unit price of a ticket line.
    #[must_use]
    pub fn ticket_unit_price(&self, line: &TicketLineItem) -> Price {
        effective_price(
            line.ticket_type.price,
            line.ticket_type.member_price,
            self.is_member,
        )
    }

    /// Price every line of `cart`, merchandise first.
    #[must_use]
    pub fn totals(&self, cart: &CartSnapshot) -> CartTotals {
        let products = cart.lines.iter().map(|line| {
            let (base, member) = line_prices(line);
            let name = match &line.variant {
                Some(variant) => format!("{} ({variant})", line.product.name),
                None => line.product.name.clone(),
            };
            self.line_total(line.key(), name, base, member, line.quantity)
        });
        let tickets = cart.tickets.iter().map(|line| {
            let ticket = &line.ticket_type;
            self.line_total(
                line.key(),
                format!("{}: {}", ticket.event_name, ticket.category),
                ticket.price,
                ticket.member_price,
                line.quantity,
            )
        });

        let lines: Vec<LineTotal> = products.chain(tickets).collect();
        let total = lines.iter().map(|l| l.line_total).sum();
        let savings = lines.iter().map(|l| l.line_savings).sum();

        CartTotals {
            lines,
            total,
            savings,
        }
    }

    fn line_total(
        &self,
        key: CartKey,
        name: String,
        base: Price,
        member: Option<Price>,
        quantity: u32,
    ) -> LineTotal {
        let unit_effective = effective_price(base, member, self.is_member);
        LineTotal {
            key,
            name,
            unit_base: base,
            unit_effective,
            quantity,
            line_total: unit_effective.times(quantity),
            line_savings: base.saturating_sub(unit_effective).times(quantity),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use danceflow_core::{
        EventId, EventTicketTypeId, PassCategory, ProductId, ProductRef, TicketTypeRef,
    };
    use proptest::prelude::*;

    use super::*;

    fn product(cents: i64, member: Option<i64>) -> ProductRef {
        ProductRef {
            id: ProductId::new(1),
            name: "Academy hoodie".to_string(),
            price: Price::from_cents(cents),
            member_price: member.map(Price::from_cents),
            categories: Vec::new(),
        }
    }

    fn ticket(cents: i64, member: Option<i64>) -> TicketTypeRef {
        TicketTypeRef {
            id: EventTicketTypeId::new(1),
            event_id: EventId::new(1),
            event_name: "Summer Swing Camp".to_string(),
            category: "Full pass".to_string(),
            price: Price::from_cents(cents),
            member_price: member.map(Price::from_cents),
        }
    }

    fn cart(product_lines: Vec<(ProductRef, u32)>, ticket_lines: Vec<(TicketTypeRef, u32)>) -> CartSnapshot {
        CartSnapshot {
            lines: product_lines
                .into_iter()
                .map(|(product, quantity)| LineItem {
                    product,
                    quantity,
                    variant: None,
                    server_row_id: None,
                })
                .collect(),
            tickets: ticket_lines
                .into_iter()
                .map(|(ticket_type, quantity)| TicketLineItem {
                    ticket_type,
                    quantity,
                    server_row_id: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_effective_price_rules() {
        let base = Price::from_cents(3000);
        assert_eq!(effective_price(base, Some(Price::from_cents(2700)), true), Price::from_cents(2700));
        assert_eq!(effective_price(base, Some(Price::from_cents(2700)), false), base);
        assert_eq!(effective_price(base, Some(Price::ZERO), true), base);
        assert_eq!(effective_price(base, Some(Price::from_cents(3500)), true), base);
        assert_eq!(effective_price(base, Some(base), true), base);
        assert_eq!(effective_price(base, None, true), base);
    }

    #[test]
    fn test_catalog_price_with_extra_places_displays_consistently() {
        let ticket: TicketTypeRef = serde_json::from_value(serde_json::json!({
            "id": 1,
            "event_id": 1,
            "event_name": "Summer Swing Camp",
            "category": "Full pass",
            "price": "10.005",
        }))
        .unwrap();
        let totals = PriceEngine::new(false).totals(&cart(Vec::new(), vec![(ticket, 1)]));

        let line = &totals.lines[0];
        assert_eq!(line.unit_effective.to_string(), "10.01");
        assert_eq!(line.line_total.to_string(), line.unit_effective.to_string());
        assert_eq!(totals.total, Price::from_cents(1001));
    }

    #[test]
    fn test_guest_pays_base_price() {
        let cart = cart(vec![(product(2000, Some(1500)), 2)], Vec::new());
        let totals = PriceEngine::new(false).totals(&cart);
        assert_eq!(totals.total, Price::from_cents(4000));
        assert_eq!(totals.savings, Price::ZERO);
    }

    #[test]
    fn test_member_total_and_savings() {
        let cart = cart(
            vec![(product(5000, Some(4500)), 1)],
            vec![(ticket(3000, Some(2700)), 1)],
        );
        let totals = PriceEngine::new(true).totals(&cart);
        assert_eq!(totals.total, Price::from_cents(7200));
        assert_eq!(totals.savings, Price::from_cents(800));
        assert_eq!(totals.lines.len(), 2);
        assert_eq!(totals.lines[1].name, "Summer Swing Camp: Full pass");
    }

    #[test]
    fn test_variant_selects_pass_category() {
        let mut pass = product(12000, Some(10000));
        pass.categories = vec![
            PassCategory {
                name: "Follower".to_string(),
                price: Price::from_cents(9000),
                member_price: Some(Price::from_cents(8000)),
            },
            PassCategory {
                name: "Leader".to_string(),
                price: Price::from_cents(9500),
                member_price: None,
            },
        ];

        let mut line = LineItem {
            product: pass,
            quantity: 1,
            variant: Some("Follower".to_string()),
            server_row_id: None,
        };
        let engine = PriceEngine::new(true);
        assert_eq!(engine.product_unit_price(&line), Price::from_cents(8000));

        line.variant = Some("Leader".to_string());
        assert_eq!(engine.product_unit_price(&line), Price::from_cents(9500));

        line.variant = Some("Spectator".to_string());
        assert_eq!(engine.product_unit_price(&line), Price::from_cents(10000));
    }

    fn price_strategy() -> impl Strategy<Value = Price> {
        (0i64..100_000).prop_map(Price::from_cents)
    }

    fn line_strategy() -> impl Strategy<Value = (Price, Option<Price>, u32)> {
        (price_strategy(), prop::option::of(price_strategy()), 0u32..10)
    }

    proptest! {
        #[test]
        fn prop_effective_never_exceeds_base(
            base in price_strategy(),
            member in prop::option::of(price_strategy()),
            is_member in any::<bool>(),
        ) {
            prop_assert!(effective_price(base, member, is_member) <= base);
        }

        #[test]
        fn prop_total_is_sum_of_line_totals(
            lines in prop::collection::vec(line_strategy(), 0..6),
            is_member in any::<bool>(),
        ) {
            let tickets = lines
                .iter()
                .enumerate()
                .map(|(i, (base, member, quantity))| {
                    let mut t = ticket(0, None);
                    t.id = EventTicketTypeId::new(i32::try_from(i).unwrap());
                    t.price = *base;
                    t.member_price = *member;
                    (t, *quantity)
                })
                .collect();
            let totals = PriceEngine::new(is_member).totals(&cart(Vec::new(), tickets));

            let displayed: Price = totals.lines.iter().map(|l| l.line_total).sum();
            prop_assert_eq!(totals.total, displayed);
            prop_assert!(totals.savings >= Price::ZERO);
            for line in &totals.lines {
                prop_assert!(line.unit_effective <= line.unit_base);
            }
        }
    }
}
