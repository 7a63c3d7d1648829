//! Attendee slots and the records that carry them across the payment redirect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cart::TicketLineItem;
use super::id::{EventTicketTypeId, OrderId, PlaceholderId, UnitCorrelationId, UserId};

/// One attendee position, corresponding to exactly one purchased ticket unit.
///
/// Slots live in a single flat sequence built by walking ticket lines in list
/// order, `quantity` slots per line. `unit_id` is minted when the slot is
/// allocated and travels with the order so the server can echo it back on the
/// matching placeholder record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendeeSlot {
    pub unit_id: UnitCorrelationId,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

impl AttendeeSlot {
    /// A blank slot with a fresh correlation id.
    #[must_use]
    pub fn blank() -> Self {
        Self {
            unit_id: UnitCorrelationId::generate(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            phone: String::new(),
        }
    }

    /// Whether both first and last name are filled in.
    #[must_use]
    pub fn is_named(&self) -> bool {
        !self.first_name.trim().is_empty() && !self.last_name.trim().is_empty()
    }

    /// The personal fields written onto a placeholder record.
    #[must_use]
    pub fn details(&self) -> AttendeeDetails {
        AttendeeDetails {
            first_name: self.first_name.trim().to_owned(),
            last_name: self.last_name.trim().to_owned(),
            email: non_blank(&self.email),
            phone: non_blank(&self.phone),
        }
    }
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

/// Personal fields of an attendee, as stored on a ticket record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendeeDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// The durable handoff record written just before redirecting to payment.
///
/// This is the only state that survives the redirect: the live cart is cleared
/// once it has been written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCheckout {
    pub order_id: OrderId,
    pub ticket_items: Vec<TicketLineItem>,
    pub attendees: Vec<AttendeeSlot>,
    /// Units already bound by an earlier, partially failed reconciliation.
    #[serde(default)]
    pub bound_units: Vec<UnitCorrelationId>,
    /// Placeholder picked for each unit, persisted before any write.
    #[serde(default)]
    pub claims: Vec<PlaceholderClaim>,
}

impl PendingCheckout {
    /// The placeholder claimed for `unit`, if any.
    #[must_use]
    pub fn claim_for(&self, unit: UnitCorrelationId) -> Option<PlaceholderId> {
        self.claims
            .iter()
            .find(|claim| claim.unit_id == unit)
            .map(|claim| claim.placeholder_id)
    }
}

/// A unit paired with the placeholder it will be written onto.
///
/// Once claimed, the pairing survives re-runs even though the set of open
/// placeholders shrinks as writes succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceholderClaim {
    pub unit_id: UnitCorrelationId,
    pub placeholder_id: PlaceholderId,
}

/// A server-side ticket record created at order time, awaiting attendee data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceholderAttendee {
    pub id: PlaceholderId,
    pub user_id: UserId,
    pub ticket_type_id: EventTicketTypeId,
    pub created_at: DateTime<Utc>,
    /// Echo of [`AttendeeSlot::unit_id`] when the order backend threads it through.
    #[serde(default)]
    pub correlation_id: Option<UnitCorrelationId>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_slots_get_distinct_unit_ids() {
        assert_ne!(AttendeeSlot::blank().unit_id, AttendeeSlot::blank().unit_id);
    }

    #[test]
    fn test_is_named_ignores_whitespace() {
        let mut slot = AttendeeSlot::blank();
        slot.first_name = "Lucía".to_string();
        slot.last_name = "  ".to_string();
        assert!(!slot.is_named());
        slot.last_name = "Fernández".to_string();
        assert!(slot.is_named());
    }

    #[test]
    fn test_details_drop_blank_optional_fields() {
        let mut slot = AttendeeSlot::blank();
        slot.first_name = " Ana ".to_string();
        slot.last_name = "Souza".to_string();
        slot.phone = "   ".to_string();
        slot.email = "ana@example.com".to_string();

        let details = slot.details();
        assert_eq!(details.first_name, "Ana");
        assert_eq!(details.email.as_deref(), Some("ana@example.com"));
        assert_eq!(details.phone, None);
    }

    #[test]
    fn test_pending_checkout_defaults_bound_units() {
        let json = r#"{"orderId":5,"ticketItems":[],"attendees":[]}"#;
        let pending: PendingCheckout = serde_json::from_str(json).unwrap();
        assert_eq!(pending.order_id, OrderId::new(5));
        assert!(pending.bound_units.is_empty());
        assert!(pending.claims.is_empty());
    }

    #[test]
    fn test_claim_for_finds_the_unit() {
        let slot = AttendeeSlot::blank();
        let pending = PendingCheckout {
            order_id: OrderId::new(5),
            ticket_items: Vec::new(),
            attendees: vec![slot.clone()],
            bound_units: Vec::new(),
            claims: vec![PlaceholderClaim {
                unit_id: slot.unit_id,
                placeholder_id: PlaceholderId::new(9),
            }],
        };
        assert_eq!(pending.claim_for(slot.unit_id), Some(PlaceholderId::new(9)));
        assert_eq!(pending.claim_for(UnitCorrelationId::generate()), None);
    }
}
