//! Attendee slot allocation.
//!
//! Ticket lines are flattened into one slot per unit, walking lines in list
//! order and units within a line. Every consumer of slots (the wizard, the
//! order request, the reconciler) uses this same walk, so slot `i` always
//! refers to the same physical ticket.

use std::collections::BTreeMap;

use thiserror::Error;

use danceflow_core::{AttendeeSlot, EventTicketTypeId, TicketLineItem};

/// Slots and ticket lines disagree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("expected {expected} attendee slots, found {actual}")]
    SlotCountMismatch { expected: usize, actual: usize },
}

/// Number of slots the given ticket lines need.
#[must_use]
pub fn required_slots(tickets: &[TicketLineItem]) -> usize {
    tickets.iter().map(|t| t.quantity as usize).sum()
}

/// One blank slot per ticket unit, each with a fresh correlation id.
#[must_use]
pub fn flatten(tickets: &[TicketLineItem]) -> Vec<AttendeeSlot> {
    (0..required_slots(tickets)).map(|_| AttendeeSlot::blank()).collect()
}

/// Resize `previous` to fit `tickets`.
///
/// Entries are copied by index and new indices start blank. Data survives
/// intact only when units are added or removed at the tail; shrinking an
/// earlier line shifts later attendees onto different tickets.
#[must_use]
pub fn reflatten(previous: &[AttendeeSlot], tickets: &[TicketLineItem]) -> Vec<AttendeeSlot> {
    let required = required_slots(tickets);
    (0..required)
        .map(|i| previous.get(i).cloned().unwrap_or_else(AttendeeSlot::blank))
        .collect()
}

/// Split `slots` into per-line runs, in line order.
///
/// # Errors
///
/// Returns `AllocationError::SlotCountMismatch` if the slot count differs from
/// the total ticket quantity.
pub fn slots_for<'a>(
    slots: &'a [AttendeeSlot],
    tickets: &[TicketLineItem],
) -> Result<Vec<(EventTicketTypeId, &'a [AttendeeSlot])>, AllocationError> {
    let expected = required_slots(tickets);
    if slots.len() != expected {
        return Err(AllocationError::SlotCountMismatch {
            expected,
            actual: slots.len(),
        });
    }

    let mut offset = 0;
    Ok(tickets
        .iter()
        .map(|line| {
            let end = offset + line.quantity as usize;
            let run = &slots[offset..end];
            offset = end;
            (line.ticket_type.id, run)
        })
        .collect())
}

/// Regroup `slots` by ticket type, the inverse of [`flatten`].
///
/// # Errors
///
/// See [`slots_for`].
pub fn group(
    slots: &[AttendeeSlot],
    tickets: &[TicketLineItem],
) -> Result<BTreeMap<EventTicketTypeId, Vec<AttendeeSlot>>, AllocationError> {
    let mut grouped: BTreeMap<EventTicketTypeId, Vec<AttendeeSlot>> = BTreeMap::new();
    for (ticket_type, run) in slots_for(slots, tickets)? {
        grouped.entry(ticket_type).or_default().extend_from_slice(run);
    }
    Ok(grouped)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use danceflow_core::{EventId, Price, TicketTypeRef};
    use proptest::prelude::*;

    use super::*;

    fn line(id: i32, quantity: u32) -> TicketLineItem {
        TicketLineItem {
            ticket_type: TicketTypeRef {
                id: EventTicketTypeId::new(id),
                event_id: EventId::new(1),
                event_name: "Lindy Exchange".to_string(),
                category: format!("Type {id}"),
                price: Price::from_cents(2500),
                member_price: None,
            },
            quantity,
            server_row_id: None,
        }
    }

    fn named(first: &str) -> AttendeeSlot {
        let mut slot = AttendeeSlot::blank();
        slot.first_name = first.to_string();
        slot.last_name = "Doe".to_string();
        slot
    }

    #[test]
    fn test_group_walks_lines_in_order() {
        let tickets = vec![line(2, 2), line(1, 1)];
        let slots = vec![named("a"), named("b"), named("c")];

        let grouped = group(&slots, &tickets).unwrap();
        let firsts = |id| {
            grouped[&EventTicketTypeId::new(id)]
                .iter()
                .map(|s| s.first_name.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(firsts(2), vec!["a", "b"]);
        assert_eq!(firsts(1), vec!["c"]);
    }

    #[test]
    fn test_group_rejects_wrong_slot_count() {
        let err = group(&[named("a")], &[line(1, 2)]).unwrap_err();
        assert_eq!(err, AllocationError::SlotCountMismatch { expected: 2, actual: 1 });
    }

    #[test]
    fn test_reflatten_keeps_tail_additions() {
        let previous = vec![named("a"), named("b")];
        let slots = reflatten(&previous, &[line(1, 2), line(2, 1)]);
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[..2], previous[..]);
        assert!(!slots[2].is_named());
    }

    #[test]
    fn test_reflatten_shrinking_earlier_line_shifts_data() {
        let previous = vec![named("x1"), named("x2"), named("y1")];
        let slots = reflatten(&previous, &[line(1, 1), line(2, 1)]);
        // "x2" now sits on the ticket that belonged to "y1".
        assert_eq!(slots[1].first_name, "x2");
    }

    fn lines_strategy() -> impl Strategy<Value = Vec<TicketLineItem>> {
        prop::collection::vec(0u32..5, 0..5).prop_map(|quantities| {
            quantities
                .into_iter()
                .enumerate()
                .map(|(i, q)| line(i32::try_from(i).unwrap(), q))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_slot_count_matches_quantities(
            before in lines_strategy(),
            after in lines_strategy(),
        ) {
            let slots = flatten(&before);
            prop_assert_eq!(slots.len(), required_slots(&before));
            let resized = reflatten(&slots, &after);
            prop_assert_eq!(resized.len(), required_slots(&after));
        }

        #[test]
        fn prop_group_partitions_every_slot(tickets in lines_strategy()) {
            let slots = flatten(&tickets);
            let grouped = group(&slots, &tickets).unwrap();
            let regrouped: Vec<_> = tickets
                .iter()
                .flat_map(|t| grouped[&t.ticket_type.id].iter().cloned())
                .collect();
            prop_assert_eq!(regrouped, slots);
        }
    }
}
