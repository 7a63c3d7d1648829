//! Post-payment attendee reconciliation.
//!
//! The order service created one placeholder ticket record per unit. After the
//! buyer returns from payment, the attendee slots saved in the handoff record
//! are written onto those placeholders:
//!
//! 1. A placeholder carrying the `unit_id` of one of our slots is bound to that
//!    slot directly.
//! 2. A placeholder carrying a `unit_id` we do not know belongs to another
//!    order and is left alone.
//! 3. Placeholders without a `unit_id` are paired per ticket type, oldest
//!    first, with the remaining slots of that type in allocation order.
//!
//! Every pairing is claimed and persisted before the first write, so a re-run
//! keeps each unit on the placeholder it was first paired with. Failed units
//! stay in the handoff record, and a re-run binds only what is still open.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use danceflow_core::{
    AttendeeSlot, EventTicketTypeId, OrderId, PendingCheckout, PlaceholderAttendee, PlaceholderClaim,
    PlaceholderId, UnitCorrelationId, UserId,
};

use crate::attendees;
use crate::db::PlaceholderRepository;
use crate::error::{CheckoutError, RemoteError, Result, add_breadcrumb};
use crate::handoff::{HandoffStoreError, PendingCheckoutStore};

/// Where the buyer goes after reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NextView {
    /// Nothing to reconcile.
    Cart,
    /// Every attendee is on a ticket.
    Tickets,
    /// Some attendees are still unassigned; a re-run may finish the job.
    RetryReconciliation,
}

impl NextView {
    /// The view to show when reconciliation failed outright.
    #[must_use]
    pub const fn after_failure(err: &CheckoutError) -> Self {
        match err {
            CheckoutError::NoPendingCheckout => Self::Cart,
            _ => Self::RetryReconciliation,
        }
    }
}

/// An attendee written onto a placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignedAttendee {
    pub unit_id: UnitCorrelationId,
    pub placeholder_id: PlaceholderId,
    pub ticket_type_id: EventTicketTypeId,
}

/// An attendee still waiting for a placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedAttendee {
    pub unit_id: UnitCorrelationId,
    pub ticket_type_id: EventTicketTypeId,
    /// The placeholder the write was attempted on, if one was available.
    pub placeholder_id: Option<PlaceholderId>,
    pub reason: String,
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub order_id: OrderId,
    pub assigned: Vec<AssignedAttendee>,
    pub unresolved: Vec<UnresolvedAttendee>,
    pub next: NextView,
}

/// Durable home of a record's claims and bound units.
#[async_trait]
pub trait ReconcileProgress: Send + Sync {
    async fn save_progress(&self, record: &PendingCheckout) -> std::result::Result<(), HandoffStoreError>;
}

#[async_trait]
impl ReconcileProgress for PendingCheckoutStore {
    async fn save_progress(&self, record: &PendingCheckout) -> std::result::Result<(), HandoffStoreError> {
        self.record_progress(record).await
    }
}

/// A planned slot-to-placeholder binding.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding<'a> {
    ticket_type_id: EventTicketTypeId,
    slot: &'a AttendeeSlot,
    placeholder: Option<PlaceholderId>,
}

/// Binds handoff attendees to placeholder records.
pub struct AttendeeReconciler<'a> {
    placeholders: &'a dyn PlaceholderRepository,
}

impl<'a> AttendeeReconciler<'a> {
    #[must_use]
    pub const fn new(placeholders: &'a dyn PlaceholderRepository) -> Self {
        Self { placeholders }
    }

    /// Reconcile the pending checkout of `user`.
    ///
    /// Safe to call repeatedly: a complete run deletes the record, a partial
    /// one leaves its claims and bound units behind for the next run.
    ///
    /// # Errors
    ///
    /// - `NoPendingCheckout` when there is no handoff record
    /// - `RemoteRead` when placeholders cannot be fetched
    /// - `Validation` when the record's slots do not match its ticket lines
    /// - `Handoff` when the record cannot be read or its claims cannot be saved
    #[instrument(skip(self, pending), fields(user_id = %user))]
    pub async fn reconcile(&self, user: UserId, pending: &PendingCheckoutStore) -> Result<ReconcileReport> {
        let mut record = pending.load().await?.ok_or(CheckoutError::NoPendingCheckout)?;
        let report = self.reconcile_record(user, &mut record, pending).await?;

        if report.unresolved.is_empty() {
            pending.delete().await?;
            info!(order_id = %record.order_id, assigned = report.assigned.len(), "Attendees reconciled");
        } else {
            warn!(
                order_id = %record.order_id,
                assigned = report.assigned.len(),
                unresolved = report.unresolved.len(),
                "Attendee reconciliation incomplete"
            );
        }

        add_breadcrumb(
            "reconcile",
            "run",
            &[
                ("order_id", record.order_id.to_string()),
                ("unresolved", report.unresolved.len().to_string()),
            ],
        );
        Ok(report)
    }

    /// Bind and write one record, keeping `record` and `progress` current.
    ///
    /// New claims are saved before any write. Each successful write adds its
    /// unit to `record.bound_units` and saves again. A claimed placeholder that
    /// is no longer open counts as bound, so a run whose progress was not saved
    /// never pairs that unit a second time.
    ///
    /// # Errors
    ///
    /// See [`reconcile`](Self::reconcile). Nothing is written when the claims
    /// cannot be saved.
    pub async fn reconcile_record(
        &self,
        user: UserId,
        record: &mut PendingCheckout,
        progress: &dyn ReconcileProgress,
    ) -> Result<ReconcileReport> {
        let runs = attendees::slots_for(&record.attendees, &record.ticket_items)?;

        let mut ticket_types: Vec<EventTicketTypeId> = Vec::new();
        for (ticket_type, _) in &runs {
            if !ticket_types.contains(ticket_type) {
                ticket_types.push(*ticket_type);
            }
        }

        let placeholders = self
            .placeholders
            .unassigned(user, &ticket_types)
            .await
            .map_err(|e| CheckoutError::RemoteRead(RemoteError::Repository(e)))?;
        let open: HashSet<PlaceholderId> = placeholders.iter().map(|p| p.id).collect();

        let mut dirty = false;
        for claim in &record.claims {
            if !open.contains(&claim.placeholder_id) && !record.bound_units.contains(&claim.unit_id) {
                info!(
                    placeholder_id = %claim.placeholder_id,
                    unit_id = %claim.unit_id,
                    "Claimed placeholder already assigned"
                );
                record.bound_units.push(claim.unit_id);
                dirty = true;
            }
        }

        let bound: HashSet<UnitCorrelationId> = record.bound_units.iter().copied().collect();
        let claimed: HashMap<UnitCorrelationId, PlaceholderId> = record
            .claims
            .iter()
            .map(|claim| (claim.unit_id, claim.placeholder_id))
            .collect();
        let bindings = plan(&runs, &bound, &claimed, &placeholders);

        let fresh: Vec<PlaceholderClaim> = bindings
            .iter()
            .filter(|binding| !claimed.contains_key(&binding.slot.unit_id))
            .filter_map(|binding| {
                binding.placeholder.map(|placeholder_id| PlaceholderClaim {
                    unit_id: binding.slot.unit_id,
                    placeholder_id,
                })
            })
            .collect();
        if !fresh.is_empty() {
            record.claims.extend(fresh);
            dirty = true;
        }
        if dirty {
            progress.save_progress(record).await?;
        }

        let mut assigned = Vec::new();
        let mut unresolved = Vec::new();
        for binding in bindings {
            let Some(placeholder_id) = binding.placeholder else {
                unresolved.push(UnresolvedAttendee {
                    unit_id: binding.slot.unit_id,
                    ticket_type_id: binding.ticket_type_id,
                    placeholder_id: None,
                    reason: "no unassigned placeholder available".to_string(),
                });
                continue;
            };

            match self.placeholders.assign(placeholder_id, &binding.slot.details()).await {
                Ok(()) => {
                    record.bound_units.push(binding.slot.unit_id);
                    if let Err(e) = progress.save_progress(record).await {
                        warn!(error = %e, unit_id = %binding.slot.unit_id, "Failed to save bound unit");
                    }
                    assigned.push(AssignedAttendee {
                        unit_id: binding.slot.unit_id,
                        placeholder_id,
                        ticket_type_id: binding.ticket_type_id,
                    });
                }
                Err(e) => {
                    error!(
                        error = %e,
                        placeholder_id = %placeholder_id,
                        unit_id = %binding.slot.unit_id,
                        "Failed to assign attendee"
                    );
                    unresolved.push(UnresolvedAttendee {
                        unit_id: binding.slot.unit_id,
                        ticket_type_id: binding.ticket_type_id,
                        placeholder_id: Some(placeholder_id),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let next = if unresolved.is_empty() {
            NextView::Tickets
        } else {
            NextView::RetryReconciliation
        };
        Ok(ReconcileReport {
            order_id: record.order_id,
            assigned,
            unresolved,
            next,
        })
    }
}

/// Pair every open slot with a placeholder: earlier claims first, then
/// correlation ids, then creation order.
///
/// `placeholders` must be ordered by creation time. Claimed placeholders are
/// never handed to another slot. Slots without a match are returned with
/// `placeholder: None`.
fn plan<'a>(
    runs: &[(EventTicketTypeId, &'a [AttendeeSlot])],
    bound: &HashSet<UnitCorrelationId>,
    claimed: &HashMap<UnitCorrelationId, PlaceholderId>,
    placeholders: &[PlaceholderAttendee],
) -> Vec<Binding<'a>> {
    let open: Vec<(EventTicketTypeId, &'a AttendeeSlot)> = runs
        .iter()
        .flat_map(|(ticket_type, slots)| slots.iter().map(move |slot| (*ticket_type, slot)))
        .filter(|(_, slot)| !bound.contains(&slot.unit_id))
        .collect();

    let by_unit: HashMap<UnitCorrelationId, EventTicketTypeId> =
        open.iter().map(|(t, slot)| (slot.unit_id, *t)).collect();
    let taken: HashSet<PlaceholderId> = claimed.values().copied().collect();

    let mut correlated: HashMap<UnitCorrelationId, PlaceholderId> = HashMap::new();
    let mut positional: HashMap<EventTicketTypeId, Vec<PlaceholderId>> = HashMap::new();
    for placeholder in placeholders.iter().filter(|p| !taken.contains(&p.id)) {
        match placeholder.correlation_id {
            Some(unit) if by_unit.get(&unit) == Some(&placeholder.ticket_type_id) => {
                correlated.insert(unit, placeholder.id);
            }
            Some(_) => {}
            None => positional
                .entry(placeholder.ticket_type_id)
                .or_default()
                .push(placeholder.id),
        }
    }

    let mut next_positional: HashMap<EventTicketTypeId, usize> = HashMap::new();
    open.into_iter()
        .map(|(ticket_type_id, slot)| {
            let placeholder = claimed
                .get(&slot.unit_id)
                .or_else(|| correlated.get(&slot.unit_id))
                .copied()
                .or_else(|| {
                    let cursor = next_positional.entry(ticket_type_id).or_insert(0);
                    let id = positional.get(&ticket_type_id)?.get(*cursor).copied()?;
                    *cursor += 1;
                    Some(id)
                });
            Binding {
                ticket_type_id,
                slot,
                placeholder,
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use danceflow_core::{EventId, Price, TicketLineItem, TicketTypeRef};
    use proptest::prelude::*;

    use super::*;
    use crate::handoff::MemoryKeyValueStore;
    use crate::testing::{FailingKeyValueStore, MemoryPlaceholders};

    const USER: UserId = UserId::new(3);

    fn line(id: i32, quantity: u32) -> TicketLineItem {
        TicketLineItem {
            ticket_type: TicketTypeRef {
                id: EventTicketTypeId::new(id),
                event_id: EventId::new(1),
                event_name: "Forró Festival".to_string(),
                category: format!("Type {id}"),
                price: Price::from_cents(2000),
                member_price: None,
            },
            quantity,
            server_row_id: None,
        }
    }

    fn named(name: &str) -> AttendeeSlot {
        let mut slot = AttendeeSlot::blank();
        slot.first_name = name.to_string();
        slot.last_name = "Costa".to_string();
        slot
    }

    fn record(tickets: Vec<TicketLineItem>, attendees: Vec<AttendeeSlot>) -> PendingCheckout {
        PendingCheckout {
            order_id: OrderId::new(500),
            ticket_items: tickets,
            attendees,
            bound_units: Vec::new(),
            claims: Vec::new(),
        }
    }

    fn at(seconds: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    async fn saved(record: &PendingCheckout) -> PendingCheckoutStore {
        let store = PendingCheckoutStore::new(Arc::new(MemoryKeyValueStore::new()));
        store.save(record).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_missing_record_is_no_pending_checkout() {
        let placeholders = MemoryPlaceholders::new();
        let store = PendingCheckoutStore::new(Arc::new(MemoryKeyValueStore::new()));
        let err = AttendeeReconciler::new(&placeholders)
            .reconcile(USER, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::NoPendingCheckout));
        assert_eq!(NextView::after_failure(&err), NextView::Cart);
    }

    #[tokio::test]
    async fn test_positional_binding_by_creation_order() {
        let placeholders = MemoryPlaceholders::new();
        let p3 = placeholders.insert(USER, EventTicketTypeId::new(1), at(3), None).await;
        let p1 = placeholders.insert(USER, EventTicketTypeId::new(1), at(1), None).await;
        let p2 = placeholders.insert(USER, EventTicketTypeId::new(1), at(2), None).await;

        let record = record(vec![line(1, 3)], vec![named("a"), named("b"), named("c")]);
        let store = saved(&record).await;

        let report = AttendeeReconciler::new(&placeholders)
            .reconcile(USER, &store)
            .await
            .unwrap();

        assert_eq!(report.next, NextView::Tickets);
        assert_eq!(placeholders.assigned(p1).await.unwrap().first_name, "a");
        assert_eq!(placeholders.assigned(p2).await.unwrap().first_name, "b");
        assert_eq!(placeholders.assigned(p3).await.unwrap().first_name, "c");
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_correlation_ids_override_creation_order() {
        let placeholders = MemoryPlaceholders::new();
        let slots = vec![named("a"), named("b")];
        // Created in reverse unit order.
        let for_b = placeholders
            .insert(USER, EventTicketTypeId::new(1), at(1), Some(slots[1].unit_id))
            .await;
        let for_a = placeholders
            .insert(USER, EventTicketTypeId::new(1), at(2), Some(slots[0].unit_id))
            .await;
        let foreign = placeholders
            .insert(USER, EventTicketTypeId::new(1), at(0), Some(UnitCorrelationId::generate()))
            .await;

        let store = saved(&record(vec![line(1, 2)], slots)).await;
        let report = AttendeeReconciler::new(&placeholders)
            .reconcile(USER, &store)
            .await
            .unwrap();

        assert_eq!(report.assigned.len(), 2);
        assert_eq!(placeholders.assigned(for_a).await.unwrap().first_name, "a");
        assert_eq!(placeholders.assigned(for_b).await.unwrap().first_name, "b");
        assert!(placeholders.assigned(foreign).await.is_none());
    }

    #[tokio::test]
    async fn test_partial_failure_then_rerun() {
        let placeholders = MemoryPlaceholders::new();
        let p1 = placeholders.insert(USER, EventTicketTypeId::new(1), at(1), None).await;
        let p2 = placeholders.insert(USER, EventTicketTypeId::new(1), at(2), None).await;
        let p3 = placeholders.insert(USER, EventTicketTypeId::new(1), at(3), None).await;
        placeholders.fail_assign_once(p2).await;

        let store = saved(&record(vec![line(1, 3)], vec![named("a"), named("b"), named("c")])).await;
        let reconciler = AttendeeReconciler::new(&placeholders);

        let first = reconciler.reconcile(USER, &store).await.unwrap();
        assert_eq!(first.next, NextView::RetryReconciliation);
        assert_eq!(first.unresolved.len(), 1);
        assert_eq!(first.unresolved[0].placeholder_id, Some(p2));
        assert_eq!(store.load().await.unwrap().unwrap().bound_units.len(), 2);

        let second = reconciler.reconcile(USER, &store).await.unwrap();
        assert_eq!(second.next, NextView::Tickets);
        assert_eq!(second.assigned.len(), 1);
        assert_eq!(placeholders.assigned(p1).await.unwrap().first_name, "a");
        assert_eq!(placeholders.assigned(p2).await.unwrap().first_name, "b");
        assert_eq!(placeholders.assigned(p3).await.unwrap().first_name, "c");
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rerun_on_same_record_keeps_creation_order() {
        let placeholders = MemoryPlaceholders::new();
        let p1 = placeholders.insert(USER, EventTicketTypeId::new(1), at(1), None).await;
        let p2 = placeholders.insert(USER, EventTicketTypeId::new(1), at(2), None).await;
        let p3 = placeholders.insert(USER, EventTicketTypeId::new(1), at(3), None).await;
        placeholders.fail_assign_once(p2).await;

        let mut pending = record(vec![line(1, 3)], vec![named("a"), named("b"), named("c")]);
        let store = saved(&pending).await;
        let reconciler = AttendeeReconciler::new(&placeholders);

        let first = reconciler.reconcile_record(USER, &mut pending, &store).await.unwrap();
        assert_eq!(first.assigned.len(), 2);
        assert_eq!(pending.bound_units.len(), 2);
        assert_eq!(pending.claims.len(), 3);

        let second = reconciler.reconcile_record(USER, &mut pending, &store).await.unwrap();
        assert_eq!(second.assigned.len(), 1);
        assert_eq!(second.next, NextView::Tickets);
        assert_eq!(placeholders.assigned(p1).await.unwrap().first_name, "a");
        assert_eq!(placeholders.assigned(p2).await.unwrap().first_name, "b");
        assert_eq!(placeholders.assigned(p3).await.unwrap().first_name, "c");
        assert_eq!(store.load().await.unwrap(), Some(pending));
    }

    #[tokio::test]
    async fn test_lost_bound_units_are_recovered_from_claims() {
        let placeholders = MemoryPlaceholders::new();
        let p1 = placeholders.insert(USER, EventTicketTypeId::new(1), at(1), None).await;
        let p2 = placeholders.insert(USER, EventTicketTypeId::new(1), at(2), None).await;
        let p3 = placeholders.insert(USER, EventTicketTypeId::new(1), at(3), None).await;
        placeholders.fail_assign_once(p2).await;

        let mut pending = record(vec![line(1, 3)], vec![named("a"), named("b"), named("c")]);
        let store = saved(&pending).await;
        let reconciler = AttendeeReconciler::new(&placeholders);
        reconciler.reconcile_record(USER, &mut pending, &store).await.unwrap();

        // Writes landed but their bound units were never saved.
        pending.bound_units.clear();
        let second = reconciler.reconcile_record(USER, &mut pending, &store).await.unwrap();

        assert_eq!(second.assigned.len(), 1);
        assert_eq!(second.assigned[0].placeholder_id, p2);
        assert_eq!(pending.bound_units.len(), 3);
        assert_eq!(placeholders.assigned(p1).await.unwrap().first_name, "a");
        assert_eq!(placeholders.assigned(p2).await.unwrap().first_name, "b");
        assert_eq!(placeholders.assigned(p3).await.unwrap().first_name, "c");
    }

    #[tokio::test]
    async fn test_unsaved_claims_block_every_write() {
        let placeholders = MemoryPlaceholders::new();
        placeholders.insert(USER, EventTicketTypeId::new(1), at(1), None).await;
        placeholders.insert(USER, EventTicketTypeId::new(1), at(2), None).await;

        let mut pending = record(vec![line(1, 2)], vec![named("a"), named("b")]);
        let offline = PendingCheckoutStore::new(Arc::new(FailingKeyValueStore));
        let err = AttendeeReconciler::new(&placeholders)
            .reconcile_record(USER, &mut pending, &offline)
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::Handoff(_)));
        assert_eq!(placeholders.unassigned_count(USER).await, 2);
        assert!(pending.bound_units.is_empty());
    }

    #[test]
    fn test_claimed_placeholders_are_not_reused() {
        let tickets = vec![line(1, 2)];
        let slots = vec![named("a"), named("b")];
        let runs = attendees::slots_for(&slots, &tickets).unwrap();
        let placeholder = |id: i32| PlaceholderAttendee {
            id: PlaceholderId::new(id),
            user_id: USER,
            ticket_type_id: EventTicketTypeId::new(1),
            created_at: at(i64::from(id)),
            correlation_id: None,
        };
        // "b" holds p1 from an earlier run, so "a" moves on to p2.
        let claimed = HashMap::from([(slots[1].unit_id, PlaceholderId::new(1))]);
        let bindings = plan(&runs, &HashSet::new(), &claimed, &[placeholder(1), placeholder(2)]);

        assert_eq!(bindings[0].placeholder, Some(PlaceholderId::new(2)));
        assert_eq!(bindings[1].placeholder, Some(PlaceholderId::new(1)));
    }

    #[tokio::test]
    async fn test_missing_placeholders_stay_unresolved() {
        let placeholders = MemoryPlaceholders::new();
        placeholders.insert(USER, EventTicketTypeId::new(1), at(1), None).await;

        let store = saved(&record(vec![line(1, 2)], vec![named("a"), named("b")])).await;
        let report = AttendeeReconciler::new(&placeholders)
            .reconcile(USER, &store)
            .await
            .unwrap();

        assert_eq!(report.assigned.len(), 1);
        assert_eq!(report.unresolved[0].placeholder_id, None);
    }

    #[tokio::test]
    async fn test_placeholder_read_failure_keeps_record() {
        let placeholders = MemoryPlaceholders::new();
        placeholders.fail_reads(true);
        let store = saved(&record(vec![line(1, 1)], vec![named("a")])).await;

        let err = AttendeeReconciler::new(&placeholders)
            .reconcile(USER, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::RemoteRead(_)));
        assert!(store.load().await.unwrap().is_some());
    }

    proptest! {
        #[test]
        fn prop_ith_placeholder_gets_ith_slot_per_type(counts in prop::collection::vec(1u32..4, 1..4)) {
            let tickets: Vec<TicketLineItem> = counts
                .iter()
                .enumerate()
                .map(|(i, q)| line(i32::try_from(i).unwrap(), *q))
                .collect();
            let slots = attendees::flatten(&tickets);
            let runs = attendees::slots_for(&slots, &tickets).unwrap();

            let mut placeholders = Vec::new();
            let mut next_id = 1;
            // Interleave ticket types while keeping creation order within each type.
            for round in 0..4u32 {
                for (i, q) in counts.iter().enumerate() {
                    if round < *q {
                        placeholders.push(PlaceholderAttendee {
                            id: PlaceholderId::new(next_id),
                            user_id: USER,
                            ticket_type_id: EventTicketTypeId::new(i32::try_from(i).unwrap()),
                            created_at: at(i64::from(next_id)),
                            correlation_id: None,
                        });
                        next_id += 1;
                    }
                }
            }

            let bindings = plan(&runs, &HashSet::new(), &HashMap::new(), &placeholders);
            prop_assert_eq!(bindings.len(), slots.len());

            let mut used = HashSet::new();
            for (ticket_type, run) in &runs {
                let expected: Vec<PlaceholderId> = placeholders
                    .iter()
                    .filter(|p| p.ticket_type_id == *ticket_type)
                    .map(|p| p.id)
                    .collect();
                for (i, slot) in run.iter().enumerate() {
                    let binding = bindings.iter().find(|b| b.slot.unit_id == slot.unit_id).unwrap();
                    prop_assert_eq!(binding.placeholder, Some(expected[i]));
                    prop_assert!(used.insert(expected[i]));
                }
            }
        }
    }
}
