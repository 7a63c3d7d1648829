//! Integration tests for the checkout wizard, pricing and payment handoff.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::Utc;

use danceflow_checkout::error::ValidationReason;
use danceflow_checkout::handoff::PendingCheckoutStore;
use danceflow_checkout::services::AuthError;
use danceflow_checkout::testing::{FailingKeyValueStore, FakeAuthSession, StubFailure};
use danceflow_checkout::{CheckoutError, CheckoutSession, ValidationError, WizardStep};
use danceflow_core::{GuestSessionId, Price};
use danceflow_integration_tests::{
    BUYER, TestContext, fill_contact, name_attendees, product_a, product_b, ticket_x,
};

/// Walk a session with tickets and merchandise to a ready-to-submit Contact step.
fn prepare(session: &mut CheckoutSession) {
    assert_eq!(session.advance().unwrap(), WizardStep::Attendees);
    name_attendees(session);
    assert_eq!(session.advance().unwrap(), WizardStep::Contact);
    fill_contact(session);
}

// =============================================================================
// Wizard
// =============================================================================

#[tokio::test]
async fn test_blank_attendee_keeps_wizard_on_attendees() {
    let ctx = TestContext::new();
    let mut session = ctx.signed_in(false).await;
    session.add_ticket(ticket_x(), 3).await.unwrap();

    assert_eq!(session.advance().unwrap(), WizardStep::Attendees);
    assert_eq!(session.attendees().len(), 3);

    for i in 0..2 {
        let slot = session.attendee_mut(i).unwrap();
        slot.first_name = "Dancer".to_string();
        slot.last_name = i.to_string();
    }

    let err = session.advance().unwrap_err();
    assert!(matches!(
        err,
        CheckoutError::Validation(ValidationError::IncompleteAttendees { ref missing }) if missing == &[2]
    ));
    assert_eq!(session.step(), WizardStep::Attendees);
    assert!(session.message().is_some());
}

#[tokio::test]
async fn test_merchandise_only_cart_skips_attendees() {
    let ctx = TestContext::new();
    let mut session = ctx.signed_in(false).await;
    session.add_product(product_a(), 1, None).await.unwrap();

    assert_eq!(session.advance().unwrap(), WizardStep::Contact);
    assert!(session.attendees().is_empty());
    assert_eq!(session.back(), WizardStep::Cart);
}

#[tokio::test]
async fn test_empty_cart_cannot_advance() {
    let ctx = TestContext::new();
    let mut session = ctx.signed_in(false).await;

    let err = session.advance().unwrap_err();
    assert!(matches!(err, CheckoutError::Validation(ValidationError::EmptyCart)));
    assert_eq!(session.step(), WizardStep::Cart);
}

// =============================================================================
// Pricing
// =============================================================================

#[tokio::test]
async fn test_member_prices_ticket_and_product() {
    let ctx = TestContext::new();
    let mut session = ctx.signed_in(true).await;
    session.add_ticket(ticket_x(), 1).await.unwrap();
    session.add_product(product_b(), 1, None).await.unwrap();

    let totals = session.totals();
    assert_eq!(totals.total, Price::from_cents(7200));
    assert_eq!(totals.savings, Price::from_cents(800));
}

#[tokio::test]
async fn test_non_member_pays_base_prices() {
    let ctx = TestContext::new();
    let mut session = ctx.signed_in(false).await;
    session.add_ticket(ticket_x(), 1).await.unwrap();
    session.add_product(product_b(), 1, None).await.unwrap();

    let totals = session.totals();
    assert_eq!(totals.total, Price::from_cents(8000));
    assert_eq!(totals.savings, Price::ZERO);
}

// =============================================================================
// Handoff
// =============================================================================

#[tokio::test]
async fn test_submit_creates_order_payment_and_pending_record() {
    let ctx = TestContext::new();
    let mut session = ctx.signed_in(true).await;
    session.add_ticket(ticket_x(), 2).await.unwrap();
    session.add_product(product_a(), 1, None).await.unwrap();
    prepare(&mut session);

    let redirect = session.submit().await.unwrap();

    assert!(redirect.checkout_url.starts_with("https://pay.example/"));
    assert!(session.cart().is_empty());
    assert!(ctx.cart_rows.snapshot(BUYER).await.is_empty());
    assert_eq!(session.step(), WizardStep::Cart);

    let requests = ctx.orders.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].ticket_items[0].unit_price, Price::from_cents(2700));
    assert_eq!(requests[0].product_items[0].unit_price, Price::from_cents(1500));
    assert_eq!(requests[0].attendees_by_ticket_type[&ticket_x().id].len(), 2);

    let payments = ctx.payments.requests().await;
    assert_eq!(payments[0].metadata["order_id"], redirect.order_id.to_string());
    assert_eq!(payments[0].metadata["user_id"], BUYER.to_string());

    let pending = PendingCheckoutStore::new(ctx.handoff.clone())
        .load()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.order_id, redirect.order_id);
    assert_eq!(pending.attendees.len(), 2);
    assert_eq!(pending.ticket_items[0].ticket_type.id, ticket_x().id);
}

#[tokio::test]
async fn test_rejected_order_leaves_cart_and_writes_no_record() {
    let ctx = TestContext::new();
    let mut session = ctx.signed_in(false).await;
    session.add_ticket(ticket_x(), 1).await.unwrap();
    prepare(&mut session);
    let before = session.cart();

    ctx.orders
        .fail_next(StubFailure::Rejected(vec![ValidationReason::OutOfStock {
            item: "Full pass".to_string(),
            available: 0,
        }]))
        .await;
    let err = session.submit().await.unwrap_err();

    assert!(matches!(err, CheckoutError::Validation(ValidationError::Rejected { .. })));
    assert_eq!(session.cart(), before);
    assert_eq!(ctx.cart_rows.snapshot(BUYER).await, before);
    assert!(ctx.handoff.is_empty().await);
    assert_eq!(session.step(), WizardStep::Contact);
    assert!(session.message().unwrap().contains("out of stock"));
}

#[tokio::test]
async fn test_payment_failure_leaves_cart_and_writes_no_record() {
    let ctx = TestContext::new();
    let mut session = ctx.signed_in(false).await;
    session.add_ticket(ticket_x(), 1).await.unwrap();
    prepare(&mut session);
    let before = session.cart();

    ctx.payments.fail(true);
    let err = session.submit().await.unwrap_err();

    assert!(matches!(err, CheckoutError::ExternalService(_)));
    assert_eq!(session.cart(), before);
    assert!(ctx.handoff.is_empty().await);
}

#[tokio::test]
async fn test_unwritable_handoff_store_leaves_cart_untouched() {
    let ctx = TestContext::new();
    let mut session = CheckoutSession::open_authenticated(
        ctx.services.clone(),
        Arc::new(FakeAuthSession::signed_in(BUYER, false)),
        Arc::new(FailingKeyValueStore),
    )
    .await
    .unwrap();
    session.add_ticket(ticket_x(), 1).await.unwrap();
    prepare(&mut session);
    let before = session.cart();

    let err = session.submit().await.unwrap_err();

    assert!(matches!(err, CheckoutError::Handoff(_)));
    assert_eq!(session.cart(), before);
    assert_eq!(ctx.cart_rows.snapshot(BUYER).await, before);
}

#[tokio::test]
async fn test_cart_clear_failure_removes_pending_record() {
    let ctx = TestContext::new();
    let mut session = ctx.signed_in(false).await;
    session.add_ticket(ticket_x(), 1).await.unwrap();
    prepare(&mut session);
    let before = session.cart();

    ctx.cart_rows.fail_writes(true);
    let err = session.submit().await.unwrap_err();

    assert!(matches!(err, CheckoutError::RemoteWrite(_)));
    assert_eq!(session.cart(), before);
    assert!(ctx.handoff.is_empty().await);
}

#[tokio::test]
async fn test_guest_cannot_submit() {
    let ctx = TestContext::new();
    let mut session = ctx.guest(GuestSessionId::generate()).await;
    session.add_product(product_a(), 1, None).await.unwrap();
    assert_eq!(session.advance().unwrap(), WizardStep::Contact);
    fill_contact(&mut session);

    let err = session.submit().await.unwrap_err();
    assert!(matches!(err, CheckoutError::Auth(AuthError::SignInRequired)));
    assert!(ctx.orders.requests().await.is_empty());
}

#[tokio::test]
async fn test_expiring_session_is_refreshed_before_ordering() {
    let ctx = TestContext::new();
    let auth = Arc::new(
        FakeAuthSession::signed_in(BUYER, false).expiring_at(Utc::now() + chrono::Duration::seconds(5)),
    );
    let mut session = ctx.open(auth.clone()).await;
    session.add_ticket(ticket_x(), 1).await.unwrap();
    prepare(&mut session);

    session.submit().await.unwrap();
    assert_eq!(auth.refresh_count(), 1);
}

#[tokio::test]
async fn test_expired_session_blocks_order_creation() {
    let ctx = TestContext::new();
    let auth = Arc::new(
        FakeAuthSession::signed_in(BUYER, false).expiring_at(Utc::now() + chrono::Duration::seconds(5)),
    );
    auth.fail_refresh(true);
    let mut session = ctx.open(auth).await;
    session.add_ticket(ticket_x(), 1).await.unwrap();
    prepare(&mut session);
    let before = session.cart();

    let err = session.submit().await.unwrap_err();
    assert!(matches!(err, CheckoutError::Auth(_)));
    assert!(ctx.orders.requests().await.is_empty());
    assert_eq!(session.cart(), before);
}
