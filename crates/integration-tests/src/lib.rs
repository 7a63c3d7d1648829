//! Integration tests for the Danceflow checkout engine.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p danceflow-integration-tests
//! ```
//!
//! Every collaborator is an in-memory fake from `danceflow_checkout::testing`,
//! so no database or network is needed.
//!
//! # Test Categories
//!
//! - `cart_sync` - Guest and signed-in carts, sign-in transitions, rollback
//! - `checkout_flow` - Wizard, pricing and payment handoff
//! - `reconciliation` - Binding attendees to placeholders after payment

use std::sync::Arc;

use url::Url;

use danceflow_checkout::cart::SignInPolicy;
use danceflow_checkout::handoff::MemoryKeyValueStore;
use danceflow_checkout::testing::{
    FakeAuthSession, MemoryCartRows, MemoryPlaceholders, StubOrderService, StubPaymentService,
};
use danceflow_checkout::{CheckoutServices, CheckoutSession, CheckoutSettings};
use danceflow_core::{
    EventId, EventTicketTypeId, GuestSessionId, Price, ProductId, ProductRef, ShippingAddress,
    TicketTypeRef, UserId,
};

/// The signed-in buyer used throughout the tests.
pub const BUYER: UserId = UserId::new(7);

/// Fakes wired into a [`CheckoutServices`].
pub struct TestContext {
    pub services: CheckoutServices,
    pub cart_rows: Arc<MemoryCartRows>,
    pub placeholders: Arc<MemoryPlaceholders>,
    pub orders: Arc<StubOrderService>,
    pub payments: Arc<StubPaymentService>,
    pub handoff: Arc<MemoryKeyValueStore>,
}

impl TestContext {
    /// Services with the default sign-in policy. The order service creates
    /// placeholders for [`BUYER`] without echoing unit ids.
    pub fn new() -> Self {
        Self::build(SignInPolicy::default(), false)
    }

    /// Services with the given sign-in policy.
    pub fn with_policy(policy: SignInPolicy) -> Self {
        Self::build(policy, false)
    }

    /// Services whose order backend threads unit ids onto placeholders.
    pub fn with_correlation() -> Self {
        Self::build(SignInPolicy::default(), true)
    }

    fn build(policy: SignInPolicy, echo_unit_ids: bool) -> Self {
        let base_url = Url::parse("https://academy.example").expect("static url parses");
        let mut settings = CheckoutSettings::new(base_url);
        settings.sign_in_policy = policy;

        let cart_rows = Arc::new(MemoryCartRows::new());
        let placeholders = Arc::new(MemoryPlaceholders::new());
        let orders = Arc::new(StubOrderService::new().with_placeholders(
            placeholders.clone(),
            BUYER,
            echo_unit_ids,
        ));
        let payments = Arc::new(StubPaymentService::new());

        let services = CheckoutServices::new(
            settings,
            cart_rows.clone(),
            placeholders.clone(),
            orders.clone(),
            payments.clone(),
        );

        Self {
            services,
            cart_rows,
            placeholders,
            orders,
            payments,
            handoff: Arc::new(MemoryKeyValueStore::new()),
        }
    }

    /// Open a session for the anonymous visitor `guest`.
    pub async fn guest(&self, guest: GuestSessionId) -> CheckoutSession {
        CheckoutSession::open_guest(self.services.clone(), guest, self.handoff.clone()).await
    }

    /// Open a session for [`BUYER`].
    pub async fn signed_in(&self, is_member: bool) -> CheckoutSession {
        self.open(Arc::new(FakeAuthSession::signed_in(BUYER, is_member))).await
    }

    /// Open a session over `auth`.
    pub async fn open(&self, auth: Arc<FakeAuthSession>) -> CheckoutSession {
        match CheckoutSession::open_authenticated(self.services.clone(), auth, self.handoff.clone()).await {
            Ok(session) => session,
            Err(e) => panic!("signed-in session should open: {e}"),
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Product A: 20.00, members 15.00.
#[must_use]
pub fn product_a() -> ProductRef {
    ProductRef {
        id: ProductId::new(1),
        name: "Practice shoes".to_string(),
        price: Price::from_cents(2000),
        member_price: Some(Price::from_cents(1500)),
        categories: Vec::new(),
    }
}

/// Product B: 50.00, members 45.00.
#[must_use]
pub fn product_b() -> ProductRef {
    ProductRef {
        id: ProductId::new(2),
        name: "Academy hoodie".to_string(),
        price: Price::from_cents(5000),
        member_price: Some(Price::from_cents(4500)),
        categories: Vec::new(),
    }
}

/// Ticket type X: 30.00, members 27.00.
#[must_use]
pub fn ticket_x() -> TicketTypeRef {
    ticket(10, "Full pass", 3000, Some(2700))
}

/// Ticket type Y: 15.00, no member price.
#[must_use]
pub fn ticket_y() -> TicketTypeRef {
    ticket(11, "Saturday party", 1500, None)
}

fn ticket(id: i32, category: &str, cents: i64, member_cents: Option<i64>) -> TicketTypeRef {
    TicketTypeRef {
        id: EventTicketTypeId::new(id),
        event_id: EventId::new(3),
        event_name: "Spring Salsa Weekender".to_string(),
        category: category.to_string(),
        price: Price::from_cents(cents),
        member_price: member_cents.map(Price::from_cents),
    }
}

/// Name every attendee slot `Attendee <i>`.
pub fn name_attendees(session: &mut CheckoutSession) {
    for i in 0..session.attendees().len() {
        if let Some(slot) = session.attendee_mut(i) {
            slot.first_name = "Attendee".to_string();
            slot.last_name = i.to_string();
        }
    }
}

/// Fill in buyer contact details, with a shipping address.
pub fn fill_contact(session: &mut CheckoutSession) {
    let contact = session.contact_mut();
    contact.name = "Marisol Vega".to_string();
    contact.email = "marisol@example.com".to_string();
    contact.phone = "+1 555 0100".to_string();
    contact.shipping = Some(ShippingAddress {
        line1: "12 Dance St".to_string(),
        line2: None,
        city: "Portland".to_string(),
        region: Some("OR".to_string()),
        postal_code: "97201".to_string(),
        country: "US".to_string(),
    });
}
