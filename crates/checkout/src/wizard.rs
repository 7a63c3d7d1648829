//! The checkout wizard.
//!
//! Three steps, `Cart -> Attendees -> Contact`, with submission as a final
//! check from `Contact`. The Attendees step exists only while the cart holds
//! tickets. Forward moves validate; backward moves never do. A failed forward
//! move keeps the current step and leaves a message for it.

use serde::Serialize;
use tracing::debug;

use danceflow_core::{AttendeeSlot, CartSnapshot, ContactDetails, Email};

use crate::attendees;
use crate::error::{ContactField, ValidationError, add_breadcrumb};

/// A wizard step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    #[default]
    Cart,
    Attendees,
    Contact,
}

impl core::fmt::Display for WizardStep {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Cart => "cart",
            Self::Attendees => "attendees",
            Self::Contact => "contact",
        })
    }
}

/// Wizard state for one session.
#[derive(Debug, Clone, Default)]
pub struct CheckoutWizard {
    step: WizardStep,
    attendees: Vec<AttendeeSlot>,
    contact: ContactDetails,
    message: Option<String>,
}

impl CheckoutWizard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn step(&self) -> WizardStep {
        self.step
    }

    /// Attendee slots in allocation order.
    #[must_use]
    pub fn attendees(&self) -> &[AttendeeSlot] {
        &self.attendees
    }

    /// Edit the slot at `index`.
    pub fn attendee_mut(&mut self, index: usize) -> Option<&mut AttendeeSlot> {
        self.attendees.get_mut(index)
    }

    #[must_use]
    pub const fn contact(&self) -> &ContactDetails {
        &self.contact
    }

    pub const fn contact_mut(&mut self) -> &mut ContactDetails {
        &mut self.contact
    }

    /// Validation message of the last failed action on this step.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Show `message` on the current step.
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    /// Resize attendee slots after a cart change.
    ///
    /// Does nothing while the slot count already matches.
    pub fn sync_attendees(&mut self, cart: &CartSnapshot) {
        let required = cart.ticket_units();
        if self.attendees.len() != required {
            debug!(from = self.attendees.len(), to = required, "Resizing attendee slots");
            self.attendees = attendees::reflatten(&self.attendees, &cart.tickets);
        }
    }

    /// Move forward one step.
    ///
    /// From `Contact` this runs the submission checks and stays on `Contact`.
    ///
    /// # Errors
    ///
    /// Returns the validation failure of the current step; the step is left
    /// unchanged and [`message`](Self::message) describes the problem.
    pub fn advance(&mut self, cart: &CartSnapshot) -> Result<WizardStep, ValidationError> {
        let result = match self.step {
            WizardStep::Cart => self.leave_cart(cart),
            WizardStep::Attendees => self.leave_attendees(cart),
            WizardStep::Contact => self.check_submit(cart).map(|()| WizardStep::Contact),
        };
        self.finish(result, "advance")
    }

    /// Move back one step. Never fails.
    pub fn back(&mut self, cart: &CartSnapshot) -> WizardStep {
        let from = self.step;
        self.step = match self.step {
            WizardStep::Contact if cart.has_tickets() => WizardStep::Attendees,
            WizardStep::Contact | WizardStep::Attendees | WizardStep::Cart => WizardStep::Cart,
        };
        self.message = None;
        self.record_transition("back", from);
        self.step
    }

    /// Check that the wizard is ready to submit.
    ///
    /// Sets the message on failure just like [`advance`](Self::advance).
    ///
    /// # Errors
    ///
    /// Returns the failing check; the attendee checks run again because the
    /// cart may have changed since the Attendees step was left.
    pub fn validate_submit(&mut self, cart: &CartSnapshot) -> Result<(), ValidationError> {
        let result = self.check_submit(cart);
        match &result {
            Ok(()) => self.message = None,
            Err(err) => self.fail(err),
        }
        result
    }

    fn leave_cart(&mut self, cart: &CartSnapshot) -> Result<WizardStep, ValidationError> {
        if cart.is_empty() {
            return Err(ValidationError::EmptyCart);
        }
        if cart.has_tickets() {
            self.sync_attendees(cart);
            Ok(WizardStep::Attendees)
        } else {
            Ok(WizardStep::Contact)
        }
    }

    fn leave_attendees(&mut self, cart: &CartSnapshot) -> Result<WizardStep, ValidationError> {
        self.sync_attendees(cart);
        self.check_attendees()?;
        Ok(WizardStep::Contact)
    }

    fn check_attendees(&self) -> Result<(), ValidationError> {
        let missing: Vec<usize> = self
            .attendees
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.is_named())
            .map(|(i, _)| i)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::IncompleteAttendees { missing })
        }
    }

    fn check_submit(&mut self, cart: &CartSnapshot) -> Result<(), ValidationError> {
        if cart.is_empty() {
            return Err(ValidationError::EmptyCart);
        }
        self.sync_attendees(cart);
        self.check_attendees()?;
        check_contact(&self.contact, cart)
    }

    fn finish(
        &mut self,
        result: Result<WizardStep, ValidationError>,
        action: &str,
    ) -> Result<WizardStep, ValidationError> {
        match result {
            Ok(next) => {
                let from = self.step;
                self.step = next;
                self.message = None;
                self.record_transition(action, from);
                Ok(next)
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    fn fail(&mut self, err: &ValidationError) {
        debug!(step = %self.step, error = %err, "Wizard validation failed");
        self.message = Some(err.to_string());
    }

    fn record_transition(&self, action: &str, from: WizardStep) {
        debug!(action, from = %from, to = %self.step, "Wizard transition");
        add_breadcrumb(
            "wizard",
            action,
            &[("from", from.to_string()), ("to", self.step.to_string())],
        );
    }
}

/// Contact requirements: name and a well-formed email always, a complete
/// shipping address when merchandise is in the cart.
fn check_contact(contact: &ContactDetails, cart: &CartSnapshot) -> Result<(), ValidationError> {
    if contact.name.trim().is_empty() {
        return Err(ValidationError::MissingContact(ContactField::Name));
    }
    if contact.email.trim().is_empty() {
        return Err(ValidationError::MissingContact(ContactField::Email));
    }
    Email::parse(&contact.email).map_err(ValidationError::InvalidEmail)?;

    if cart.has_products() {
        let missing = contact.shipping.as_ref().map_or_else(
            || vec!["line1", "city", "postal_code", "country"],
            danceflow_core::ShippingAddress::missing_fields,
        );
        if !missing.is_empty() {
            return Err(ValidationError::MissingShipping { missing });
        }
    }
    Ok(())
}
