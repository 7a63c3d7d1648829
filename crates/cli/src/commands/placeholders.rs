//! Placeholder attendee inspection and repair.
//!
//! # Usage
//!
//! ```bash
//! # List unassigned placeholders of a user for two ticket types
//! danceflow placeholders --user 42 --ticket-type 7 --ticket-type 8
//!
//! # Bind the attendees of a saved handoff record
//! danceflow reconcile --user 42 --pending pending.json
//! ```
//!
//! The handoff record is the JSON form of `PendingCheckout`, as stored at
//! payment handoff. `reconcile` rewrites the file with its claims and bound
//! units as it goes, so running it again only binds what is still open.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use danceflow_checkout::db::{self, PgPlaceholders, PlaceholderRepository};
use danceflow_checkout::handoff::HandoffStoreError;
use danceflow_checkout::reconcile::ReconcileProgress;
use danceflow_checkout::{AttendeeReconciler, CheckoutConfig, CheckoutError};
use danceflow_core::{EventTicketTypeId, PendingCheckout, UserId};

use super::CommandError;

async fn repository() -> Result<PgPlaceholders, CommandError> {
    let database_url = CheckoutConfig::database_url_from_env()?;
    let pool = db::create_pool(&database_url).await?;
    Ok(PgPlaceholders::new(pool))
}

fn print_json(value: &impl serde::Serialize) -> Result<(), CommandError> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout).map_err(|source| CommandError::Io {
        path: "stdout".to_string(),
        source,
    })
}

/// Handoff record kept in a JSON file.
struct PendingFile {
    path: PathBuf,
}

impl PendingFile {
    fn read(&self) -> Result<PendingCheckout, CommandError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|source| CommandError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[async_trait]
impl ReconcileProgress for PendingFile {
    async fn save_progress(&self, record: &PendingCheckout) -> Result<(), HandoffStoreError> {
        let json = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| HandoffStoreError::Storage(format!("{}: {e}", self.path.display())))
    }
}

/// Print the unassigned placeholders of `user`, oldest first.
///
/// # Errors
///
/// Returns an error if the database cannot be reached.
pub async fn list(user: i32, ticket_types: &[i32]) -> Result<(), CommandError> {
    let repository = repository().await?;
    let ticket_types: Vec<EventTicketTypeId> =
        ticket_types.iter().copied().map(EventTicketTypeId::new).collect();

    let open = repository
        .unassigned(UserId::new(user), &ticket_types)
        .await
        .map_err(|e| CheckoutError::RemoteRead(e.into()))?;

    tracing::info!(count = open.len(), "Unassigned placeholders");
    print_json(&open)
}

/// Run attendee reconciliation for a saved handoff record.
///
/// Progress is written back to `pending` before and after each write.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed or rewritten, or if
/// reconciliation fails outright.
pub async fn reconcile(user: i32, pending: &Path) -> Result<(), CommandError> {
    let file = PendingFile {
        path: pending.to_path_buf(),
    };
    let mut record = file.read()?;

    let repository = repository().await?;
    let report = AttendeeReconciler::new(&repository)
        .reconcile_record(UserId::new(user), &mut record, &file)
        .await?;

    tracing::info!(
        order_id = %report.order_id,
        assigned = report.assigned.len(),
        unresolved = report.unresolved.len(),
        "Reconciliation finished"
    );
    print_json(&report)
}
