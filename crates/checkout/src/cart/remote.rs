//! Per-user cart rows.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use danceflow_core::{CartKey, CartSnapshot, UserId};

use super::backend::{ApplyOutcome, BackendKind, CartBackend};
use super::mutation::CartWrite;
use crate::db::CartRowRepository;
use crate::error::RemoteError;

/// Backend for a signed-in user, one row per cart line.
pub struct RemoteBackend {
    user: UserId,
    rows: Arc<dyn CartRowRepository>,
}

impl RemoteBackend {
    #[must_use]
    pub fn new(user: UserId, rows: Arc<dyn CartRowRepository>) -> Self {
        Self { user, rows }
    }
}

#[async_trait]
impl CartBackend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn load(&self) -> Result<CartSnapshot, RemoteError> {
        Ok(self.rows.load(self.user).await?)
    }

    async fn apply(&self, write: &CartWrite, after: &CartSnapshot) -> Result<ApplyOutcome, RemoteError> {
        debug!(user_id = %self.user, write = ?write, "Writing cart row");
        match write {
            CartWrite::Upsert(key @ CartKey::Product { .. }) => {
                let line = after
                    .lines
                    .iter()
                    .find(|l| l.key() == *key)
                    .ok_or_else(|| missing_line(key))?;
                let row_id = self.rows.upsert_product(self.user, line).await?;
                Ok(ApplyOutcome {
                    row_id: Some(row_id),
                })
            }
            CartWrite::Upsert(key @ CartKey::Ticket(id)) => {
                let line = after
                    .tickets
                    .iter()
                    .find(|t| t.ticket_type.id == *id)
                    .ok_or_else(|| missing_line(key))?;
                let row_id = self.rows.upsert_ticket(self.user, line).await?;
                Ok(ApplyOutcome {
                    row_id: Some(row_id),
                })
            }
            CartWrite::Delete(key) => {
                self.rows.delete(self.user, key).await?;
                Ok(ApplyOutcome::default())
            }
            CartWrite::Clear => {
                self.rows.clear(self.user).await?;
                Ok(ApplyOutcome::default())
            }
        }
    }
}

fn missing_line(key: &CartKey) -> RemoteError {
    RemoteError::Unavailable(format!("{key} is missing from the snapshot being written"))
}
