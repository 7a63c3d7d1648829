//! Placeholder attendee records.
//!
//! The order system inserts one row per purchased ticket unit with null
//! attendee fields. The reconciler fills them in after payment.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use danceflow_core::{
    AttendeeDetails, EventTicketTypeId, PlaceholderAttendee, PlaceholderId, UnitCorrelationId,
    UserId,
};

use super::RepositoryError;

/// Access to placeholder attendee records.
#[async_trait]
pub trait PlaceholderRepository: Send + Sync {
    /// Unassigned placeholders of `user` for the given ticket types, oldest first.
    async fn unassigned(
        &self,
        user: UserId,
        ticket_types: &[EventTicketTypeId],
    ) -> Result<Vec<PlaceholderAttendee>, RepositoryError>;

    /// Write attendee details onto a still-unassigned placeholder.
    ///
    /// Returns `RepositoryError::Conflict` if the record was assigned meanwhile.
    async fn assign(
        &self,
        id: PlaceholderId,
        details: &AttendeeDetails,
    ) -> Result<(), RepositoryError>;
}

/// `PostgreSQL` implementation of [`PlaceholderRepository`].
#[derive(Clone)]
pub struct PgPlaceholders {
    pool: PgPool,
}

impl PgPlaceholders {
    /// Create a new placeholder repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PlaceholderRow {
    id: PlaceholderId,
    user_id: UserId,
    event_ticket_type_id: EventTicketTypeId,
    created_at: DateTime<Utc>,
    correlation_id: Option<UnitCorrelationId>,
}

impl From<PlaceholderRow> for PlaceholderAttendee {
    fn from(row: PlaceholderRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            ticket_type_id: row.event_ticket_type_id,
            created_at: row.created_at,
            correlation_id: row.correlation_id,
        }
    }
}

#[async_trait]
impl PlaceholderRepository for PgPlaceholders {
    async fn unassigned(
        &self,
        user: UserId,
        ticket_types: &[EventTicketTypeId],
    ) -> Result<Vec<PlaceholderAttendee>, RepositoryError> {
        let ids: Vec<i32> = ticket_types.iter().map(EventTicketTypeId::as_i32).collect();
        let rows = sqlx::query_as::<_, PlaceholderRow>(
            r"
            SELECT id, user_id, event_ticket_type_id, created_at, correlation_id
            FROM checkout.attendee_placeholder
            WHERE user_id = $1
              AND event_ticket_type_id = ANY($2)
              AND first_name IS NULL
            ORDER BY created_at ASC, id ASC
            ",
        )
        .bind(user)
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PlaceholderAttendee::from).collect())
    }

    async fn assign(
        &self,
        id: PlaceholderId,
        details: &AttendeeDetails,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE checkout.attendee_placeholder
            SET first_name = $2, last_name = $3, email = $4, phone = $5, assigned_at = now()
            WHERE id = $1 AND first_name IS NULL
            ",
        )
        .bind(id)
        .bind(&details.first_name)
        .bind(&details.last_name)
        .bind(details.email.as_deref())
        .bind(details.phone.as_deref())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "placeholder {id} is missing or already assigned"
            )));
        }
        Ok(())
    }
}
