//! Remote cart rows for authenticated users.
//!
//! Each cart line is one row. Product data is stored denormalized as JSON so
//! a cart can be rendered without joining the catalog.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;

use danceflow_core::{
    CartKey, CartRowId, CartSnapshot, LineItem, ProductRef, TicketLineItem, TicketTypeRef, UserId,
};

use super::RepositoryError;

/// Storage for per-user cart rows.
#[async_trait]
pub trait CartRowRepository: Send + Sync {
    /// Load a user's cart, both lists in row creation order.
    async fn load(&self, user: UserId) -> Result<CartSnapshot, RepositoryError>;

    /// Insert or overwrite the row for a merchandise line.
    async fn upsert_product(&self, user: UserId, line: &LineItem)
    -> Result<CartRowId, RepositoryError>;

    /// Insert or overwrite the row for a ticket line.
    async fn upsert_ticket(
        &self,
        user: UserId,
        line: &TicketLineItem,
    ) -> Result<CartRowId, RepositoryError>;

    /// Delete the row for `key`. Deleting a missing row is not an error.
    async fn delete(&self, user: UserId, key: &CartKey) -> Result<(), RepositoryError>;

    /// Delete every row of the user's cart.
    async fn clear(&self, user: UserId) -> Result<(), RepositoryError>;
}

/// `PostgreSQL` implementation of [`CartRowRepository`].
#[derive(Clone)]
pub struct PgCartRows {
    pool: PgPool,
}

impl PgCartRows {
    /// Create a new cart row repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: CartRowId,
    product: Json<ProductRef>,
    variant: String,
    quantity: i32,
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: CartRowId,
    ticket_type: Json<TicketTypeRef>,
    quantity: i32,
}

/// Variant is stored as `''` when absent so it can take part in the unique key.
fn variant_column(variant: Option<&str>) -> &str {
    variant.unwrap_or("")
}

fn quantity_from_row(quantity: i32) -> Result<u32, RepositoryError> {
    u32::try_from(quantity)
        .map_err(|_| RepositoryError::DataCorruption(format!("negative cart quantity {quantity}")))
}

fn quantity_to_row(quantity: u32) -> Result<i32, RepositoryError> {
    i32::try_from(quantity)
        .map_err(|_| RepositoryError::Conflict(format!("cart quantity {quantity} out of range")))
}

#[async_trait]
impl CartRowRepository for PgCartRows {
    async fn load(&self, user: UserId) -> Result<CartSnapshot, RepositoryError> {
        let products = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, product, variant, quantity
            FROM checkout.cart_product_row
            WHERE user_id = $1
            ORDER BY created_at ASC, id ASC
            ",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;

        let tickets = sqlx::query_as::<_, TicketRow>(
            r"
            SELECT id, ticket_type, quantity
            FROM checkout.cart_ticket_row
            WHERE user_id = $1
            ORDER BY created_at ASC, id ASC
            ",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;

        let lines = products
            .into_iter()
            .map(|row| {
                Ok(LineItem {
                    product: row.product.0,
                    quantity: quantity_from_row(row.quantity)?,
                    variant: (!row.variant.is_empty()).then_some(row.variant),
                    server_row_id: Some(row.id),
                })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        let tickets = tickets
            .into_iter()
            .map(|row| {
                Ok(TicketLineItem {
                    ticket_type: row.ticket_type.0,
                    quantity: quantity_from_row(row.quantity)?,
                    server_row_id: Some(row.id),
                })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        Ok(CartSnapshot { lines, tickets })
    }

    async fn upsert_product(
        &self,
        user: UserId,
        line: &LineItem,
    ) -> Result<CartRowId, RepositoryError> {
        let id: CartRowId = sqlx::query_scalar(
            r"
            INSERT INTO checkout.cart_product_row (user_id, product_id, variant, quantity, product)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, product_id, variant)
            DO UPDATE SET quantity = EXCLUDED.quantity, product = EXCLUDED.product
            RETURNING id
            ",
        )
        .bind(user)
        .bind(line.product.id)
        .bind(variant_column(line.variant.as_deref()))
        .bind(quantity_to_row(line.quantity)?)
        .bind(Json(&line.product))
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn upsert_ticket(
        &self,
        user: UserId,
        line: &TicketLineItem,
    ) -> Result<CartRowId, RepositoryError> {
        let id: CartRowId = sqlx::query_scalar(
            r"
            INSERT INTO checkout.cart_ticket_row (user_id, event_ticket_type_id, quantity, ticket_type)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, event_ticket_type_id)
            DO UPDATE SET quantity = EXCLUDED.quantity, ticket_type = EXCLUDED.ticket_type
            RETURNING id
            ",
        )
        .bind(user)
        .bind(line.ticket_type.id)
        .bind(quantity_to_row(line.quantity)?)
        .bind(Json(&line.ticket_type))
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn delete(&self, user: UserId, key: &CartKey) -> Result<(), RepositoryError> {
        match key {
            CartKey::Product {
                product_id,
                variant,
            } => {
                sqlx::query(
                    r"
                    DELETE FROM checkout.cart_product_row
                    WHERE user_id = $1 AND product_id = $2 AND variant = $3
                    ",
                )
                .bind(user)
                .bind(*product_id)
                .bind(variant_column(variant.as_deref()))
                .execute(&self.pool)
                .await?;
            }
            CartKey::Ticket(ticket_type_id) => {
                sqlx::query(
                    r"
                    DELETE FROM checkout.cart_ticket_row
                    WHERE user_id = $1 AND event_ticket_type_id = $2
                    ",
                )
                .bind(user)
                .bind(*ticket_type_id)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    async fn clear(&self, user: UserId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM checkout.cart_product_row WHERE user_id = $1")
            .bind(user)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM checkout.cart_ticket_row WHERE user_id = $1")
            .bind(user)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
