use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::time::Duration;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::domain::order::{
    Order, OrderItem, OrderRepository, OrderStatus, OutboxMessage, OutboxStatus, OutboxStore,
    RepositoryError, ShippingAddress, StatusHistoryEntry,
};

// ============================================================================
// PostgreSQL Persistence Gateway
// ============================================================================

const SCHEMA: &str = include_str!("../../migrations/001_init.sql");

/// Build the shared pool with the service's tuning.
pub async fn connect_pool(config: &DatabaseConfig) -> Result<PgPool, RepositoryError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(&config.url)
        .await?;

    tracing::info!(
        max_connections = config.max_connections,
        "✅ Connected to PostgreSQL"
    );
    Ok(pool)
}

#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema. Idempotent.
    pub async fn init_schema(&self) -> Result<(), RepositoryError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::info!("Database schema ready");
        Ok(())
    }

    async fn insert_outbox(
        tx: &mut Transaction<'_, Postgres>,
        message: &OutboxMessage,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO outbox_messages (id, aggregate_id, routing_key, payload, status, attempts, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(message.id)
        .bind(message.aggregate_id)
        .bind(&message.routing_key)
        .bind(&message.payload)
        .bind(OutboxStatus::Pending.as_str())
        .bind(message.attempts)
        .bind(message.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

fn parse_status(raw: &str) -> Result<OrderStatus, RepositoryError> {
    raw.parse()
        .map_err(|e: crate::domain::order::UnknownStatus| RepositoryError::Corrupt(e.to_string()))
}

fn row_to_item(row: &PgRow) -> Result<OrderItem, RepositoryError> {
    Ok(OrderItem {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        product_id: row.try_get("product_id")?,
        seller_id: row.try_get("seller_id")?,
        product_name: row.try_get("product_name")?,
        unit_price: row.try_get("unit_price")?,
        quantity: row.try_get("quantity")?,
    })
}

fn row_to_outbox(row: &PgRow) -> Result<OutboxMessage, RepositoryError> {
    Ok(OutboxMessage {
        id: row.try_get("id")?,
        aggregate_id: row.try_get("aggregate_id")?,
        routing_key: row.try_get("routing_key")?,
        payload: row.try_get("payload")?,
        attempts: row.try_get("attempts")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn create_order(
        &self,
        order: &Order,
        address: &ShippingAddress,
        outbox: Option<&OutboxMessage>,
    ) -> Result<(), RepositoryError> {
        // Dropping the transaction on any `?` below rolls everything back
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO orders (id, user_id, status, total_amount, currency, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.status.as_str())
        .bind(order.total_amount)
        .bind(&order.currency)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, position, product_id, seller_id, product_name, unit_price, quantity)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(item.id)
            .bind(item.order_id)
            .bind(position as i32)
            .bind(item.product_id)
            .bind(item.seller_id)
            .bind(&item.product_name)
            .bind(item.unit_price)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO order_addresses (id, order_id, full_name, phone, country, city, street, postal_code)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(address.id)
        .bind(address.order_id)
        .bind(&address.full_name)
        .bind(&address.phone)
        .bind(&address.country)
        .bind(&address.city)
        .bind(&address.street)
        .bind(&address.postal_code)
        .execute(&mut *tx)
        .await?;

        if let Some(message) = outbox {
            Self::insert_outbox(&mut tx, message).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_order_by_id(&self, order_id: Uuid) -> Result<Order, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_id, status, total_amount, currency, created_at, updated_at
             FROM orders WHERE id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound(order_id))?;

        let items = sqlx::query(
            "SELECT id, order_id, product_id, seller_id, product_name, unit_price, quantity
             FROM order_items WHERE order_id = $1 ORDER BY position",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(row_to_item)
        .collect::<Result<Vec<_>, _>>()?;

        let status: String = row.try_get("status")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

        Ok(Order {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            status: parse_status(&status)?,
            total_amount: row.try_get("total_amount")?,
            currency: row.try_get("currency")?,
            created_at,
            updated_at,
            items,
        })
    }

    async fn update_order_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
        outbox: Option<&OutboxMessage>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE orders SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(order_id));
        }

        if let Some(message) = outbox {
            Self::insert_outbox(&mut tx, message).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn add_status_history(&self, entry: &StatusHistoryEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO order_status_history (id, order_id, status, changed_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(entry.id)
        .bind(entry.order_id)
        .bind(entry.status.as_str())
        .bind(entry.changed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for PostgresOrderRepository {
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<OutboxMessage>, RepositoryError> {
        sqlx::query(
            "SELECT id, aggregate_id, routing_key, payload, attempts, created_at
             FROM outbox_messages
             WHERE status = $1
             ORDER BY created_at, id
             LIMIT $2",
        )
        .bind(OutboxStatus::Pending.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(row_to_outbox)
        .collect()
    }

    async fn mark_sent(&self, id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE outbox_messages SET status = $1, sent_at = $2 WHERE id = $3")
            .bind(OutboxStatus::Sent.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_failure(
        &self,
        id: Uuid,
        error: &str,
        dead_letter: bool,
    ) -> Result<(), RepositoryError> {
        let status = if dead_letter { OutboxStatus::Dead } else { OutboxStatus::Pending };

        sqlx::query(
            "UPDATE outbox_messages
             SET attempts = attempts + 1, last_error = $1, status = $2
             WHERE id = $3",
        )
        .bind(error)
        .bind(status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
