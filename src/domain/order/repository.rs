use async_trait::async_trait;
use uuid::Uuid;

use super::aggregate::Order;
use super::errors::RepositoryError;
use super::outbox::OutboxMessage;
use super::value_objects::{OrderStatus, ShippingAddress, StatusHistoryEntry};

// ============================================================================
// Persistence Gateway
// ============================================================================

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert the order row, its items and its address in one transaction.
    /// When `outbox` is given the outbox row joins the same transaction.
    async fn create_order(
        &self,
        order: &Order,
        address: &ShippingAddress,
        outbox: Option<&OutboxMessage>,
    ) -> Result<(), RepositoryError>;

    /// Point lookup with the items eagerly loaded.
    async fn get_order_by_id(&self, order_id: Uuid) -> Result<Order, RepositoryError>;

    /// Overwrite `status` and bump `updated_at`. Zero rows touched is
    /// reported as `NotFound`.
    async fn update_order_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
        outbox: Option<&OutboxMessage>,
    ) -> Result<(), RepositoryError>;

    async fn add_status_history(&self, entry: &StatusHistoryEntry) -> Result<(), RepositoryError>;
}

/// Pending-row access for the outbox dispatcher.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Oldest pending rows first.
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<OutboxMessage>, RepositoryError>;

    async fn mark_sent(&self, id: Uuid) -> Result<(), RepositoryError>;

    /// Bump `attempts`, remember the error, and move the row to `dead` when
    /// `dead_letter` is set.
    async fn record_failure(
        &self,
        id: Uuid,
        error: &str,
        dead_letter: bool,
    ) -> Result<(), RepositoryError>;
}
