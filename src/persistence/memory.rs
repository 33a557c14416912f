use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::order::{
    Order, OrderRepository, OrderStatus, OutboxMessage, OutboxStatus, OutboxStore, RepositoryError,
    ShippingAddress, StatusHistoryEntry,
};

// ============================================================================
// In-Memory Persistence Gateway
// ============================================================================
//
// Same contract as the PostgreSQL gateway, plus fault injection and
// inspection hooks so the atomicity and ordering properties can be tested
// without a database. A create writes its rows into a scratch copy of the
// tables stage by stage and swaps the copy in only when every stage passes.
//
// ============================================================================

/// Insert stages of CreateOrder, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStage {
    Order,
    Items,
    Address,
    Outbox,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub orders: usize,
    pub items: usize,
    pub addresses: usize,
    pub history: usize,
    pub outbox: usize,
}

#[derive(Debug, Clone)]
struct OutboxRow {
    message: OutboxMessage,
    status: OutboxStatus,
    last_error: Option<String>,
}

#[derive(Debug, Default)]
struct Faults {
    create_at: Option<CreateStage>,
    get: bool,
    update: bool,
    history: bool,
    update_delay: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    orders: HashMap<Uuid, Order>,
    addresses: HashMap<Uuid, ShippingAddress>,
    history: Vec<StatusHistoryEntry>,
    outbox: Vec<OutboxRow>,
    /// Status writes in commit order
    commit_log: Vec<(Uuid, OrderStatus)>,
}

#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Mutex<Faults>>,
}

fn injected(stage: &str) -> RepositoryError {
    RepositoryError::Unavailable(format!("injected failure at {stage}"))
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Fault injection
    // ------------------------------------------------------------------------

    /// Fail the next creates when they reach `stage`.
    pub async fn fail_create_at(&self, stage: Option<CreateStage>) {
        self.faults.lock().await.create_at = stage;
    }

    pub async fn fail_gets(&self, fail: bool) {
        self.faults.lock().await.get = fail;
    }

    pub async fn fail_updates(&self, fail: bool) {
        self.faults.lock().await.update = fail;
    }

    pub async fn fail_history(&self, fail: bool) {
        self.faults.lock().await.history = fail;
    }

    /// Hold every status update for `delay` before it commits.
    pub async fn delay_updates(&self, delay: Option<Duration>) {
        self.faults.lock().await.update_delay = delay;
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    pub async fn row_counts(&self, order_id: Uuid) -> RowCounts {
        let tables = self.tables.lock().await;
        let order = tables.orders.get(&order_id);

        RowCounts {
            orders: usize::from(order.is_some()),
            items: order.map_or(0, |o| o.items.len()),
            addresses: usize::from(tables.addresses.contains_key(&order_id)),
            history: tables.history.iter().filter(|h| h.order_id == order_id).count(),
            outbox: tables
                .outbox
                .iter()
                .filter(|row| row.message.aggregate_id == order_id)
                .count(),
        }
    }

    pub async fn total_orders(&self) -> usize {
        self.tables.lock().await.orders.len()
    }

    pub async fn history(&self, order_id: Uuid) -> Vec<StatusHistoryEntry> {
        self.tables
            .lock()
            .await
            .history
            .iter()
            .filter(|h| h.order_id == order_id)
            .cloned()
            .collect()
    }

    pub async fn status_commit_log(&self, order_id: Uuid) -> Vec<OrderStatus> {
        self.tables
            .lock()
            .await
            .commit_log
            .iter()
            .filter(|(id, _)| *id == order_id)
            .map(|(_, status)| *status)
            .collect()
    }

    pub async fn address(&self, order_id: Uuid) -> Option<ShippingAddress> {
        self.tables.lock().await.addresses.get(&order_id).cloned()
    }

    pub async fn outbox_status(&self, id: Uuid) -> Option<(OutboxStatus, i32, Option<String>)> {
        self.tables
            .lock()
            .await
            .outbox
            .iter()
            .find(|row| row.message.id == id)
            .map(|row| (row.status, row.message.attempts, row.last_error.clone()))
    }

    pub async fn outbox_messages(&self) -> Vec<(OutboxMessage, OutboxStatus)> {
        self.tables
            .lock()
            .await
            .outbox
            .iter()
            .map(|row| (row.message.clone(), row.status))
            .collect()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create_order(
        &self,
        order: &Order,
        address: &ShippingAddress,
        outbox: Option<&OutboxMessage>,
    ) -> Result<(), RepositoryError> {
        let fail_at = self.faults.lock().await.create_at;
        let stages = [
            (CreateStage::Order, "orders"),
            (CreateStage::Items, "order_items"),
            (CreateStage::Address, "order_addresses"),
            (CreateStage::Outbox, "outbox_messages"),
        ];

        let mut tables = self.tables.lock().await;
        if tables.orders.contains_key(&order.id) {
            return Err(RepositoryError::Corrupt(format!("duplicate order id {}", order.id)));
        }

        let mut staged = tables.clone();
        for (stage, table) in stages {
            if stage == CreateStage::Outbox && outbox.is_none() {
                continue;
            }
            if fail_at == Some(stage) {
                tracing::debug!(order_id = %order.id, table, "Rolling back staged create");
                return Err(injected(table));
            }

            match stage {
                CreateStage::Order => {
                    staged.orders.insert(
                        order.id,
                        Order {
                            items: Vec::new(),
                            ..order.clone()
                        },
                    );
                }
                CreateStage::Items => {
                    if let Some(row) = staged.orders.get_mut(&order.id) {
                        row.items = order.items.clone();
                    }
                }
                CreateStage::Address => {
                    staged.addresses.insert(order.id, address.clone());
                }
                CreateStage::Outbox => {
                    if let Some(message) = outbox {
                        staged.outbox.push(OutboxRow {
                            message: message.clone(),
                            status: OutboxStatus::Pending,
                            last_error: None,
                        });
                    }
                }
            }
        }

        *tables = staged;
        Ok(())
    }

    async fn get_order_by_id(&self, order_id: Uuid) -> Result<Order, RepositoryError> {
        if self.faults.lock().await.get {
            return Err(injected("orders"));
        }
        self.tables
            .lock()
            .await
            .orders
            .get(&order_id)
            .cloned()
            .ok_or(RepositoryError::NotFound(order_id))
    }

    async fn update_order_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
        outbox: Option<&OutboxMessage>,
    ) -> Result<(), RepositoryError> {
        let (fail, delay) = {
            let faults = self.faults.lock().await;
            (faults.update, faults.update_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(injected("orders"));
        }

        let mut tables = self.tables.lock().await;
        let order = tables
            .orders
            .get_mut(&order_id)
            .ok_or(RepositoryError::NotFound(order_id))?;
        order.status = status;
        order.updated_at = Utc::now();

        if let Some(message) = outbox {
            tables.outbox.push(OutboxRow {
                message: message.clone(),
                status: OutboxStatus::Pending,
                last_error: None,
            });
        }
        tables.commit_log.push((order_id, status));
        Ok(())
    }

    async fn add_status_history(&self, entry: &StatusHistoryEntry) -> Result<(), RepositoryError> {
        if self.faults.lock().await.history {
            return Err(injected("order_status_history"));
        }
        self.tables.lock().await.history.push(entry.clone());
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for InMemoryOrderRepository {
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<OutboxMessage>, RepositoryError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .tables
            .lock()
            .await
            .outbox
            .iter()
            .filter(|row| row.status == OutboxStatus::Pending)
            .take(limit)
            .map(|row| row.message.clone())
            .collect())
    }

    async fn mark_sent(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        let row = tables
            .outbox
            .iter_mut()
            .find(|row| row.message.id == id)
            .ok_or(RepositoryError::NotFound(id))?;
        row.status = OutboxStatus::Sent;
        Ok(())
    }

    async fn record_failure(
        &self,
        id: Uuid,
        error: &str,
        dead_letter: bool,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        let row = tables
            .outbox
            .iter_mut()
            .find(|row| row.message.id == id)
            .ok_or(RepositoryError::NotFound(id))?;
        row.message.attempts += 1;
        row.last_error = Some(error.to_string());
        if dead_letter {
            row.status = OutboxStatus::Dead;
        }
        Ok(())
    }
}
