use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::{EmissionMode, OrderSettings};
use crate::domain::order::{
    OrderError, OrderPaidEvent, OrderRepository, OrderStatus, OutboxMessage, RepositoryError,
    StatusHistoryEntry,
};
use crate::messaging::OrderEventProducer;
use crate::metrics::Metrics;

// ============================================================================
// UpdateOrderStatus
// ============================================================================
//
// 1. (strict policy) read the current status and check the transition
// 2. write the status; zero rows touched is NotFound
// 3. append a history row, best effort
// 4. target PAID: announce `order.paid`, best effort. Detached mode
//    re-reads the order and publishes inline; outbox mode already wrote the
//    event in step 2.
//
// Nothing after step 2 can undo it.
//
// ============================================================================

pub struct UpdateOrderStatus {
    repository: Arc<dyn OrderRepository>,
    producer: Arc<dyn OrderEventProducer>,
    settings: OrderSettings,
    metrics: Option<Arc<Metrics>>,
}

impl UpdateOrderStatus {
    pub fn new(
        repository: Arc<dyn OrderRepository>,
        producer: Arc<dyn OrderEventProducer>,
        settings: OrderSettings,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            repository,
            producer,
            settings,
            metrics,
        }
    }

    pub async fn execute(&self, order_id: Uuid, status: OrderStatus) -> Result<(), OrderError> {
        let start = Instant::now();
        let result = self.apply(order_id, status).await;

        if let Some(metrics) = &self.metrics {
            metrics.record_status_update(status.as_str(), result.is_ok());
            metrics.observe_operation("update_order_status", start.elapsed().as_secs_f64());
        }
        result
    }

    async fn apply(&self, order_id: Uuid, status: OrderStatus) -> Result<(), OrderError> {
        let outbox_paid = self.settings.emission == EmissionMode::Outbox && status == OrderStatus::Paid;

        let mut outbox = None;
        if self.settings.transitions.needs_current_status() || outbox_paid {
            let current = self.repository.get_order_by_id(order_id).await?;
            self.settings.transitions.check(order_id, current.status, status)?;

            if outbox_paid {
                let event = OrderPaidEvent::for_order(&current);
                outbox = Some(
                    OutboxMessage::from_event(&event)
                        .map_err(|e| RepositoryError::Corrupt(e.to_string()))?,
                );
            }
        }

        if let Err(e) = self
            .repository
            .update_order_status(order_id, status, outbox.as_ref())
            .await
        {
            tracing::error!(order_id = %order_id, status = %status, error = %e, "❌ Failed to update order status");
            return Err(e.into());
        }

        tracing::info!(order_id = %order_id, status = %status, "🔄 Order status updated");

        if let Err(e) = self
            .repository
            .add_status_history(&StatusHistoryEntry::record(order_id, status))
            .await
        {
            tracing::warn!(order_id = %order_id, status = %status, error = %e, "Failed to record status history");
        }

        if status == OrderStatus::Paid && self.settings.emission == EmissionMode::Detached {
            self.announce_paid(order_id).await;
        }

        Ok(())
    }

    async fn announce_paid(&self, order_id: Uuid) {
        let order = match self.repository.get_order_by_id(order_id).await {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!(order_id = %order_id, error = %e, "Could not reload order, order.paid not emitted");
                return;
            }
        };

        let timeout = self.settings.emission_timeout;
        match tokio::time::timeout(timeout, self.producer.emit_order_paid(&order)).await {
            Ok(Ok(())) => tracing::debug!(order_id = %order_id, "Announced order.paid"),
            Ok(Err(e)) => {
                tracing::warn!(order_id = %order_id, error = %e, "Failed to emit order.paid");
            }
            Err(_) => {
                tracing::warn!(
                    order_id = %order_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Timed out emitting order.paid"
                );
            }
        }
    }
}
