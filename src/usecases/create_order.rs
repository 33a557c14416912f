use std::sync::Arc;
use std::time::Instant;

use super::{EmissionMode, OrderSettings};
use crate::domain::order::{
    CreateOrderInput, NewOrder, Order, OrderCreatedEvent, OrderError, OrderRepository,
    OutboxMessage, RepositoryError,
};
use crate::messaging::OrderEventProducer;
use crate::metrics::Metrics;

// ============================================================================
// CreateOrder
// ============================================================================
//
// validate → allocate identity → persist order + items + address atomically
// → return. The `order.created` announcement never sits on the request path:
//
// - detached: a spawned task publishes after commit under its own timeout.
//   The request's cancellation does not reach it and its failure is only
//   logged, so a committed order can go unannounced.
// - outbox: the event row commits with the order and the dispatcher
//   publishes it later.
//
// ============================================================================

pub struct CreateOrder {
    repository: Arc<dyn OrderRepository>,
    producer: Arc<dyn OrderEventProducer>,
    settings: OrderSettings,
    metrics: Option<Arc<Metrics>>,
}

impl CreateOrder {
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

    pub async fn execute(&self, input: CreateOrderInput) -> Result<Order, OrderError> {
        let start = Instant::now();
        input.validate()?;

        let NewOrder { order, address } = Order::place(input, &self.settings.currency);

        let outbox = match self.settings.emission {
            EmissionMode::Outbox => Some(
                OutboxMessage::from_event(&OrderCreatedEvent::from(&order))
                    .map_err(|e| RepositoryError::Corrupt(e.to_string()))?,
            ),
            EmissionMode::Detached => None,
        };

        if let Err(e) = self
            .repository
            .create_order(&order, &address, outbox.as_ref())
            .await
        {
            tracing::error!(error = %e, "❌ Failed to create order");
            return Err(e.into());
        }

        tracing::info!(
            order_id = %order.id,
            user_id = %order.user_id,
            items = order.items.len(),
            total_amount = order.total_amount,
            "✅ Order created"
        );

        if let Some(metrics) = &self.metrics {
            metrics.orders_created.inc();
            metrics.observe_operation("create_order", start.elapsed().as_secs_f64());
        }

        if self.settings.emission == EmissionMode::Detached {
            self.announce_detached(order.clone());
        }

        Ok(order)
    }

    fn announce_detached(&self, order: Order) {
        let producer = self.producer.clone();
        let timeout = self.settings.emission_timeout;

        tokio::spawn(async move {
            match tokio::time::timeout(timeout, producer.emit_order_created(&order)).await {
                Ok(Ok(())) => {
                    tracing::debug!(order_id = %order.id, "Announced order.created");
                }
                Ok(Err(e)) => {
                    tracing::warn!(order_id = %order.id, error = %e, "Failed to emit order.created");
                }
                Err(_) => {
                    tracing::warn!(
                        order_id = %order.id,
                        timeout_ms = timeout.as_millis() as u64,
                        "Timed out emitting order.created"
                    );
                }
            }
        });
    }
}
