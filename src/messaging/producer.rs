use async_trait::async_trait;
use std::sync::Arc;

use super::{EventChannel, MessagingError};
use crate::domain::order::{DomainEvent, Order, OrderCreatedEvent, OrderPaidEvent};
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

/// The two events the order service announces.
#[async_trait]
pub trait OrderEventProducer: Send + Sync {
    async fn emit_order_created(&self, order: &Order) -> Result<(), MessagingError>;
    async fn emit_order_paid(&self, order: &Order) -> Result<(), MessagingError>;
}

pub struct EventProducer {
    channel: Arc<dyn EventChannel>,
    circuit_breaker: CircuitBreaker,
    metrics: Option<Arc<Metrics>>,
}

impl EventProducer {
    pub fn new(channel: Arc<dyn EventChannel>, metrics: Option<Arc<Metrics>>) -> Self {
        Self::with_breaker(channel, CircuitBreakerConfig::default(), metrics)
    }

    pub fn with_breaker(
        channel: Arc<dyn EventChannel>,
        config: CircuitBreakerConfig,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            channel,
            circuit_breaker: CircuitBreaker::new("event_producer", config),
            metrics,
        }
    }

    pub fn breaker(&self) -> CircuitBreaker {
        self.circuit_breaker.clone()
    }

    pub async fn publish_event<E: DomainEvent + Sync>(&self, event: &E) -> Result<(), MessagingError> {
        let payload = serde_json::to_vec(event)?;
        self.publish_raw(event.routing_key(), &payload).await
    }

    /// Publish an already encoded body. Used by the outbox dispatcher.
    pub async fn publish_raw(&self, routing_key: &str, payload: &[u8]) -> Result<(), MessagingError> {
        let result = self
            .circuit_breaker
            .call(self.channel.publish(routing_key, payload))
            .await
            .map_err(|e| match e {
                CircuitBreakerError::CircuitOpen(name) => MessagingError::CircuitOpen(name),
                CircuitBreakerError::OperationFailed(e) => e,
            });

        if let Some(metrics) = &self.metrics {
            metrics.record_publish(routing_key, result.as_ref().err().map(MessagingError::kind));
            metrics.set_circuit_breaker_state(self.circuit_breaker.state().await);
        }

        match &result {
            Ok(()) => tracing::debug!(routing_key = %routing_key, "Published event"),
            Err(MessagingError::CircuitOpen(_)) => {
                tracing::error!(routing_key = %routing_key, "Circuit breaker open - broker unavailable")
            }
            Err(e) => tracing::error!(routing_key = %routing_key, error = %e, "Failed to publish event"),
        }

        result
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state().await
    }
}

#[async_trait]
impl OrderEventProducer for EventProducer {
    async fn emit_order_created(&self, order: &Order) -> Result<(), MessagingError> {
        self.publish_event(&OrderCreatedEvent::from(order)).await
    }

    async fn emit_order_paid(&self, order: &Order) -> Result<(), MessagingError> {
        self.publish_event(&OrderPaidEvent::for_order(order)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{AddressInput, CreateOrderInput, OrderItemInput, ORDER_CREATED, ORDER_PAID};
    use crate::messaging::InMemoryBroker;
    use std::time::Duration;
    use uuid::Uuid;

    fn order() -> Order {
        Order::place(
            CreateOrderInput {
                user_id: Uuid::new_v4(),
                items: vec![OrderItemInput {
                    product_id: Uuid::new_v4(),
                    seller_id: Uuid::new_v4(),
                    product_name: "Lamp".to_string(),
                    unit_price: 250.0,
                    quantity: 2,
                }],
                shipping_address: AddressInput::default(),
                total_amount: 500.0,
            },
            "ETB",
        )
        .order
    }

    #[tokio::test]
    async fn test_emits_json_on_expected_routing_keys() {
        let broker = InMemoryBroker::new();
        let producer = EventProducer::new(Arc::new(broker.clone()), None);
        let order = order();

        producer.emit_order_created(&order).await.unwrap();
        producer.emit_order_paid(&order).await.unwrap();

        let created = broker.published(ORDER_CREATED);
        assert_eq!(created.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&created[0]).unwrap();
        assert_eq!(body["order_id"], order.id.to_string());
        assert_eq!(body["total_amount"], 500.0);
        assert_eq!(body["currency"], "ETB");

        let paid = broker.published(ORDER_PAID);
        let body: serde_json::Value = serde_json::from_slice(&paid[0]).unwrap();
        assert_eq!(body["amount"], 500.0);
    }

    #[tokio::test]
    async fn test_breaker_opens_after_repeated_failures() {
        let broker = InMemoryBroker::new();
        let metrics = Arc::new(Metrics::new().unwrap());
        let producer = EventProducer::with_breaker(
            Arc::new(broker.clone()),
            CircuitBreakerConfig {
                failure_threshold: 2,
                timeout: Duration::from_secs(60),
                success_threshold: 1,
            },
            Some(metrics.clone()),
        );
        broker.disconnect();

        let order = order();
        for _ in 0..2 {
            assert!(matches!(
                producer.emit_order_created(&order).await,
                Err(MessagingError::Disconnected)
            ));
        }

        broker.reconnect().await.unwrap();
        assert!(matches!(
            producer.emit_order_created(&order).await,
            Err(MessagingError::CircuitOpen(_))
        ));
        assert_eq!(producer.circuit_state().await, CircuitState::Open);
        assert_eq!(metrics.circuit_breaker_state.get(), 2);
        assert!(broker.published(ORDER_CREATED).is_empty());
    }
}
