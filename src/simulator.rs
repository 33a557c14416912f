use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::order::{
    DomainEvent, OrderDeliveredEvent, OrderRef, PaymentSucceededEvent, ORDER_CREATED, ORDER_PAID,
};
use crate::messaging::{
    AckPolicy, ConsumerHandle, EventChannel, EventConsumer, EventHandler, EventProducer,
    HandlerError, DELIVERY_SERVICE_QUEUE, PAYMENT_SERVICE_QUEUE,
};

// ============================================================================
// Downstream Simulators
// ============================================================================
//
// Stand-ins for the payment and delivery services. Each consumes one routing
// key from its own durable queue (auto-ack), waits a fixed delay, and emits
// exactly one follow-up event:
//
//   order.created --2s--> payment.succeeded
//   order.paid    --5s--> order.delivered
//
// ============================================================================

/// What a simulator does with one inbound event.
pub trait Reaction: Send + Sync {
    fn name(&self) -> &'static str;
    fn queue(&self) -> &'static str;
    fn trigger(&self) -> &'static str;

    /// Routing key and body of the follow-up event.
    fn respond(&self, body: &[u8]) -> Result<(&'static str, Vec<u8>), HandlerError>;
}

fn encode<E: DomainEvent>(event: &E) -> Result<(&'static str, Vec<u8>), HandlerError> {
    serde_json::to_vec(event)
        .map(|payload| (event.routing_key(), payload))
        .map_err(|e| HandlerError::Permanent(e.to_string()))
}

fn decode<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T, HandlerError> {
    serde_json::from_slice(body).map_err(|e| HandlerError::Decode(e.to_string()))
}

pub struct PaymentReaction;

#[derive(Deserialize)]
struct CreatedOrder {
    order_id: Uuid,
    #[serde(default)]
    total_amount: f64,
}

impl Reaction for PaymentReaction {
    fn name(&self) -> &'static str {
        "payment_service"
    }

    fn queue(&self) -> &'static str {
        PAYMENT_SERVICE_QUEUE
    }

    fn trigger(&self) -> &'static str {
        ORDER_CREATED
    }

    fn respond(&self, body: &[u8]) -> Result<(&'static str, Vec<u8>), HandlerError> {
        let order: CreatedOrder = decode(body)?;
        encode(&PaymentSucceededEvent {
            payment_id: Uuid::new_v4(),
            order_id: order.order_id,
            amount: order.total_amount,
            timestamp: Utc::now(),
        })
    }
}

pub struct DeliveryReaction;

impl Reaction for DeliveryReaction {
    fn name(&self) -> &'static str {
        "delivery_service"
    }

    fn queue(&self) -> &'static str {
        DELIVERY_SERVICE_QUEUE
    }

    fn trigger(&self) -> &'static str {
        ORDER_PAID
    }

    fn respond(&self, body: &[u8]) -> Result<(&'static str, Vec<u8>), HandlerError> {
        let OrderRef { order_id } = decode(body)?;
        encode(&OrderDeliveredEvent {
            order_id,
            timestamp: Utc::now(),
            status: "Delivered".to_string(),
        })
    }
}

pub struct Simulator<R> {
    reaction: R,
    producer: Arc<EventProducer>,
    delay: Duration,
}

impl<R: Reaction + 'static> Simulator<R> {
    pub fn new(reaction: R, producer: Arc<EventProducer>, delay: Duration) -> Self {
        Self {
            reaction,
            producer,
            delay,
        }
    }

    /// Start consuming `channel` in the background.
    pub fn spawn(self, channel: Arc<dyn EventChannel>) -> ConsumerHandle {
        let queue = self.reaction.queue();
        let trigger = self.reaction.trigger();
        tracing::info!(
            simulator = self.reaction.name(),
            queue,
            trigger,
            delay_ms = self.delay.as_millis() as u64,
            "Starting simulator"
        );

        EventConsumer::new(channel, queue, &[trigger], AckPolicy::OnDelivery, Arc::new(self)).spawn()
    }
}

#[async_trait]
impl<R: Reaction> EventHandler for Simulator<R> {
    async fn handle(&self, routing_key: &str, body: &[u8]) -> Result<(), HandlerError> {
        let (follow_up, payload) = self.reaction.respond(body)?;

        tracing::info!(
            simulator = self.reaction.name(),
            received = %routing_key,
            emitting = follow_up,
            "📨 Event received, reacting after delay"
        );
        tokio::time::sleep(self.delay).await;

        self.producer
            .publish_raw(follow_up, &payload)
            .await
            .map_err(|e| HandlerError::Transient(e.to_string()))?;

        tracing::info!(simulator = self.reaction.name(), routing_key = follow_up, "✅ Follow-up emitted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{ORDER_DELIVERED, PAYMENT_SUCCEEDED};
    use crate::messaging::InMemoryBroker;

    fn start<R: Reaction + 'static>(broker: &InMemoryBroker, reaction: R) -> ConsumerHandle {
        let channel: Arc<dyn EventChannel> = Arc::new(broker.clone());
        let producer = Arc::new(EventProducer::new(channel.clone(), None));
        Simulator::new(reaction, producer, Duration::from_millis(20)).spawn(channel)
    }

    #[test]
    fn test_payment_reaction_carries_amount() {
        let order_id = Uuid::new_v4();
        let body = format!(r#"{{"order_id":"{}","total_amount":240.0,"currency":"ETB"}}"#, order_id);

        let (key, payload) = PaymentReaction.respond(body.as_bytes()).unwrap();
        let event: PaymentSucceededEvent = serde_json::from_slice(&payload).unwrap();

        assert_eq!(key, PAYMENT_SUCCEEDED);
        assert_eq!(event.order_id, order_id);
        assert_eq!(event.amount, 240.0);
    }

    #[test]
    fn test_delivery_reaction_marks_delivered() {
        let order_id = Uuid::new_v4();
        let body = format!(r#"{{"order_id":"{}","amount":240.0}}"#, order_id);

        let (key, payload) = DeliveryReaction.respond(body.as_bytes()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();

        assert_eq!(key, ORDER_DELIVERED);
        assert_eq!(json["order_id"], order_id.to_string());
        assert_eq!(json["status"], "Delivered");
    }

    #[test]
    fn test_undecodable_trigger_is_decode_error() {
        assert!(matches!(PaymentReaction.respond(b"{"), Err(HandlerError::Decode(_))));
        assert!(matches!(DeliveryReaction.respond(b"{}"), Err(HandlerError::Decode(_))));
    }

    #[tokio::test]
    async fn test_emits_exactly_one_follow_up_per_event() {
        let broker = InMemoryBroker::new();
        let handle = start(&broker, DeliveryReaction);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let order_id = Uuid::new_v4();
        broker
            .publish(ORDER_PAID, format!(r#"{{"order_id":"{}"}}"#, order_id).as_bytes())
            .await
            .unwrap();
        broker.publish(ORDER_PAID, b"garbage").await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let delivered = broker.published(ORDER_DELIVERED);
        assert_eq!(delivered.len(), 1);
        let event: OrderDeliveredEvent = serde_json::from_slice(&delivered[0]).unwrap();
        assert_eq!(event.order_id, order_id);
        handle.abort();
    }

    #[tokio::test]
    async fn test_waits_before_reacting() {
        let broker = InMemoryBroker::new();
        let channel: Arc<dyn EventChannel> = Arc::new(broker.clone());
        let producer = Arc::new(EventProducer::new(channel.clone(), None));
        let handle = Simulator::new(PaymentReaction, producer, Duration::from_millis(200)).spawn(channel);
        tokio::time::sleep(Duration::from_millis(20)).await;

        broker
            .publish(ORDER_CREATED, format!(r#"{{"order_id":"{}"}}"#, Uuid::new_v4()).as_bytes())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(broker.published(PAYMENT_SUCCEEDED).is_empty());
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(broker.published(PAYMENT_SUCCEEDED).len(), 1);
        handle.abort();
    }
}
