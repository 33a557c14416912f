use async_trait::async_trait;
use futures_util::StreamExt;
use kameo::actor::ActorRef;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{AckMode, Delivery, DeliveryStream, EventChannel, Subscription};
use crate::actors::core::{HealthStatus, EVENT_CONSUMER};
use crate::actors::infrastructure::{report_health, HealthMonitorActor, UpdateHealth};
use crate::domain::order::{OrderRef, StatusEvent};
use crate::metrics::Metrics;
use crate::usecases::UpdateOrderStatus;

// ============================================================================
// Event Consumer - dispatch loop for one durable queue
// ============================================================================
//
// Deliveries are handled one at a time in arrival order; there is no
// in-process buffer beyond what the channel has already pushed.
//
// Ack policies:
// - on_delivery: broker no-ack mode. The message is settled before it is
//   decoded, so a failure or crash from here on loses it (at-most-once).
// - after_processing: ack after the handler succeeds. A transient failure
//   is requeued once; a second transient failure, a decode failure, or a
//   permanent failure rejects the message.
//
// When the stream ends (connection lost) the loop resubscribes after
// `resubscribe_delay` until the channel is back.
//
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    #[default]
    OnDelivery,
    AfterProcessing,
}

impl AckPolicy {
    pub fn ack_mode(&self) -> AckMode {
        match self {
            AckPolicy::OnDelivery => AckMode::Auto,
            AckPolicy::AfterProcessing => AckMode::Manual,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Undecodable event: {0}")]
    Decode(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Permanent failure: {0}")]
    Permanent(String),
}

impl HandlerError {
    fn outcome(&self) -> &'static str {
        match self {
            HandlerError::Decode(_) => "decode_error",
            HandlerError::Transient(_) => "transient_error",
            HandlerError::Permanent(_) => "permanent_error",
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, routing_key: &str, body: &[u8]) -> Result<(), HandlerError>;
}

// ============================================================================
// Order service handler
// ============================================================================

/// Maps `payment.succeeded` / `order.delivered` onto UpdateOrderStatus.
pub struct OrderEventHandler {
    update_status: Arc<UpdateOrderStatus>,
}

impl OrderEventHandler {
    pub fn new(update_status: Arc<UpdateOrderStatus>) -> Self {
        Self { update_status }
    }

    /// The order service queue bound to every status-advancing key.
    pub fn subscription(queue: &str, policy: AckPolicy) -> Subscription {
        let keys: Vec<&str> = StatusEvent::ALL.iter().map(|e| e.routing_key()).collect();
        Subscription::new(queue, &keys, policy.ack_mode())
    }
}

#[async_trait]
impl EventHandler for OrderEventHandler {
    async fn handle(&self, routing_key: &str, body: &[u8]) -> Result<(), HandlerError> {
        let event = StatusEvent::from_routing_key(routing_key)
            .ok_or_else(|| HandlerError::Decode(format!("unexpected routing key {}", routing_key)))?;

        let OrderRef { order_id } =
            serde_json::from_slice(body).map_err(|e| HandlerError::Decode(e.to_string()))?;

        tracing::info!(
            order_id = %order_id,
            routing_key = %routing_key,
            status = %event.target(),
            "📨 Applying inbound event"
        );

        self.update_status
            .execute(order_id, event.target())
            .await
            .map_err(|e| {
                if e.is_transient() {
                    HandlerError::Transient(e.to_string())
                } else {
                    HandlerError::Permanent(e.to_string())
                }
            })
    }
}

// ============================================================================
// Consumer loop
// ============================================================================

pub struct EventConsumer {
    channel: Arc<dyn EventChannel>,
    subscription: Subscription,
    policy: AckPolicy,
    handler: Arc<dyn EventHandler>,
    resubscribe_delay: Duration,
    component: String,
    metrics: Option<Arc<Metrics>>,
    health: Option<ActorRef<HealthMonitorActor>>,
}

pub struct ConsumerHandle {
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    /// Stop the loop immediately, wherever it is. Anything in flight is
    /// treated by the broker as a consumer crash.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl EventConsumer {
    pub fn new(
        channel: Arc<dyn EventChannel>,
        queue: &str,
        routing_keys: &[&str],
        policy: AckPolicy,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self::for_subscription(
            channel,
            Subscription::new(queue, routing_keys, policy.ack_mode()),
            policy,
            handler,
        )
    }

    pub fn for_subscription(
        channel: Arc<dyn EventChannel>,
        subscription: Subscription,
        policy: AckPolicy,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            channel,
            subscription: Subscription {
                ack_mode: policy.ack_mode(),
                ..subscription
            },
            policy,
            handler,
            resubscribe_delay: Duration::from_secs(1),
            component: EVENT_CONSUMER.to_string(),
            metrics: None,
            health: None,
        }
    }

    pub fn with_resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay = delay;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Report subscription state to `monitor` under `component`.
    pub fn with_health(mut self, monitor: ActorRef<HealthMonitorActor>, component: &str) -> Self {
        self.health = Some(monitor);
        self.component = component.to_string();
        self
    }

    pub fn spawn(self) -> ConsumerHandle {
        ConsumerHandle {
            task: tokio::spawn(self.run()),
        }
    }

    async fn run(self) {
        loop {
            match self.channel.subscribe(&self.subscription).await {
                Ok(stream) => {
                    tracing::info!(
                        queue = %self.subscription.queue,
                        policy = ?self.policy,
                        "🎧 Consuming events"
                    );
                    self.report(HealthStatus::Healthy).await;

                    self.consume(stream).await;

                    tracing::warn!(queue = %self.subscription.queue, "Delivery stream ended, resubscribing");
                    self.report(HealthStatus::Degraded("delivery stream ended".to_string()))
                        .await;
                }
                Err(e) => {
                    tracing::warn!(
                        queue = %self.subscription.queue,
                        error = %e,
                        retry_in_ms = self.resubscribe_delay.as_millis() as u64,
                        "Subscribe failed"
                    );
                    self.report(HealthStatus::Unhealthy(e.to_string())).await;
                }
            }

            tokio::time::sleep(self.resubscribe_delay).await;
        }
    }

    async fn consume(&self, mut stream: DeliveryStream) {
        while let Some(delivery) = stream.next().await {
            match delivery {
                Ok(delivery) => self.dispatch(delivery).await,
                Err(e) => {
                    tracing::error!(queue = %self.subscription.queue, error = %e, "Delivery error");
                    return;
                }
            }
        }
    }

    async fn dispatch(&self, delivery: Delivery) {
        let result = self
            .handler
            .handle(&delivery.routing_key, &delivery.body)
            .await;

        let outcome = match &result {
            Ok(()) => "ok",
            Err(e) => e.outcome(),
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_consumed(&delivery.routing_key, outcome);
            if matches!(result, Err(HandlerError::Decode(_))) {
                metrics.record_decode_failure(&delivery.routing_key);
            }
        }

        match &result {
            Ok(()) => {}
            Err(HandlerError::Decode(reason)) => {
                tracing::warn!(routing_key = %delivery.routing_key, reason = %reason, "Dropping undecodable event");
            }
            Err(e) => {
                tracing::error!(routing_key = %delivery.routing_key, error = %e, "Event handling failed");
            }
        }

        if self.policy == AckPolicy::OnDelivery {
            return;
        }

        let routing_key = delivery.routing_key.clone();
        let settled = match result {
            Ok(()) => delivery.ack().await,
            Err(HandlerError::Transient(_)) if !delivery.redelivered => {
                tracing::info!(routing_key = %routing_key, "Requeueing event for one more attempt");
                delivery.nack(true).await
            }
            Err(_) => delivery.reject().await,
        };
        if let Err(e) = settled {
            tracing::error!(routing_key = %routing_key, error = %e, "Failed to settle delivery");
        }
    }

    async fn report(&self, status: HealthStatus) {
        report_health(self.health.as_ref(), UpdateHealth::new(&self.component, status)).await;
    }
}
