use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::fmt;

use crate::utils::IsTransient;

// ============================================================================
// Messaging - topic-routed event channel and the components built on it
// ============================================================================
//
// - EventChannel: publish / subscribe against one topic exchange
// - AmqpChannel: RabbitMQ implementation (lapin)
// - InMemoryBroker: in-process implementation with the same routing rules
// - EventProducer: JSON encoding + circuit breaker on top of a channel
// - EventConsumer: spawned dispatch loop with an explicit ack policy
// - ConnectionSupervisor: detects a dropped connection and reconnects
//
// Channel handles are built once and handed to producers and consumers.
//
// ============================================================================

mod amqp;
mod consumer;
mod memory;
mod producer;
mod supervisor;
pub mod topic;

pub use amqp::AmqpChannel;
pub use consumer::{AckPolicy, ConsumerHandle, EventConsumer, EventHandler, HandlerError, OrderEventHandler};
pub use memory::InMemoryBroker;
pub use producer::{EventProducer, OrderEventProducer};
pub use supervisor::{ConnectionSupervisor, SupervisorCheck};

pub const EXCHANGE: &str = "order_events";
pub const ORDER_SERVICE_QUEUE: &str = "order_service_events_queue";
pub const PAYMENT_SERVICE_QUEUE: &str = "payment_service_queue";
pub const DELIVERY_SERVICE_QUEUE: &str = "delivery_service_queue";

pub const CONTENT_TYPE_JSON: &str = "application/json";

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Not connected to broker")]
    Disconnected,

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Acknowledgement failed: {0}")]
    Ack(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Circuit breaker '{0}' is open")]
    CircuitOpen(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl IsTransient for MessagingError {
    fn is_transient(&self) -> bool {
        !matches!(self, MessagingError::Serialization(_) | MessagingError::Ack(_))
    }
}

impl MessagingError {
    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            MessagingError::Connection(_) => "connection",
            MessagingError::Disconnected => "disconnected",
            MessagingError::Publish(_) => "publish",
            MessagingError::Subscribe(_) => "subscribe",
            MessagingError::Ack(_) => "ack",
            MessagingError::Serialization(_) => "serialization",
            MessagingError::CircuitOpen(_) => "circuit_open",
            MessagingError::Timeout(_) => "timeout",
        }
    }
}

/// When the broker considers a delivery settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Settled as soon as it is handed to the consumer (no-ack)
    Auto,
    /// Settled only by an explicit ack / nack / reject
    Manual,
}

/// A durable queue bound to a set of routing keys.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub queue: String,
    pub routing_keys: Vec<String>,
    pub ack_mode: AckMode,
}

impl Subscription {
    pub fn new(queue: &str, routing_keys: &[&str], ack_mode: AckMode) -> Self {
        Self {
            queue: queue.to_string(),
            routing_keys: routing_keys.iter().map(|k| k.to_string()).collect(),
            ack_mode,
        }
    }
}

/// Broker-side settlement of one delivery.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<(), MessagingError>;
    async fn nack(&self, requeue: bool) -> Result<(), MessagingError>;
}

pub struct Delivery {
    pub routing_key: String,
    pub body: Vec<u8>,
    pub redelivered: bool,
    acker: Option<Box<dyn Acknowledger>>,
}

impl Delivery {
    /// `acker` is `None` for auto-ack subscriptions.
    pub fn new(
        routing_key: impl Into<String>,
        body: Vec<u8>,
        redelivered: bool,
        acker: Option<Box<dyn Acknowledger>>,
    ) -> Self {
        Self {
            routing_key: routing_key.into(),
            body,
            redelivered,
            acker,
        }
    }

    pub async fn ack(self) -> Result<(), MessagingError> {
        match &self.acker {
            Some(acker) => acker.ack().await,
            None => Ok(()),
        }
    }

    pub async fn nack(self, requeue: bool) -> Result<(), MessagingError> {
        match &self.acker {
            Some(acker) => acker.nack(requeue).await,
            None => Ok(()),
        }
    }

    pub async fn reject(self) -> Result<(), MessagingError> {
        self.nack(false).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("routing_key", &self.routing_key)
            .field("bytes", &self.body.len())
            .field("redelivered", &self.redelivered)
            .field("manual_ack", &self.acker.is_some())
            .finish()
    }
}

pub type DeliveryStream = BoxStream<'static, Result<Delivery, MessagingError>>;

/// Handle on one topic exchange.
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Returns once the broker has accepted the message for routing.
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<(), MessagingError>;

    /// Declare the queue, bind every routing key, and start consuming.
    /// The stream ends when the connection is lost.
    async fn subscribe(&self, subscription: &Subscription) -> Result<DeliveryStream, MessagingError>;

    async fn is_connected(&self) -> bool;

    /// Replace a dead connection. A single attempt; callers own the retry policy.
    async fn reconnect(&self) -> Result<(), MessagingError>;
}
