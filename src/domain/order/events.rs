use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use super::aggregate::Order;
use super::value_objects::{OrderItem, OrderStatus};

// ============================================================================
// Integration Events - the wire contract of the `order_events` exchange
// ============================================================================
//
// Every body is UTF-8 JSON. The order service publishes `order.created` and
// `order.paid`; it consumes `payment.succeeded` and `order.delivered`.
//
// ============================================================================

pub const ORDER_CREATED: &str = "order.created";
pub const ORDER_PAID: &str = "order.paid";
pub const ORDER_DELIVERED: &str = "order.delivered";
pub const PAYMENT_SUCCEEDED: &str = "payment.succeeded";

/// Base trait for all events put on the exchange
pub trait DomainEvent: Serialize {
    fn routing_key(&self) -> &'static str;
    fn aggregate_id(&self) -> Uuid;
    fn timestamp(&self) -> DateTime<Utc>;
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderCreatedEvent {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub total_amount: f64,
    pub currency: String,
    pub items: Vec<OrderItem>,
    pub timestamp: DateTime<Utc>,
}

impl From<&Order> for OrderCreatedEvent {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            user_id: order.user_id,
            total_amount: order.total_amount,
            currency: order.currency.clone(),
            items: order.items.clone(),
            timestamp: order.created_at,
        }
    }
}

impl DomainEvent for OrderCreatedEvent {
    fn routing_key(&self) -> &'static str {
        ORDER_CREATED
    }

    fn aggregate_id(&self) -> Uuid {
        self.order_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderPaidEvent {
    pub order_id: Uuid,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
}

impl OrderPaidEvent {
    /// Stamped with the emission time, not the payment time.
    pub fn for_order(order: &Order) -> Self {
        Self {
            order_id: order.id,
            amount: order.total_amount,
            timestamp: Utc::now(),
        }
    }
}

impl DomainEvent for OrderPaidEvent {
    fn routing_key(&self) -> &'static str {
        ORDER_PAID
    }

    fn aggregate_id(&self) -> Uuid {
        self.order_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Emitted by the payment service.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PaymentSucceededEvent {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for PaymentSucceededEvent {
    fn routing_key(&self) -> &'static str {
        PAYMENT_SUCCEEDED
    }

    fn aggregate_id(&self) -> Uuid {
        self.order_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Emitted by the delivery service.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderDeliveredEvent {
    pub order_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub status: String,
}

impl DomainEvent for OrderDeliveredEvent {
    fn routing_key(&self) -> &'static str {
        ORDER_DELIVERED
    }

    fn aggregate_id(&self) -> Uuid {
        self.order_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// The only part of an inbound event the order service reads.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct OrderRef {
    pub order_id: Uuid,
}

/// Inbound events that request a status advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusEvent {
    PaymentSucceeded,
    OrderDelivered,
}

impl StatusEvent {
    pub const ALL: [StatusEvent; 2] = [StatusEvent::PaymentSucceeded, StatusEvent::OrderDelivered];

    pub fn from_routing_key(routing_key: &str) -> Option<Self> {
        match routing_key {
            PAYMENT_SUCCEEDED => Some(StatusEvent::PaymentSucceeded),
            ORDER_DELIVERED => Some(StatusEvent::OrderDelivered),
            _ => None,
        }
    }

    pub const fn routing_key(&self) -> &'static str {
        match self {
            StatusEvent::PaymentSucceeded => PAYMENT_SUCCEEDED,
            StatusEvent::OrderDelivered => ORDER_DELIVERED,
        }
    }

    /// Status the event asks for
    pub const fn target(&self) -> OrderStatus {
        match self {
            StatusEvent::PaymentSucceeded => OrderStatus::Paid,
            StatusEvent::OrderDelivered => OrderStatus::Delivered,
        }
    }
}
