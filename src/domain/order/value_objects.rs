use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Order Value Objects
// ============================================================================

/// Lifecycle status of an order.
///
/// Only `Created`, `Paid` and `Delivered` are reachable through the event
/// choreography. `Pending`, `Canceled` and `Shipped` are part of the stored
/// vocabulary but no inbound routing key produces them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    Pending,
    Paid,
    Canceled,
    Shipped,
    Delivered,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Created,
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Canceled,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
    ];

    /// Column / wire representation
    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// A line of an order. Owned by exactly one order and never modified after
/// the order is created.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub product_name: String,
    pub unit_price: f64,
    pub quantity: i32,
}

impl OrderItem {
    pub fn line_total(&self) -> f64 {
        self.unit_price * f64::from(self.quantity)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ShippingAddress {
    pub id: Uuid,
    pub order_id: Uuid,
    pub full_name: String,
    pub phone: String,
    pub country: String,
    pub city: String,
    pub street: String,
    pub postal_code: String,
}

/// Append-only audit record of a status write.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StatusHistoryEntry {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub changed_at: DateTime<Utc>,
}

impl StatusHistoryEntry {
    pub fn record(order_id: Uuid, status: OrderStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            status,
            changed_at: Utc::now(),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
