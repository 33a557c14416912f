use serde::Serialize;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;

use super::events::DomainEvent;

// ============================================================================
// Outbox Message - an event written in the same transaction as the state
// change it describes, published later by the dispatcher
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub routing_key: String,
    pub payload: String,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
}

impl OutboxMessage {
    /// Serialize `event` into a pending outbox row.
    ///
    /// Ids are v7 so rows sort by creation time.
    pub fn from_event<E: DomainEvent>(event: &E) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::now_v7(),
            aggregate_id: event.aggregate_id(),
            routing_key: event.routing_key().to_string(),
            payload: serde_json::to_string(event)?,
            attempts: 0,
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Dead,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Sent => "sent",
            OutboxStatus::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OutboxStatus::Pending),
            "sent" => Some(OutboxStatus::Sent),
            "dead" => Some(OutboxStatus::Dead),
            _ => None,
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::events::{OrderPaidEvent, ORDER_PAID};

    #[test]
    fn test_from_event_captures_routing() {
        let event = OrderPaidEvent {
            order_id: Uuid::new_v4(),
            amount: 42.0,
            timestamp: Utc::now(),
        };

        let message = OutboxMessage::from_event(&event).unwrap();

        assert_eq!(message.aggregate_id, event.order_id);
        assert_eq!(message.routing_key, ORDER_PAID);
        assert_eq!(message.attempts, 0);
        let decoded: OrderPaidEvent = serde_json::from_str(&message.payload).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [OutboxStatus::Pending, OutboxStatus::Sent, OutboxStatus::Dead] {
            assert_eq!(OutboxStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OutboxStatus::parse("unknown"), None);
    }
}
