use chrono::{DateTime, Utc};
use serde::Serialize;

// ============================================================================
// Health Check Abstractions
// ============================================================================
//
// Component names reported by the order service:
// - broker            (connection supervisor)
// - event_producer    (publish circuit breaker)
// - event_consumer    (dispatch loop)
// - outbox_dispatcher (outbox mode only)
//
// ============================================================================

pub const BROKER: &str = "broker";
pub const EVENT_PRODUCER: &str = "event_producer";
pub const EVENT_CONSUMER: &str = "event_consumer";
pub const OUTBOX_DISPATCHER: &str = "outbox_dispatcher";

/// Health status of a component
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy(_))
    }

    /// 0=Unhealthy, 1=Degraded, 2=Healthy
    pub fn as_gauge(&self) -> i64 {
        match self {
            HealthStatus::Unhealthy(_) => 0,
            HealthStatus::Degraded(_) => 1,
            HealthStatus::Healthy => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            last_check: Utc::now(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
