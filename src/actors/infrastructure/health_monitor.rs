use kameo::Actor;
use kameo::message::{Context, Message};
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::reply::{Reply, ReplyError};
use serde::Serialize;
use std::sync::Arc;
use std::collections::BTreeMap;
use std::time::Duration;
use chrono::Utc;
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitState};
use crate::actors::core::{HealthStatus, ComponentHealth, EVENT_PRODUCER};

// ============================================================================
// Health Monitor Actor - Aggregates component health
// ============================================================================
//
// Components push their state with `UpdateHealth`. The publish circuit
// breaker, when given, is sampled on an interval. `/health` asks for the
// aggregate with `GetSystemHealth`.
//
// ============================================================================

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug)]
pub struct UpdateHealth {
    pub component: String,
    pub status: HealthStatus,
    pub details: Option<String>,
}

impl UpdateHealth {
    pub fn new(component: &str, status: HealthStatus) -> Self {
        Self {
            component: component.to_string(),
            status,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Send `update` if a monitor is attached. A stopped monitor is not an error
/// for the reporting component.
pub async fn report_health(monitor: Option<&ActorRef<HealthMonitorActor>>, update: UpdateHealth) {
    if let Some(monitor) = monitor {
        if monitor.tell(update).send().await.is_err() {
            tracing::debug!("Health monitor unavailable, dropping health report");
        }
    }
}

#[derive(Debug)]
pub struct GetSystemHealth;

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    pub check_time: chrono::DateTime<Utc>,
}

impl Reply for SystemHealth {
    type Ok = Self;
    type Error = Infallible;
    type Value = Self;

    fn to_result(self) -> Result<Self, Infallible> {
        Ok(self)
    }

    fn into_any_err(self) -> Option<Box<dyn ReplyError>> {
        None
    }

    fn into_value(self) -> Self::Value {
        self
    }
}

// ============================================================================
// Health Monitor Actor
// ============================================================================

pub struct HealthMonitorActor {
    components: BTreeMap<String, ComponentHealth>,
    breaker: Option<CircuitBreaker>,
    sample_interval: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl HealthMonitorActor {
    pub fn new(metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            components: BTreeMap::new(),
            breaker: None,
            sample_interval: Duration::from_secs(10),
            metrics,
        }
    }

    /// Sample `breaker` every `interval` and report it as the producer's health.
    pub fn watch_breaker(mut self, breaker: CircuitBreaker, interval: Duration) -> Self {
        self.breaker = Some(breaker);
        self.sample_interval = interval;
        self
    }

    fn compute_overall_status(&self) -> HealthStatus {
        let unhealthy: Vec<String> = self
            .components
            .iter()
            .filter_map(|(name, health)| match &health.status {
                HealthStatus::Unhealthy(reason) => Some(format!("{}: {}", name, reason)),
                _ => None,
            })
            .collect();

        if !unhealthy.is_empty() {
            HealthStatus::Unhealthy(unhealthy.join(", "))
        } else if self.components.values().any(|h| matches!(h.status, HealthStatus::Degraded(_))) {
            HealthStatus::Degraded("Some components degraded".to_string())
        } else {
            HealthStatus::Healthy
        }
    }
}

fn breaker_health(state: CircuitState) -> HealthStatus {
    match state {
        CircuitState::Closed => HealthStatus::Healthy,
        CircuitState::HalfOpen => HealthStatus::Degraded("Circuit breaker half-open".to_string()),
        CircuitState::Open => HealthStatus::Unhealthy("Circuit breaker open".to_string()),
    }
}

impl Actor for HealthMonitorActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(
        state: Self::Args,
        actor_ref: ActorRef<Self>
    ) -> Result<Self, Self::Error> {
        tracing::info!("HealthMonitorActor started");

        if let Some(breaker) = state.breaker.clone() {
            let monitor = actor_ref.clone();
            let period = state.sample_interval;

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                loop {
                    interval.tick().await;

                    let status = breaker_health(breaker.state().await);
                    if monitor
                        .tell(UpdateHealth::new(EVENT_PRODUCER, status))
                        .send()
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            });
        }

        Ok(state)
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<UpdateHealth> for HealthMonitorActor {
    type Reply = ();

    async fn handle(&mut self, msg: UpdateHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        tracing::debug!(
            component = %msg.component,
            status = ?msg.status,
            "Updated component health"
        );

        let mut health = ComponentHealth::new(msg.component.clone(), msg.status);
        health.details = msg.details;
        self.components.insert(msg.component, health);

        if let Some(metrics) = &self.metrics {
            metrics
                .system_health_status
                .set(self.compute_overall_status().as_gauge());
        }
    }
}

impl Message<GetSystemHealth> for HealthMonitorActor {
    type Reply = SystemHealth;

    async fn handle(&mut self, _msg: GetSystemHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        SystemHealth {
            overall_status: self.compute_overall_status(),
            components: self.components.clone(),
            check_time: Utc::now(),
        }
    }
}
