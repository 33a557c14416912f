use kameo::actor::ActorRef;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::EventChannel;
use crate::actors::core::{HealthStatus, BROKER};
use crate::actors::infrastructure::{report_health, HealthMonitorActor, UpdateHealth};
use crate::metrics::Metrics;
use crate::utils::{retry_with_backoff, RetryConfig, RetryResult};

// ============================================================================
// Connection Supervisor
// ============================================================================
//
// Polls the channel for the lifetime of the process. A dropped connection
// is replaced with exponential backoff; consumers notice their stream ended
// and resubscribe on their own once the channel is back.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorCheck {
    Healthy,
    Reconnected,
    /// Every reconnect attempt of this round failed
    StillDown,
}

pub struct ConnectionSupervisor {
    channel: Arc<dyn EventChannel>,
    interval: Duration,
    retry: RetryConfig,
    metrics: Option<Arc<Metrics>>,
    health: Option<ActorRef<HealthMonitorActor>>,
}

impl ConnectionSupervisor {
    pub fn new(channel: Arc<dyn EventChannel>, interval: Duration, retry: RetryConfig) -> Self {
        Self {
            channel,
            interval,
            retry,
            metrics: None,
            health: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_health(mut self, monitor: ActorRef<HealthMonitorActor>) -> Self {
        self.health = Some(monitor);
        self
    }

    pub async fn check_once(&self) -> SupervisorCheck {
        if self.channel.is_connected().await {
            self.report(UpdateHealth::new(BROKER, HealthStatus::Healthy)).await;
            return SupervisorCheck::Healthy;
        }

        tracing::warn!("⚠️ Broker connection lost, reconnecting");
        self.report(UpdateHealth::new(
            BROKER,
            HealthStatus::Unhealthy("connection lost".to_string()),
        ))
        .await;

        let channel = self.channel.clone();
        let result = retry_with_backoff(self.retry.clone(), |attempt| {
            let channel = channel.clone();
            async move {
                tracing::debug!(attempt, "Reconnect attempt");
                channel.reconnect().await
            }
        })
        .await;

        let reconnected = result.is_success();
        if let Some(metrics) = &self.metrics {
            metrics.record_reconnect(reconnected);
        }

        match result {
            RetryResult::Success(()) => {
                tracing::info!("✅ Broker connection restored");
                self.report(UpdateHealth::new(BROKER, HealthStatus::Healthy).with_details("reconnected"))
                    .await;
                SupervisorCheck::Reconnected
            }
            RetryResult::Failed(e) | RetryResult::PermanentFailure(e) => {
                tracing::error!(error = %e, "❌ Reconnect failed, will retry next interval");
                SupervisorCheck::StillDown
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            loop {
                interval.tick().await;
                self.check_once().await;
            }
        })
    }

    async fn report(&self, update: UpdateHealth) {
        report_health(self.health.as_ref(), update).await;
    }
}
