use kameo::Actor;
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::message::{Context, Message};
use kameo::reply::{Reply, ReplyError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::health_monitor::{report_health, HealthMonitorActor, UpdateHealth};
use crate::actors::core::{HealthStatus, OUTBOX_DISPATCHER};
use crate::config::EmissionConfig;
use crate::domain::order::{OutboxMessage, OutboxStore};
use crate::messaging::EventProducer;
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, RetryConfig, RetryResult};

// ============================================================================
// Outbox Dispatcher Actor - publishes committed outbox rows
// ============================================================================
//
// Polls `outbox_messages` for pending rows (oldest first), publishes each
// through the producer, and marks it sent. Delivery is at-least-once: a
// crash between publish and mark_sent publishes the row again.
//
// A row that fails to publish keeps its place and is retried on the next
// poll; after `max_attempts` failed polls it is moved to `dead`. Later rows
// of the same order wait behind a failed one within a batch so an order's
// events stay in commit order.
//
// ============================================================================

// ============================================================================
// Messages
// ============================================================================

/// Run one batch now.
#[derive(Debug)]
pub struct DispatchNow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    /// Held back behind a failed row of the same order
    pub deferred: usize,
}

impl Reply for DispatchReport {
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
// Outbox Dispatcher Actor
// ============================================================================

pub struct OutboxDispatcher {
    store: Arc<dyn OutboxStore>,
    producer: Arc<EventProducer>,
    batch_size: i64,
    max_attempts: i32,
    /// `None` disables the internal poll loop; batches then run only on `DispatchNow`
    poll_interval: Option<Duration>,
    publish_retry: RetryConfig,
    metrics: Option<Arc<Metrics>>,
    health: Option<ActorRef<HealthMonitorActor>>,
}

impl OutboxDispatcher {
    pub fn new(store: Arc<dyn OutboxStore>, producer: Arc<EventProducer>, config: &EmissionConfig) -> Self {
        Self {
            store,
            producer,
            batch_size: config.outbox_batch_size,
            max_attempts: config.outbox_max_attempts,
            poll_interval: Some(config.outbox_poll_interval()),
            publish_retry: RetryConfig::exponential(3, Duration::from_millis(100), Duration::from_secs(2)),
            metrics: None,
            health: None,
        }
    }

    pub fn manual(mut self) -> Self {
        self.poll_interval = None;
        self
    }

    pub fn with_publish_retry(mut self, retry: RetryConfig) -> Self {
        self.publish_retry = retry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_health(mut self, monitor: ActorRef<HealthMonitorActor>) -> Self {
        self.health = Some(monitor);
        self
    }

    async fn dispatch_batch(&self) -> DispatchReport {
        let mut report = DispatchReport::default();

        let pending = match self.store.fetch_pending(self.batch_size).await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read pending outbox rows");
                self.report(HealthStatus::Degraded(format!("outbox read failed: {}", e)))
                    .await;
                return report;
            }
        };

        if pending.is_empty() {
            return report;
        }
        tracing::debug!(rows = pending.len(), "Dispatching outbox batch");

        let mut blocked = HashSet::new();
        for message in pending {
            if blocked.contains(&message.aggregate_id) {
                report.deferred += 1;
                continue;
            }

            match self.publish(&message).await {
                Ok(()) => {
                    if let Err(e) = self.store.mark_sent(message.id).await {
                        // Published but still pending: it goes out again next poll
                        tracing::warn!(outbox_id = %message.id, error = %e, "Failed to mark outbox row sent");
                    }
                    if let Some(metrics) = &self.metrics {
                        metrics.record_outbox(&message.routing_key, false);
                    }
                    report.sent += 1;
                }
                Err(error) => {
                    blocked.insert(message.aggregate_id);
                    let dead = message.attempts + 1 >= self.max_attempts;

                    if let Err(e) = self.store.record_failure(message.id, &error, dead).await {
                        tracing::warn!(outbox_id = %message.id, error = %e, "Failed to record outbox failure");
                    }

                    if dead {
                        tracing::error!(
                            outbox_id = %message.id,
                            order_id = %message.aggregate_id,
                            routing_key = %message.routing_key,
                            attempts = message.attempts + 1,
                            error = %error,
                            "❌ Outbox row dead-lettered"
                        );
                        if let Some(metrics) = &self.metrics {
                            metrics.record_outbox(&message.routing_key, true);
                        }
                        report.dead_lettered += 1;
                    } else {
                        tracing::warn!(
                            outbox_id = %message.id,
                            routing_key = %message.routing_key,
                            attempts = message.attempts + 1,
                            error = %error,
                            "Outbox publish failed, will retry"
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        if report.failed + report.dead_lettered > 0 {
            self.report(HealthStatus::Degraded(format!(
                "{} outbox rows failed to publish",
                report.failed + report.dead_lettered
            )))
            .await;
        } else {
            self.report(HealthStatus::Healthy).await;
        }

        tracing::info!(
            sent = report.sent,
            failed = report.failed,
            dead_lettered = report.dead_lettered,
            "📤 Outbox batch dispatched"
        );
        report
    }

    async fn publish(&self, message: &OutboxMessage) -> Result<(), String> {
        let producer = self.producer.clone();
        let routing_key = message.routing_key.clone();
        let payload = message.payload.clone();

        let result = retry_on_transient(self.publish_retry.clone(), |attempt| {
            let producer = producer.clone();
            let routing_key = routing_key.clone();
            let payload = payload.clone();

            async move {
                tracing::debug!(attempt, routing_key = %routing_key, "Publishing outbox row");
                producer.publish_raw(&routing_key, payload.as_bytes()).await
            }
        })
        .await;

        match result {
            RetryResult::Success(()) => Ok(()),
            RetryResult::Failed(e) | RetryResult::PermanentFailure(e) => Err(e.to_string()),
        }
    }

    async fn report(&self, status: HealthStatus) {
        report_health(self.health.as_ref(), UpdateHealth::new(OUTBOX_DISPATCHER, status)).await;
    }
}

impl Actor for OutboxDispatcher {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(
        state: Self::Args,
        actor_ref: ActorRef<Self>
    ) -> Result<Self, Self::Error> {
        tracing::info!(
            batch_size = state.batch_size,
            max_attempts = state.max_attempts,
            "OutboxDispatcher actor started"
        );

        if let Some(period) = state.poll_interval {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    if actor_ref.tell(DispatchNow).send().await.is_err() {
                        break;
                    }
                }
            });
        }

        Ok(state)
    }
}

impl Message<DispatchNow> for OutboxDispatcher {
    type Reply = DispatchReport;

    async fn handle(&mut self, _msg: DispatchNow, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.dispatch_batch().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{
        Order, OrderCreatedEvent, OrderPaidEvent, OrderRepository, OrderStatus, OutboxStatus,
        ORDER_CREATED, ORDER_PAID,
    };
    use crate::messaging::{EventChannel, InMemoryBroker};
    use crate::persistence::InMemoryOrderRepository;
    use crate::testing::order_input;

    async fn seeded(repo: &InMemoryOrderRepository) -> (Order, OutboxMessage, OutboxMessage) {
        let placed = Order::place(order_input(1), "ETB");
        let created = OutboxMessage::from_event(&OrderCreatedEvent::from(&placed.order)).unwrap();
        repo.create_order(&placed.order, &placed.address, Some(&created)).await.unwrap();

        let paid = OutboxMessage::from_event(&OrderPaidEvent::for_order(&placed.order)).unwrap();
        repo.update_order_status(placed.order.id, OrderStatus::Paid, Some(&paid))
            .await
            .unwrap();
        (placed.order, created, paid)
    }

    fn dispatcher(repo: &InMemoryOrderRepository, broker: &InMemoryBroker, max_attempts: i32) -> OutboxDispatcher {
        let config = EmissionConfig {
            outbox_max_attempts: max_attempts,
            ..EmissionConfig::default()
        };
        OutboxDispatcher::new(
            Arc::new(repo.clone()),
            Arc::new(EventProducer::new(Arc::new(broker.clone()), None)),
            &config,
        )
        .manual()
        .with_publish_retry(RetryConfig::fixed(1, Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn test_publishes_pending_rows_in_order_and_marks_sent() {
        let repo = InMemoryOrderRepository::new();
        let broker = InMemoryBroker::new();
        broker.declare_queue("audit", &["order.*"]);
        let (order, created, paid) = seeded(&repo).await;

        let actor = OutboxDispatcher::spawn(dispatcher(&repo, &broker, 5));
        let report = actor.ask(DispatchNow).await.unwrap();

        assert_eq!(report.sent, 2);
        let keys: Vec<String> = broker.drain("audit").into_iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec![ORDER_CREATED.to_string(), ORDER_PAID.to_string()]);
        assert_eq!(repo.outbox_status(created.id).await.unwrap().0, OutboxStatus::Sent);
        assert_eq!(repo.outbox_status(paid.id).await.unwrap().0, OutboxStatus::Sent);

        let body: serde_json::Value = serde_json::from_slice(&broker.published(ORDER_PAID)[0]).unwrap();
        assert_eq!(body["order_id"], order.id.to_string());

        // Nothing left to send
        assert_eq!(actor.ask(DispatchNow).await.unwrap(), DispatchReport::default());
    }

    #[tokio::test]
    async fn test_failed_row_blocks_later_rows_of_same_order() {
        let repo = InMemoryOrderRepository::new();
        let broker = InMemoryBroker::new();
        let (_, created, paid) = seeded(&repo).await;
        broker.fail_publishes(1);

        let actor = OutboxDispatcher::spawn(dispatcher(&repo, &broker, 5));
        let report = actor.ask(DispatchNow).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.deferred, 1);
        let (status, attempts, error) = repo.outbox_status(created.id).await.unwrap();
        assert_eq!(status, OutboxStatus::Pending);
        assert_eq!(attempts, 1);
        assert!(error.unwrap().contains("injected"));
        assert_eq!(repo.outbox_status(paid.id).await.unwrap().1, 0);

        // Next poll recovers both, still in order
        let report = actor.ask(DispatchNow).await.unwrap();
        assert_eq!(report.sent, 2);
        assert_eq!(broker.published(ORDER_CREATED).len(), 1);
    }

    #[tokio::test]
    async fn test_dead_letters_after_max_attempts() {
        let repo = InMemoryOrderRepository::new();
        let broker = InMemoryBroker::new();
        let metrics = Arc::new(Metrics::new().unwrap());
        let (_, created, _) = seeded(&repo).await;
        broker.disconnect();

        let actor = OutboxDispatcher::spawn(dispatcher(&repo, &broker, 2).with_metrics(metrics.clone()));
        assert_eq!(actor.ask(DispatchNow).await.unwrap().failed, 1);
        assert_eq!(actor.ask(DispatchNow).await.unwrap().dead_lettered, 1);

        let (status, attempts, _) = repo.outbox_status(created.id).await.unwrap();
        assert_eq!(status, OutboxStatus::Dead);
        assert_eq!(attempts, 2);
        assert_eq!(
            metrics.outbox_dead_lettered.with_label_values(&[ORDER_CREATED]).get(),
            1
        );

        // The dead row no longer blocks the order's next event
        broker.reconnect().await.unwrap();
        let report = actor.ask(DispatchNow).await.unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(broker.published(ORDER_PAID).len(), 1);
    }

    #[tokio::test]
    async fn test_poll_loop_dispatches_without_prompting() {
        let repo = InMemoryOrderRepository::new();
        let broker = InMemoryBroker::new();
        let (_, created, _) = seeded(&repo).await;

        let config = EmissionConfig {
            outbox_poll_interval_ms: 10,
            ..EmissionConfig::default()
        };
        let _actor = OutboxDispatcher::spawn(OutboxDispatcher::new(
            Arc::new(repo.clone()),
            Arc::new(EventProducer::new(Arc::new(broker.clone()), None)),
            &config,
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(repo.outbox_status(created.id).await.unwrap().0, OutboxStatus::Sent);
        assert!(broker.is_connected().await);
    }
}
