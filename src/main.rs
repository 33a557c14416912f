use kameo::Actor;
use std::sync::Arc;
use std::time::Duration;

use order_choreography::actors::core::EVENT_CONSUMER;
use order_choreography::actors::{HealthMonitorActor, OutboxDispatcher};
use order_choreography::config::ServiceConfig;
use order_choreography::http::{start_http_server, AppState};
use order_choreography::messaging::{
    AmqpChannel, ConnectionSupervisor, EventChannel, EventConsumer, EventProducer,
    OrderEventHandler,
};
use order_choreography::metrics::{start_metrics_server, Metrics, OpsState};
use order_choreography::persistence::{connect_pool, PostgresOrderRepository};
use order_choreography::telemetry::{init_tracing, DEFAULT_FILTER};
use order_choreography::usecases::{EmissionMode, OrderSettings, OrderUseCases};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(DEFAULT_FILTER);

    tracing::info!("🚀 Starting order service");
    let config = ServiceConfig::load()?;

    // === 1. PostgreSQL ===
    let pool = connect_pool(&config.database).await?;
    let repository = Arc::new(PostgresOrderRepository::new(pool));
    if config.database.init_schema {
        repository.init_schema().await?;
    }

    // === 2. Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 3. RabbitMQ (fails hard after the dial attempts run out) ===
    let channel: Arc<dyn EventChannel> = Arc::new(AmqpChannel::connect(&config.broker).await?);
    let producer = Arc::new(EventProducer::new(channel.clone(), Some(metrics.clone())));

    // === 4. Health monitor + connection supervisor ===
    let health = HealthMonitorActor::spawn(
        HealthMonitorActor::new(Some(metrics.clone()))
            .watch_breaker(producer.breaker(), Duration::from_secs(10)),
    );
    ConnectionSupervisor::new(
        channel.clone(),
        config.broker.supervisor_interval(),
        config.broker.reconnect_retry(),
    )
    .with_metrics(metrics.clone())
    .with_health(health.clone())
    .spawn();

    // === 5. Use cases ===
    let use_cases = OrderUseCases::new(
        repository.clone(),
        producer.clone(),
        OrderSettings::from(&config),
        Some(metrics.clone()),
    );

    if config.emission.mode == EmissionMode::Outbox {
        tracing::info!("📤 Outbox emission enabled, starting dispatcher");
        OutboxDispatcher::spawn(
            OutboxDispatcher::new(repository.clone(), producer.clone(), &config.emission)
                .with_metrics(metrics.clone())
                .with_health(health.clone()),
        );
    }

    // === 6. Inbound events ===
    let policy = config.consumer.ack_policy;
    let consumer = EventConsumer::for_subscription(
        channel.clone(),
        OrderEventHandler::subscription(&config.consumer.queue, policy),
        policy,
        Arc::new(OrderEventHandler::new(use_cases.update_order_status.clone())),
    )
    .with_resubscribe_delay(Duration::from_millis(config.consumer.resubscribe_delay_ms))
    .with_metrics(metrics.clone())
    .with_health(health.clone(), EVENT_CONSUMER)
    .spawn();

    // === 7. Request interface + ops endpoints ===
    let ops = OpsState {
        metrics: metrics.clone(),
        health,
    };
    let served = tokio::try_join!(
        start_http_server(AppState { use_cases }, config.port),
        start_metrics_server(ops, config.metrics_port),
    );

    consumer.abort();
    tracing::info!("Order service stopped");
    served?;
    Ok(())
}
