use kameo::Actor;
use std::sync::Arc;

use order_choreography::actors::HealthMonitorActor;
use order_choreography::config::SimulatorConfig;
use order_choreography::messaging::{AmqpChannel, ConnectionSupervisor, EventChannel, EventProducer};
use order_choreography::metrics::{start_metrics_server, Metrics, OpsState};
use order_choreography::simulator::{DeliveryReaction, Simulator};
use order_choreography::telemetry::{init_tracing, DEFAULT_FILTER};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(DEFAULT_FILTER);

    tracing::info!("🚚 Starting delivery service");
    let config = SimulatorConfig::load(
        "DELIVERY_SERVICE",
        SimulatorConfig {
            metrics_port: 9092,
            delay_ms: 5000,
            ..SimulatorConfig::default()
        },
    )?;

    let metrics = Arc::new(Metrics::new()?);
    let channel: Arc<dyn EventChannel> = Arc::new(AmqpChannel::connect(&config.broker).await?);
    let producer = Arc::new(EventProducer::new(channel.clone(), Some(metrics.clone())));

    let health = HealthMonitorActor::spawn(HealthMonitorActor::new(Some(metrics.clone())));
    ConnectionSupervisor::new(
        channel.clone(),
        config.broker.supervisor_interval(),
        config.broker.reconnect_retry(),
    )
    .with_metrics(metrics.clone())
    .with_health(health.clone())
    .spawn();

    let consumer = Simulator::new(DeliveryReaction, producer, config.delay()).spawn(channel);

    let served = start_metrics_server(OpsState { metrics, health }, config.metrics_port).await;
    consumer.abort();
    served?;
    Ok(())
}
