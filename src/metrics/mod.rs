mod server;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec,
    IntGauge, Opts, Registry,
};

pub use server::{ops_routes, start_metrics_server, OpsState};

// ============================================================================
// Metrics - Prometheus instrumentation for the order lifecycle
// ============================================================================
//
// Covers:
// - Use case outcomes (orders created, status updates, latency)
// - Broker traffic (published / failed / consumed / undecodable)
// - Outbox dispatch and dead-lettering
// - Connection supervision and the publish circuit breaker
//
// Scraped via /metrics
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Use Case Metrics
    pub orders_created: IntCounter,
    pub status_updates: IntCounterVec,
    pub operation_duration: HistogramVec,

    // Broker Metrics
    pub events_published: IntCounterVec,
    pub events_publish_failed: IntCounterVec,
    pub events_consumed: IntCounterVec,
    pub events_decode_failed: IntCounterVec,

    // Outbox Metrics
    pub outbox_dispatched: IntCounterVec,
    pub outbox_dead_lettered: IntCounterVec,

    // Connection Metrics
    pub broker_reconnects: IntCounterVec,
    pub circuit_breaker_state: IntGauge,
    pub system_health_status: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Orders durably created")?;
        registry.register(Box::new(orders_created.clone()))?;

        let status_updates = IntCounterVec::new(
            Opts::new("order_status_updates_total", "Order status writes by target status and outcome"),
            &["status", "outcome"],
        )?;
        registry.register(Box::new(status_updates.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new("order_operation_duration_seconds", "Use case latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let events_published = IntCounterVec::new(
            Opts::new("events_published_total", "Events accepted by the broker"),
            &["routing_key"],
        )?;
        registry.register(Box::new(events_published.clone()))?;

        let events_publish_failed = IntCounterVec::new(
            Opts::new("events_publish_failed_total", "Events the broker did not accept"),
            &["routing_key", "reason"],
        )?;
        registry.register(Box::new(events_publish_failed.clone()))?;

        let events_consumed = IntCounterVec::new(
            Opts::new("events_consumed_total", "Inbound events handed to a use case"),
            &["routing_key", "outcome"],
        )?;
        registry.register(Box::new(events_consumed.clone()))?;

        let events_decode_failed = IntCounterVec::new(
            Opts::new("events_decode_failed_total", "Inbound events dropped as undecodable"),
            &["routing_key"],
        )?;
        registry.register(Box::new(events_decode_failed.clone()))?;

        let outbox_dispatched = IntCounterVec::new(
            Opts::new("outbox_dispatched_total", "Outbox rows published and marked sent"),
            &["routing_key"],
        )?;
        registry.register(Box::new(outbox_dispatched.clone()))?;

        let outbox_dead_lettered = IntCounterVec::new(
            Opts::new("outbox_dead_lettered_total", "Outbox rows given up on"),
            &["routing_key"],
        )?;
        registry.register(Box::new(outbox_dead_lettered.clone()))?;

        let broker_reconnects = IntCounterVec::new(
            Opts::new("broker_reconnects_total", "Broker reconnect attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(broker_reconnects.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Publish circuit breaker state (0=Closed, 1=HalfOpen, 2=Open)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        let system_health_status = IntGauge::new(
            "system_health_status",
            "Aggregated health (0=Unhealthy, 1=Degraded, 2=Healthy)",
        )?;
        registry.register(Box::new(system_health_status.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            status_updates,
            operation_duration,
            events_published,
            events_publish_failed,
            events_consumed,
            events_decode_failed,
            outbox_dispatched,
            outbox_dead_lettered,
            broker_reconnects,
            circuit_breaker_state,
            system_health_status,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_publish(&self, routing_key: &str, failure: Option<&str>) {
        match failure {
            None => self.events_published.with_label_values(&[routing_key]).inc(),
            Some(reason) => self
                .events_publish_failed
                .with_label_values(&[routing_key, reason])
                .inc(),
        }
    }

    pub fn record_consumed(&self, routing_key: &str, outcome: &str) {
        self.events_consumed.with_label_values(&[routing_key, outcome]).inc();
    }

    pub fn record_decode_failure(&self, routing_key: &str) {
        self.events_decode_failed.with_label_values(&[routing_key]).inc();
    }

    pub fn record_status_update(&self, status: &str, success: bool) {
        let outcome = if success { "ok" } else { "error" };
        self.status_updates.with_label_values(&[status, outcome]).inc();
    }

    pub fn observe_operation(&self, operation: &str, duration_secs: f64) {
        self.operation_duration.with_label_values(&[operation]).observe(duration_secs);
    }

    pub fn record_outbox(&self, routing_key: &str, dead_lettered: bool) {
        if dead_lettered {
            self.outbox_dead_lettered.with_label_values(&[routing_key]).inc();
        } else {
            self.outbox_dispatched.with_label_values(&[routing_key]).inc();
        }
    }

    pub fn record_reconnect(&self, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.broker_reconnects.with_label_values(&[outcome]).inc();
    }

    pub fn set_circuit_breaker_state(&self, state: crate::utils::CircuitState) {
        self.circuit_breaker_state.set(state.as_gauge());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::CircuitState;

    fn counter_value(metrics: &Metrics, name: &str) -> f64 {
        metrics
            .registry()
            .gather()
            .iter()
            .find(|family| family.name() == name)
            .map(|family| family.metric.iter().map(|m| m.counter.value.unwrap_or(0.0)).sum())
            .unwrap_or(0.0)
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.orders_created.inc();
        assert!(!metrics.registry().gather().is_empty());
        assert_eq!(counter_value(&metrics, "orders_created_total"), 1.0);
    }

    #[test]
    fn test_record_publish_outcomes() {
        let metrics = Metrics::new().unwrap();
        metrics.record_publish("order.created", None);
        metrics.record_publish("order.paid", None);
        metrics.record_publish("order.paid", Some("circuit_open"));

        assert_eq!(counter_value(&metrics, "events_published_total"), 2.0);
        assert_eq!(counter_value(&metrics, "events_publish_failed_total"), 1.0);
    }

    #[test]
    fn test_record_outbox() {
        let metrics = Metrics::new().unwrap();
        metrics.record_outbox("order.created", false);
        metrics.record_outbox("order.created", true);

        assert_eq!(counter_value(&metrics, "outbox_dispatched_total"), 1.0);
        assert_eq!(counter_value(&metrics, "outbox_dead_lettered_total"), 1.0);
    }

    #[test]
    fn test_circuit_breaker_gauge() {
        let metrics = Metrics::new().unwrap();
        metrics.set_circuit_breaker_state(CircuitState::Open);
        assert_eq!(metrics.circuit_breaker_state.get(), 2);
    }
}
