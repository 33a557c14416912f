use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ServiceConfig;
use crate::domain::order::{OrderRepository, TransitionPolicy};
use crate::messaging::OrderEventProducer;
use crate::metrics::Metrics;

mod create_order;
mod get_order;
mod update_order_status;

pub use create_order::CreateOrder;
pub use get_order::GetOrder;
pub use update_order_status::UpdateOrderStatus;

// ============================================================================
// Use Cases - the three operations of the order service
// ============================================================================
//
// CreateOrder and GetOrder serve the request interface; UpdateOrderStatus
// is driven only by the event consumer.
//
// ============================================================================

/// How `order.created` / `order.paid` leave the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmissionMode {
    /// Published from a detached task after commit; failures are swallowed
    #[default]
    Detached,
    /// Written to the outbox in the same transaction; published by the dispatcher
    Outbox,
}

#[derive(Debug, Clone)]
pub struct OrderSettings {
    pub currency: String,
    pub emission: EmissionMode,
    /// Budget of one detached emission
    pub emission_timeout: Duration,
    pub transitions: TransitionPolicy,
}

impl Default for OrderSettings {
    fn default() -> Self {
        Self {
            currency: "ETB".to_string(),
            emission: EmissionMode::Detached,
            emission_timeout: Duration::from_secs(5),
            transitions: TransitionPolicy::Permissive,
        }
    }
}

impl From<&ServiceConfig> for OrderSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            currency: config.currency.clone(),
            emission: config.emission.mode,
            emission_timeout: config.emission.timeout(),
            transitions: config.transitions.policy,
        }
    }
}

/// All three use cases over one repository and producer.
#[derive(Clone)]
pub struct OrderUseCases {
    pub create_order: Arc<CreateOrder>,
    pub get_order: Arc<GetOrder>,
    pub update_order_status: Arc<UpdateOrderStatus>,
}

impl OrderUseCases {
    pub fn new(
        repository: Arc<dyn OrderRepository>,
        producer: Arc<dyn OrderEventProducer>,
        settings: OrderSettings,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            create_order: Arc::new(CreateOrder::new(
                repository.clone(),
                producer.clone(),
                settings.clone(),
                metrics.clone(),
            )),
            get_order: Arc::new(GetOrder::new(repository.clone())),
            update_order_status: Arc::new(UpdateOrderStatus::new(
                repository,
                producer,
                settings,
                metrics,
            )),
        }
    }
}
