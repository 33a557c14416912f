// ============================================================================
// Order Choreography
// ============================================================================
//
// The order service of an event-driven commerce flow: it persists orders,
// announces them on the `order_events` topic exchange, and advances their
// status when payment and delivery events come back. The payment and
// delivery simulators close the loop.
//
// ============================================================================

pub mod actors;
pub mod config;
pub mod domain;
pub mod http;
pub mod messaging;
pub mod metrics;
pub mod persistence;
pub mod simulator;
pub mod telemetry;
pub mod usecases;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;
