// ============================================================================
// Infrastructure Actors
// ============================================================================
//
// - Health monitoring
// - Outbox dispatch (outbox emission mode only)
//
// ============================================================================

mod health_monitor;
mod outbox_dispatcher;

pub use health_monitor::{report_health, GetSystemHealth, HealthMonitorActor, SystemHealth, UpdateHealth};
pub use outbox_dispatcher::{DispatchNow, DispatchReport, OutboxDispatcher};
