// ============================================================================
// Actors Module
// ============================================================================
//
// Actor-based infrastructure for background concerns.
//
// Structure:
// - core/           - Health types shared by every component
// - infrastructure/ - Concrete actors (health monitor, outbox dispatcher)
//
// Note: Order logic lives in the use cases, NOT in actors.
//       Actors are reserved for infrastructure concerns only.
//
// ============================================================================

pub mod core;
pub mod infrastructure;

pub use self::core::{ComponentHealth, HealthStatus};
pub use infrastructure::{
    DispatchNow,
    DispatchReport,
    GetSystemHealth,
    HealthMonitorActor,
    OutboxDispatcher,
    SystemHealth,
    UpdateHealth,
};
