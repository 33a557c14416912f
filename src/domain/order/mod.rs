// ============================================================================
// Order Domain
// ============================================================================
//
// Everything the order service knows about an order:
// - Value objects (OrderItem, ShippingAddress, OrderStatus, history)
// - Integration events and routing keys
// - Commands (CreateOrderInput) and their preconditions
// - Errors (OrderError, RepositoryError)
// - Aggregate (Order)
// - Transition policy
// - Persistence gateway traits and the outbox row
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod state_machine;
pub mod outbox;
pub mod repository;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use state_machine::*;
pub use outbox::*;
pub use repository::*;
