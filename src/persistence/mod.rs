// ============================================================================
// Persistence - implementations of the order gateway traits
// ============================================================================

pub mod memory;
pub mod postgres;

pub use memory::{CreateStage, InMemoryOrderRepository, RowCounts};
pub use postgres::{connect_pool, PostgresOrderRepository};
