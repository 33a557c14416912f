// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Types, invariants and gateway traits. Nothing in here talks to a broker or
// a database directly.
//
// ============================================================================

pub mod order;
