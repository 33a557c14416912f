use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::OrderError;
use super::events::StatusEvent;
use super::value_objects::OrderStatus;

// ============================================================================
// Status Transitions
// ============================================================================
//
// | From     | Event               | To        |
// |----------|---------------------|-----------|
// | CREATED  | payment.succeeded   | PAID      |
// | PAID     | order.delivered     | DELIVERED |
//
// Under `Permissive` the table is advisory: any status overwrites any other
// and duplicate events re-apply. Under `Strict` anything outside the table
// is an `IllegalTransition`.
//
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPolicy {
    #[default]
    Permissive,
    Strict,
}

/// Next status for `(current, event)`, or `None` when the table has no row.
pub fn next_status(current: OrderStatus, event: StatusEvent) -> Option<OrderStatus> {
    match (current, event) {
        (OrderStatus::Created, StatusEvent::PaymentSucceeded) => Some(OrderStatus::Paid),
        (OrderStatus::Paid, StatusEvent::OrderDelivered) => Some(OrderStatus::Delivered),
        _ => None,
    }
}

impl TransitionPolicy {
    /// Whether the policy lets an order at `current` be written as `target`.
    pub fn permits(&self, current: OrderStatus, target: OrderStatus) -> bool {
        match self {
            TransitionPolicy::Permissive => true,
            TransitionPolicy::Strict => StatusEvent::ALL
                .iter()
                .any(|event| event.target() == target && next_status(current, *event) == Some(target)),
        }
    }

    pub fn check(
        &self,
        order_id: Uuid,
        current: OrderStatus,
        target: OrderStatus,
    ) -> Result<(), OrderError> {
        if self.permits(current, target) {
            Ok(())
        } else {
            Err(OrderError::IllegalTransition {
                order_id,
                from: current,
                to: target,
            })
        }
    }

    /// Strict mode needs the current status before writing.
    pub fn needs_current_status(&self) -> bool {
        matches!(self, TransitionPolicy::Strict)
    }
}
