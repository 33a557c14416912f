use uuid::Uuid;

use super::value_objects::OrderStatus;

// ============================================================================
// Order Errors
// ============================================================================

/// Failure of a persistence gateway operation.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound(_))
    }
}

/// Failure of an order use case.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order items cannot be empty")]
    EmptyItems,

    #[error("Invalid item quantity: {0}")]
    InvalidQuantity(i32),

    #[error("Invalid unit price: {0}")]
    InvalidUnitPrice(f64),

    #[error("Illegal status transition for order {order_id}: {from} -> {to}")]
    IllegalTransition {
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl OrderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, OrderError::Repository(e) if e.is_not_found())
    }

    /// Whether retrying the same operation could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            OrderError::Repository(RepositoryError::Database(_))
                | OrderError::Repository(RepositoryError::Unavailable(_))
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            OrderError::EmptyItems | OrderError::InvalidQuantity(_) | OrderError::InvalidUnitPrice(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_passes_through_unchanged() {
        let id = Uuid::new_v4();
        let err: OrderError = RepositoryError::NotFound(id).into();

        assert!(err.is_not_found());
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), format!("Order not found: {}", id));
    }

    #[test]
    fn test_unavailable_is_transient() {
        let err: OrderError = RepositoryError::Unavailable("db down".into()).into();
        assert!(err.is_transient());
        assert!(!err.is_validation());
    }

    #[test]
    fn test_illegal_transition_message() {
        let order_id = Uuid::new_v4();
        let err = OrderError::IllegalTransition {
            order_id,
            from: OrderStatus::Delivered,
            to: OrderStatus::Created,
        };
        assert!(err.to_string().contains("DELIVERED -> CREATED"));
        assert!(!err.is_transient());
    }
}
