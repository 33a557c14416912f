use std::sync::Arc;
use uuid::Uuid;

use crate::domain::order::{Order, OrderError, OrderRepository};

pub struct GetOrder {
    repository: Arc<dyn OrderRepository>,
}

impl GetOrder {
    pub fn new(repository: Arc<dyn OrderRepository>) -> Self {
        Self { repository }
    }

    /// Point lookup; items come back in insertion order.
    pub async fn execute(&self, order_id: Uuid) -> Result<Order, OrderError> {
        Ok(self.repository.get_order_by_id(order_id).await?)
    }
}
