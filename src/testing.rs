use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::domain::order::{
    AddressInput, CreateOrderInput, Order, OrderItemInput, ORDER_CREATED, ORDER_PAID,
};
use crate::messaging::{MessagingError, OrderEventProducer};

// ============================================================================
// Test helpers shared by unit tests
// ============================================================================

/// Records emissions instead of publishing them.
///
/// `hold()` parks every emission until `release()`; `fail(true)` makes
/// emissions fail after being recorded as attempted.
#[derive(Default)]
pub struct RecordingProducer {
    attempts: Mutex<Vec<(&'static str, Uuid)>>,
    held: AtomicBool,
    failing: AtomicBool,
    gate: Notify,
}

impl RecordingProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.gate.notify_waiters();
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn attempts(&self, routing_key: &str) -> Vec<Uuid> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| *key == routing_key)
            .map(|(_, id)| *id)
            .collect()
    }

    async fn emit(&self, routing_key: &'static str, order: &Order) -> Result<(), MessagingError> {
        while self.held.load(Ordering::SeqCst) {
            let released = self.gate.notified();
            if !self.held.load(Ordering::SeqCst) {
                break;
            }
            released.await;
        }

        self.attempts.lock().unwrap().push((routing_key, order.id));
        if self.failing.load(Ordering::SeqCst) {
            return Err(MessagingError::Disconnected);
        }
        Ok(())
    }
}

#[async_trait]
impl OrderEventProducer for RecordingProducer {
    async fn emit_order_created(&self, order: &Order) -> Result<(), MessagingError> {
        self.emit(ORDER_CREATED, order).await
    }

    async fn emit_order_paid(&self, order: &Order) -> Result<(), MessagingError> {
        self.emit(ORDER_PAID, order).await
    }
}

pub fn order_input(items: usize) -> CreateOrderInput {
    CreateOrderInput {
        user_id: Uuid::new_v4(),
        items: (0..items)
            .map(|i| OrderItemInput {
                product_id: Uuid::new_v4(),
                seller_id: Uuid::new_v4(),
                product_name: format!("Product {}", i + 1),
                unit_price: 50.0,
                quantity: 2,
            })
            .collect(),
        shipping_address: AddressInput {
            full_name: "Abebe Kebede".to_string(),
            phone: "+251911000000".to_string(),
            country: "Ethiopia".to_string(),
            city: "Addis Ababa".to_string(),
            street: "Bole Road".to_string(),
            postal_code: "1000".to_string(),
        },
        total_amount: 100.0 * items as f64,
    }
}
