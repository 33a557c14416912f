use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use super::commands::CreateOrderInput;
use super::value_objects::{OrderItem, OrderStatus, ShippingAddress};

// ============================================================================
// Order Aggregate
// ============================================================================
//
// The order owns its items and its shipping address. After creation only
// `status` (and `updated_at` alongside it) ever changes, and only through
// UpdateOrderStatus reacting to inbound events.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    // Identity
    pub id: Uuid,
    pub user_id: Uuid,

    // Current State
    pub status: OrderStatus,
    pub total_amount: f64,
    pub currency: String,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub items: Vec<OrderItem>,
}

/// Everything CreateOrder writes in one transaction.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order: Order,
    pub address: ShippingAddress,
}

impl Order {
    /// Build a fresh `CREATED` order with a newly allocated identity.
    ///
    /// Item and address identities are allocated here too, so the whole
    /// graph can be inserted as one unit.
    pub fn place(input: CreateOrderInput, currency: &str) -> NewOrder {
        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let items = input
            .items
            .into_iter()
            .map(|item| OrderItem {
                id: Uuid::new_v4(),
                order_id,
                product_id: item.product_id,
                seller_id: item.seller_id,
                product_name: item.product_name,
                unit_price: item.unit_price,
                quantity: item.quantity,
            })
            .collect();

        let address = input.shipping_address;
        let address = ShippingAddress {
            id: Uuid::new_v4(),
            order_id,
            full_name: address.full_name,
            phone: address.phone,
            country: address.country,
            city: address.city,
            street: address.street,
            postal_code: address.postal_code,
        };

        NewOrder {
            order: Order {
                id: order_id,
                user_id: input.user_id,
                status: OrderStatus::Created,
                total_amount: input.total_amount,
                currency: currency.to_string(),
                created_at: now,
                updated_at: now,
                items,
            },
            address,
        }
    }

    /// Sum of the item lines. Not enforced against `total_amount`.
    pub fn items_total(&self) -> f64 {
        self.items.iter().map(OrderItem::line_total).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::commands::{AddressInput, OrderItemInput};

    fn input() -> CreateOrderInput {
        CreateOrderInput {
            user_id: Uuid::new_v4(),
            items: vec![
                OrderItemInput {
                    product_id: Uuid::new_v4(),
                    seller_id: Uuid::new_v4(),
                    product_name: "Coffee".to_string(),
                    unit_price: 40.0,
                    quantity: 2,
                },
                OrderItemInput {
                    product_id: Uuid::new_v4(),
                    seller_id: Uuid::new_v4(),
                    product_name: "Mug".to_string(),
                    unit_price: 20.0,
                    quantity: 1,
                },
            ],
            shipping_address: AddressInput {
                full_name: "John Doe".to_string(),
                phone: "1234567890".to_string(),
                city: "New York".to_string(),
                street: "Fifth Avenue".to_string(),
                ..Default::default()
            },
            total_amount: 100.0,
        }
    }

    #[test]
    fn test_place_builds_created_order() {
        let input = input();
        let user_id = input.user_id;

        let NewOrder { order, address } = Order::place(input, "ETB");

        assert_eq!(order.user_id, user_id);
        assert_eq!(order.status, OrderStatus::Created);
        assert_eq!(order.currency, "ETB");
        assert_eq!(order.total_amount, 100.0);
        assert_eq!(order.created_at, order.updated_at);
        assert_eq!(address.order_id, order.id);
        assert_eq!(address.full_name, "John Doe");
    }

    #[test]
    fn test_place_keeps_item_order_and_ownership() {
        let NewOrder { order, .. } = Order::place(input(), "ETB");

        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].product_name, "Coffee");
        assert_eq!(order.items[1].product_name, "Mug");
        assert!(order.items.iter().all(|item| item.order_id == order.id));
        assert_ne!(order.items[0].id, order.items[1].id);
        assert_eq!(order.items_total(), 100.0);
    }

    #[test]
    fn test_each_placement_gets_fresh_identity() {
        let first = Order::place(input(), "ETB");
        let second = Order::place(input(), "ETB");
        assert_ne!(first.order.id, second.order.id);
    }
}
