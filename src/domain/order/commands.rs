use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::OrderError;

// ============================================================================
// Order Commands - Represent caller intent
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderInput {
    pub user_id: Uuid,
    pub items: Vec<OrderItemInput>,
    pub shipping_address: AddressInput,
    pub total_amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemInput {
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub product_name: String,
    pub unit_price: f64,
    pub quantity: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressInput {
    pub full_name: String,
    pub phone: String,
    pub country: String,
    pub city: String,
    pub street: String,
    pub postal_code: String,
}

impl CreateOrderInput {
    /// Check the item preconditions before anything is persisted.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.items.is_empty() {
            return Err(OrderError::EmptyItems);
        }

        for item in &self.items {
            if item.quantity < 1 {
                return Err(OrderError::InvalidQuantity(item.quantity));
            }
            if item.unit_price < 0.0 || item.unit_price.is_nan() {
                return Err(OrderError::InvalidUnitPrice(item.unit_price));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(unit_price: f64, quantity: i32) -> OrderItemInput {
        OrderItemInput {
            product_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            product_name: "Widget".to_string(),
            unit_price,
            quantity,
        }
    }

    fn input(items: Vec<OrderItemInput>) -> CreateOrderInput {
        CreateOrderInput {
            user_id: Uuid::new_v4(),
            items,
            shipping_address: AddressInput::default(),
            total_amount: 0.0,
        }
    }

    #[test]
    fn test_valid_input_passes() {
        assert!(input(vec![item(100.0, 1), item(0.0, 3)]).validate().is_ok());
    }

    #[test]
    fn test_empty_items_rejected() {
        assert!(matches!(input(vec![]).validate(), Err(OrderError::EmptyItems)));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let result = input(vec![item(10.0, 0)]).validate();
        assert!(matches!(result, Err(OrderError::InvalidQuantity(0))));
    }

    #[test]
    fn test_negative_price_rejected() {
        let result = input(vec![item(-1.0, 1)]).validate();
        assert!(matches!(result, Err(OrderError::InvalidUnitPrice(p)) if p == -1.0));
    }
}
