use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::domain::order::{AddressInput, CreateOrderInput, OrderError, OrderItemInput, OrderStatus};

// ============================================================================
// Order endpoints
// ============================================================================
//
// POST /orders       -> 201 { order_id, status, created_at }
// GET  /orders/{id}  -> 200 full order with items
//
// Ids arrive as strings so a malformed one is reported by field name.
//
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: String,
    pub items: Vec<ItemRequest>,
    #[serde(default)]
    pub shipping_address: AddressInput,
    pub total_amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct ItemRequest {
    pub product_id: String,
    pub seller_id: String,
    pub product_name: String,
    pub unit_price: f64,
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

fn parse_id(value: &str, field: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(value).map_err(|_| ApiError::BadRequest(format!("invalid {}", field)))
}

impl CreateOrderRequest {
    pub fn into_input(self) -> Result<CreateOrderInput, ApiError> {
        let user_id = parse_id(&self.user_id, "user_id")?;

        let items = self
            .items
            .into_iter()
            .map(|item| {
                Ok(OrderItemInput {
                    product_id: parse_id(&item.product_id, "product_id")?,
                    seller_id: parse_id(&item.seller_id, "seller_id")?,
                    product_name: item.product_name,
                    unit_price: item.unit_price,
                    quantity: item.quantity,
                })
            })
            .collect::<Result<Vec<_>, ApiError>>()?;

        Ok(CreateOrderInput {
            user_id,
            items,
            shipping_address: self.shipping_address,
            total_amount: self.total_amount,
        })
    }
}

impl From<OrderError> for ApiError {
    fn from(e: OrderError) -> Self {
        if e.is_validation() {
            ApiError::BadRequest(e.to_string())
        } else if e.is_not_found() {
            ApiError::NotFound(e.to_string())
        } else {
            ApiError::Internal(e.to_string())
        }
    }
}

pub fn order_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/orders", web::post().to(create_order))
        .route("/orders/{order_id}", web::get().to(get_order));
}

async fn create_order(
    state: web::Data<AppState>,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, ApiError> {
    let input = body.into_inner().into_input()?;
    let order = state.use_cases.create_order.execute(input).await?;

    Ok(HttpResponse::Created().json(CreateOrderResponse {
        order_id: order.id,
        status: order.status,
        created_at: order.created_at,
    }))
}

async fn get_order(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let order_id = parse_id(&path.into_inner(), "order_id")?;
    let order = state.use_cases.get_order.execute(order_id).await?;
    Ok(HttpResponse::Ok().json(order))
}
