use actix_web::{http::StatusCode, web, App, HttpResponse, HttpServer, ResponseError};

use crate::usecases::OrderUseCases;

mod orders;

pub use orders::{order_routes, CreateOrderRequest, CreateOrderResponse, ItemRequest};

// ============================================================================
// Request Interface - synchronous create / get over HTTP
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub use_cases: OrderUseCases,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": self.to_string() }))
    }
}

pub async fn start_http_server(state: AppState, port: u16) -> std::io::Result<()> {
    tracing::info!("🌐 Starting order API on http://0.0.0.0:{}", port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(order_routes)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
