use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use kameo::actor::ActorRef;
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;

use super::Metrics;
use crate::actors::{GetSystemHealth, HealthMonitorActor};

/// Shared by the `/metrics` and `/health` handlers.
#[derive(Clone)]
pub struct OpsState {
    pub metrics: Arc<Metrics>,
    pub health: ActorRef<HealthMonitorActor>,
}

pub fn ops_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(metrics_handler))
        .route("/health", web::get().to(health_handler));
}

/// Serve `/metrics` and `/health` until the process exits.
pub async fn start_metrics_server(state: OpsState, port: u16) -> std::io::Result<()> {
    tracing::info!("📊 Starting metrics server on http://0.0.0.0:{}/metrics", port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(ops_routes)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

async fn metrics_handler(state: web::Data<OpsState>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry().gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn health_handler(state: web::Data<OpsState>) -> impl Responder {
    match state.health.ask(GetSystemHealth).await {
        Ok(health) if health.overall_status.is_unhealthy() => {
            HttpResponse::ServiceUnavailable().json(health)
        }
        Ok(health) => HttpResponse::Ok().json(health),
        Err(_) => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "overall_status": { "state": "unhealthy", "reason": "health monitor unavailable" }
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::{HealthStatus, UpdateHealth};
    use actix_web::{http::StatusCode, test};
    use kameo::Actor;

    async fn state() -> OpsState {
        let metrics = Arc::new(Metrics::new().unwrap());
        let health = HealthMonitorActor::spawn(HealthMonitorActor::new(Some(metrics.clone())));
        OpsState { metrics, health }
    }

    #[actix_web::test]
    async fn test_metrics_endpoint_exposes_registry() {
        let state = state().await;
        state.metrics.orders_created.inc();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(ops_routes),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        assert!(String::from_utf8_lossy(&body).contains("orders_created_total 1"));
    }

    #[actix_web::test]
    async fn test_health_reports_unhealthy_component() {
        let state = state().await;
        let monitor = state.health.clone();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(ops_routes),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        monitor
            .tell(UpdateHealth::new("broker", HealthStatus::Unhealthy("connection lost".into())))
            .send()
            .await
            .unwrap();

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["overall_status"]["state"], "unhealthy");
        assert_eq!(body["components"]["broker"]["status"]["reason"], "connection lost");
    }
}
