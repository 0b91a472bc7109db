use std::sync::Arc;

use actix_web::{web, App, HttpResponse, HttpServer, Responder, ResponseError};
use chrono::Utc;
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::models::OrderRequest;
use crate::service::{OrderService, SubmitError};

// ============================================================================
// HTTP Front Door
// ============================================================================
//
// Thin request/response wrapper over the order service. Validation errors
// map to 400, unknown ids to 404; pipeline stage failures never surface
// here because the caller already received its pending order.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Order not found")]
    NotFound,

    #[error("Internal server error")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::Validation(message) => {
                HttpResponse::BadRequest().json(json!({ "error": message }))
            }
            ApiError::NotFound => {
                HttpResponse::NotFound().json(json!({ "error": "Order not found" }))
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail = %detail, "Request failed");
                HttpResponse::InternalServerError()
                    .json(json!({ "error": "Internal server error" }))
            }
        }
    }
}

async fn create_order(
    service: web::Data<Arc<OrderService>>,
    body: web::Json<OrderRequest>,
) -> Result<HttpResponse, ApiError> {
    match service.submit_order(body.into_inner()).await {
        Ok(order) => Ok(HttpResponse::Created().json(order)),
        Err(SubmitError::Validation(error)) => Err(ApiError::Validation(error.to_string())),
        Err(SubmitError::Broker(detail)) => Err(ApiError::Internal(detail)),
    }
}

async fn list_orders(service: web::Data<Arc<OrderService>>) -> impl Responder {
    HttpResponse::Ok().json(service.all_orders().await)
}

async fn get_order(
    service: web::Data<Arc<OrderService>>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    match service.get_order(path.into_inner()).await {
        Some(order) => Ok(HttpResponse::Ok().json(order)),
        None => Err(ApiError::NotFound),
    }
}

async fn health_handler() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn metrics_handler(metrics: web::Data<Arc<Metrics>>) -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(error) = encoder.encode(&metrics.registry().gather(), &mut buffer) {
        tracing::error!(error = %error, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_handler))
        .route("/metrics", web::get().to(metrics_handler))
        .service(
            web::scope("/api")
                .route("/orders", web::post().to(create_order))
                .route("/orders", web::get().to(list_orders))
                .route("/orders/{id}", web::get().to(get_order)),
        );
}

/// Run the HTTP server until shutdown. Callers must only reach this after
/// the broker connection succeeded.
pub async fn start_http_server(
    service: Arc<OrderService>,
    metrics: Arc<Metrics>,
    host: &str,
    port: u16,
) -> std::io::Result<()> {
    tracing::info!("🚀 HTTP server listening on http://{host}:{port}");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(service.clone()))
            .app_data(web::Data::new(metrics.clone()))
            .configure(configure_routes)
    })
    .bind((host, port))?
    .run()
    .await
}

// ============================================================================
// Unit Tests
// ============================================================================
