use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;

use crate::error::OrderError;
use crate::service::OrderGetter;

// ============================================================================
// Read API - thin dispatch over the order service
// ============================================================================
//
// GET /order/{order_uid} -> 200 full aggregate JSON
//                           400 blank identifier
//                           404 unknown identifier
//                           500 anything else
// GET /health            -> liveness probe
// GET /metrics           -> Prometheus text exposition
//
// All taxonomy-to-status mapping happens here; the service below only
// speaks OrderError.
// ============================================================================

pub struct ApiContext {
    pub orders: Arc<dyn OrderGetter>,
    pub registry: Registry,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

pub fn start_http_server(addr: &str, ctx: ApiContext) -> std::io::Result<Server> {
    let ctx = web::Data::new(ctx);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(ctx.clone())
            .configure(routes)
    })
    .disable_signals()
    .bind(addr)?
    .run();

    Ok(server)
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/order/{order_uid}", web::get().to(get_order))
        .route("/health", web::get().to(health_handler))
        .route("/metrics", web::get().to(metrics_handler));
}

async fn get_order(path: web::Path<String>, ctx: web::Data<ApiContext>) -> HttpResponse {
    let uid = path.into_inner();
    if uid.trim().is_empty() {
        return error_response(HttpResponse::BadRequest(), "order_uid is required");
    }

    match ctx.orders.get_order_by_uid(&uid).await {
        Ok(order) => HttpResponse::Ok().json(order),
        Err(OrderError::NotFound) => error_response(HttpResponse::NotFound(), "order not found"),
        Err(err) => {
            tracing::error!(order_uid = %uid, error = %err, "order lookup failed");
            error_response(HttpResponse::InternalServerError(), "internal server error")
        }
    }
}

async fn health_handler() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "order-service"
    }))
}

async fn metrics_handler(ctx: web::Data<ApiContext>) -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = ctx.registry.gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %err, "failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

fn error_response(mut builder: actix_web::HttpResponseBuilder, message: &str) -> HttpResponse {
    builder.json(ErrorBody { error: message.to_string() })
}
