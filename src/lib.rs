//! ShopStock API Library
//!
//! Multi-tenant order and stock engine for retail shops: lot-level stock with
//! first-expiry-first-out allocation, atomic order creation, per-shop order
//! codes and a forward-only order lifecycle.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use http::HeaderValue;
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};

use crate::{
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    errors::ServiceError,
    events::EventSender,
    services::stock_ledger::Clock,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pub event_sender: Arc<EventSender>,
    pub services: handlers::AppServices,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: AppConfig,
        event_sender: Arc<EventSender>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ServiceError> {
        let services =
            handlers::AppServices::new(db.clone(), event_sender.clone(), &config, clock)?;
        let auth = Arc::new(AuthService::new(AuthConfig::from(&config), db.clone()));
        Ok(Self {
            db,
            config,
            event_sender,
            services,
            auth,
        })
    }
}

pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        // Status and health endpoints
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .merge(handlers::orders::order_routes())
        .merge(handlers::customers::customer_routes())
        .merge(handlers::stock::stock_routes())
}

/// CORS from config: explicit origins win, otherwise permissive only where allowed
pub fn cors_layer(cfg: &AppConfig) -> Result<CorsLayer, ServiceError> {
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .filter_map(|origin| HeaderValue::from_str(origin).ok())
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    if let Some(origins) = configured_origins {
        Ok(CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_credentials(cfg.cors_allow_credentials))
    } else if cfg.should_allow_permissive_cors() {
        ::tracing::info!(
            environment = %cfg.environment,
            "Using permissive CORS because explicit origins were not configured"
        );
        Ok(CorsLayer::permissive())
    } else {
        Err(ServiceError::InternalError(
            "Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true"
                .to_string(),
        ))
    }
}

/// Full application router: v1 API, Swagger UI and the shared middleware stack
pub fn build_router(state: AppState) -> Result<Router, ServiceError> {
    let cors = cors_layer(&state.config)?;
    let auth_service = state.auth.clone();
    let request_timeout = state.config.request_timeout();

    let router = Router::<AppState>::new()
        .route("/", get(|| async { "shopstock-api up" }))
        .nest("/api/v1", api_v1_routes())
        .with_state(state)
        .merge(openapi::swagger_ui())
        .layer(TimeoutLayer::new(request_timeout))
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(axum::middleware::from_fn(
            middleware_helpers::security_headers_middleware,
        ))
        // Inject AuthService into request extensions for auth middleware
        .layer(axum::middleware::from_fn_with_state(
            auth_service,
            |State(auth): State<Arc<AuthService>>,
             mut req: axum::extract::Request,
             next: axum::middleware::Next| async move {
                req.extensions_mut().insert(auth);
                next.run(req).await
            },
        ))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ));

    Ok(router)
}

async fn api_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "shopstock-api",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let db_status = match db::check_connection(&state.db).await {
        Ok(()) => "healthy",
        Err(e) => {
            ::tracing::warn!(error = %e, "Health check could not reach the database");
            "unhealthy"
        }
    };
    let code = if db_status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(json!({
            "status": db_status,
            "checks": { "database": db_status },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}
