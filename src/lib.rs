pub mod config;
pub mod geo;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod services;
pub mod sources;
pub mod utils;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::services::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let observer = Router::new()
        .route("/api/ingest/status", post(handlers::ingest::ingest_status))
        .route("/api/ingest/conditions", post(handlers::ingest::ingest_conditions))
        .route("/api/forecast/cycle", post(handlers::forecast::run_forecast_cycle))
        .route("/api/backtest/run", post(handlers::forecast::run_backtest))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_observer,
        ));

    Router::new()
        .route("/api/boards/corridor/:id", get(handlers::boards::corridor_board))
        .route("/api/boards/terminal/:id", get(handlers::boards::terminal_board))
        .route("/api/wind/:corridor_id", get(handlers::boards::corridor_wind))
        .route("/api/forecast/:corridor_id", get(handlers::forecast::corridor_forecast))
        .route("/health", get(handlers::health))
        .merge(observer)
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
