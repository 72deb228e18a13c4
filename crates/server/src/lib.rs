//! HTTP backend for the cadforge dashboard.
//!
//! Thin orchestration glue over the pipeline and cache crates: an analyze
//! endpoint streaming run progress as server-sent events, cache
//! introspection/admin endpoints, one-shot model endpoints, and static
//! serving of generated artifacts.

pub mod config;
pub mod profile;
pub mod routes;
pub mod state;

use axum::routing::{delete, get, post};
use axum::Router;
use cadforge_core::{CONFIGS_DIR_NAME, OUTPUT_DIR_NAME};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let artifacts = ServeDir::new(state.root.join(OUTPUT_DIR_NAME));
    let configs = ServeDir::new(state.root.join(CONFIGS_DIR_NAME));

    Router::new()
        .route("/api/analyze", post(routes::analyze::analyze))
        .route("/api/cache/stats", get(routes::cache::stats))
        .route("/api/cache", delete(routes::cache::clear))
        .route("/api/inspect", post(routes::model::inspect))
        .route("/api/create", post(routes::model::create))
        .route("/api/examples", get(routes::model::examples))
        .route("/api/health", get(routes::model::health))
        .nest_service("/artifacts", artifacts)
        .nest_service("/configs", configs)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
