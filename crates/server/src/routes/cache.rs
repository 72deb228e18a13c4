//! Cache introspection and admin endpoints.

use axum::extract::{Query, State};
use axum::Json;
use cadforge_cache::{CacheStats, ClearOutcome};
use serde::Deserialize;

use crate::state::AppState;

/// GET /api/cache/stats
pub async fn stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.cache.stats().await)
}

#[derive(Debug, Deserialize)]
pub struct ClearParams {
    pub stage: Option<String>,
}

/// DELETE /api/cache?stage=
pub async fn clear(
    State(state): State<AppState>,
    Query(params): Query<ClearParams>,
) -> Json<ClearOutcome> {
    Json(state.cache.clear(params.stage.as_deref()).await)
}
