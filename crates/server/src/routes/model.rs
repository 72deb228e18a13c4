//! One-shot model endpoints and service metadata.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cadforge_core::{CONFIGS_DIR_NAME, EXAMPLES_DIR_NAME, INSPECT_TIMEOUT, StageName};
use cadforge_pipeline::{spec_for, INSPECT_SCRIPT};
use serde_json::{json, Value};
use std::time::Duration;

use crate::state::AppState;

async fn run_one_shot(
    state: &AppState,
    script: &str,
    input: Value,
    timeout: Duration,
) -> Response {
    match state.executor.run_script(script, &input, timeout).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

/// POST /api/inspect — inspect a model file without running the pipeline.
pub async fn inspect(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    run_one_shot(&state, INSPECT_SCRIPT, body, INSPECT_TIMEOUT).await
}

/// POST /api/create — create a model from a config without the pipeline.
pub async fn create(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let spec = spec_for(StageName::Create);
    run_one_shot(&state, spec.script, body, spec.timeout).await
}

/// GET /api/examples — example config names, empty on error.
pub async fn examples(State(state): State<AppState>) -> Json<Vec<String>> {
    let dir = state.root.join(CONFIGS_DIR_NAME).join(EXAMPLES_DIR_NAME);
    let mut names = Vec::new();

    let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
        return Json(names);
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".toml") {
            names.push(name);
        }
    }
    names.sort();
    Json(names)
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "root": state.root.to_string_lossy(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn examples_lists_only_toml_files() {
        let dir = TempDir::new().unwrap();
        let examples_dir = dir.path().join(CONFIGS_DIR_NAME).join(EXAMPLES_DIR_NAME);
        std::fs::create_dir_all(&examples_dir).unwrap();
        std::fs::write(examples_dir.join("bracket.toml"), "").unwrap();
        std::fs::write(examples_dir.join("flange.toml"), "").unwrap();
        std::fs::write(examples_dir.join("notes.md"), "").unwrap();

        let state = AppState::new(dir.path(), None);
        let Json(names) = examples(State(state)).await;
        assert_eq!(names, vec!["bracket.toml", "flange.toml"]);
    }

    #[tokio::test]
    async fn examples_is_empty_when_the_directory_is_missing() {
        let dir = TempDir::new().unwrap();
        let state = AppState::new(dir.path(), None);
        let Json(names) = examples(State(state)).await;
        assert!(names.is_empty());
    }

    #[tokio::test]
    async fn health_reports_the_root() {
        let dir = TempDir::new().unwrap();
        let state = AppState::new(dir.path(), None);
        let Json(body) = health(State(state)).await;
        assert_eq!(body["status"], "ok");
        assert!(!body["root"].as_str().unwrap().is_empty());
    }
}
