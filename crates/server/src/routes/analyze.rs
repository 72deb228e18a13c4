//! The analyze endpoint: one pipeline run streamed as server-sent events.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use cadforge_core::{AnalysisEvent, RunOptions};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::state::AppState;
use crate::{config, profile};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub config_path: Option<String>,
    #[serde(default)]
    pub options: RunOptions,
    pub profile_name: Option<String>,
}

fn resolve_config_path(root: &Path, config_path: &str) -> PathBuf {
    let path = Path::new(config_path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// POST /api/analyze
///
/// The run itself executes in a spawned task; this handler returns the SSE
/// stream immediately. If the client drops the stream, the channel closes
/// and the pipeline stops before its next stage.
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Response {
    let Some(config_path) = request.config_path.filter(|p| !p.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "configPath required"})),
        )
            .into_response();
    };

    let (tx, rx) = tokio::sync::mpsc::channel::<AnalysisEvent>(32);

    tokio::spawn(async move {
        let full_path = resolve_config_path(&state.root, &config_path);
        let config = match config::load_config(&full_path).await {
            Ok(config) => config,
            Err(e) => {
                let _ = tx
                    .send(AnalysisEvent::Error {
                        error: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        let shop_profile =
            profile::load_shop_profile(&state.root, request.profile_name.as_deref()).await;
        state
            .pipeline
            .run(config, request.options, shop_profile, tx)
            .await;
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        Ok::<Event, Infallible>(
            Event::default()
                .event(event.name())
                .data(event.payload().to_string()),
        )
    });

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_config_path_is_a_bad_request() {
        let dir = TempDir::new().unwrap();
        let state = AppState::new(dir.path(), None);

        let request = AnalyzeRequest {
            config_path: None,
            options: RunOptions::default(),
            profile_name: None,
        };
        let response = analyze(State(state), Json(request)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn analyze_returns_an_event_stream() {
        let dir = TempDir::new().unwrap();
        let state = AppState::new(dir.path(), None);

        let request = AnalyzeRequest {
            config_path: Some("part.toml".to_string()),
            options: RunOptions::default(),
            profile_name: None,
        };
        let response = analyze(State(state), Json(request)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert!(content_type.starts_with("text/event-stream"));
    }

    #[test]
    fn relative_config_paths_resolve_under_the_root() {
        let resolved = resolve_config_path(Path::new("/srv/cad"), "configs/part.toml");
        assert_eq!(resolved, Path::new("/srv/cad/configs/part.toml"));

        let resolved = resolve_config_path(Path::new("/srv/cad"), "/abs/part.toml");
        assert_eq!(resolved, Path::new("/abs/part.toml"));
    }
}
