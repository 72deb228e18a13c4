//! Progress events emitted by a pipeline run.
//!
//! A run produces a strictly ordered stream of events: for each applicable
//! stage a `start` followed by `done` or `error`, and exactly one trailing
//! `complete`. The server maps each event onto a named SSE record; the enum
//! here is transport-agnostic so tests can consume runs over a plain channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{RunResults, StageName};

/// Stage lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Start,
    Done,
    Error,
}

/// Payload of a `stage` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEvent {
    pub stage: StageName,
    pub status: StageStatus,
    /// Set on `done`: whether the result was served from the cache
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    /// Set on the create stage's `done` when the run used a direct import
    #[serde(rename = "stepDirect", skip_serializing_if = "Option::is_none")]
    pub step_direct: Option<bool>,
    /// Set on `error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageEvent {
    #[must_use]
    pub fn start(stage: StageName) -> Self {
        Self {
            stage,
            status: StageStatus::Start,
            cached: None,
            step_direct: None,
            error: None,
        }
    }

    #[must_use]
    pub fn done(stage: StageName, cached: bool) -> Self {
        Self {
            stage,
            status: StageStatus::Done,
            cached: Some(cached),
            step_direct: None,
            error: None,
        }
    }

    #[must_use]
    pub fn error(stage: StageName, error: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Error,
            cached: None,
            step_direct: None,
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn with_step_direct(mut self, step_direct: bool) -> Self {
        self.step_direct = Some(step_direct);
        self
    }
}

/// One record of a run's progress stream.
#[derive(Debug, Clone)]
pub enum AnalysisEvent {
    /// A stage started, finished, or failed
    Stage(StageEvent),
    /// The run finished; carries the aggregate results
    Complete(RunResults),
    /// The run failed before the stage loop could complete
    Error { error: String },
}

impl AnalysisEvent {
    /// The wire event name used by the SSE transport.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            AnalysisEvent::Stage(_) => "stage",
            AnalysisEvent::Complete(_) => "complete",
            AnalysisEvent::Error { .. } => "error",
        }
    }

    /// The wire event payload.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            AnalysisEvent::Stage(event) => {
                serde_json::to_value(event).unwrap_or(Value::Null)
            }
            AnalysisEvent::Complete(results) => {
                serde_json::to_value(results).unwrap_or(Value::Null)
            }
            AnalysisEvent::Error { error } => serde_json::json!({ "error": error }),
        }
    }
}
