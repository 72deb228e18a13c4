use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// The five pipeline stages, in their fixed run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Create,
    Drawing,
    Dfm,
    Tolerance,
    Cost,
}

impl StageName {
    /// All stages in pipeline run order.
    pub const ALL: [StageName; 5] = [
        StageName::Create,
        StageName::Drawing,
        StageName::Dfm,
        StageName::Tolerance,
        StageName::Cost,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Create => "create",
            StageName::Drawing => "drawing",
            StageName::Dfm => "dfm",
            StageName::Tolerance => "tolerance",
            StageName::Cost => "cost",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(StageName::Create),
            "drawing" => Ok(StageName::Drawing),
            "dfm" => Ok(StageName::Dfm),
            "tolerance" => Ok(StageName::Tolerance),
            "cost" => Ok(StageName::Cost),
            _ => Err(format!("unknown stage: {s}")),
        }
    }
}

/// Per-run options sent by the dashboard with an analyze request.
///
/// Stage toggles follow the original wire contract: a stage runs unless its
/// toggle is explicitly `false`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunOptions {
    /// Drawing standard written into the config (defaults to "KS")
    pub standard: Option<String>,
    pub drawing: Option<bool>,
    pub dfm: Option<bool>,
    pub tolerance: Option<bool>,
    pub cost: Option<bool>,
    pub process: Option<String>,
    pub material: Option<String>,
    pub batch: Option<u64>,
    pub dxf_export: Option<bool>,
    pub monte_carlo: Option<bool>,
    pub mc_samples: Option<f64>,
    pub weights_preset: Option<String>,
}

impl RunOptions {
    /// Whether a stage toggle permits the stage to run.
    ///
    /// `create` has no toggle and always returns true.
    #[must_use]
    pub fn stage_enabled(&self, stage: StageName) -> bool {
        let toggle = match stage {
            StageName::Create => return true,
            StageName::Drawing => self.drawing,
            StageName::Dfm => self.dfm,
            StageName::Tolerance => self.tolerance,
            StageName::Cost => self.cost,
        };
        toggle.unwrap_or(true)
    }

    /// Monte Carlo sample count, floored and validated to a positive integer.
    #[must_use]
    pub fn mc_sample_count(&self) -> Option<u64> {
        let samples = self.mc_samples?;
        if samples.is_finite() && samples > 0.0 {
            Some(samples.floor() as u64)
        } else {
            None
        }
    }
}

/// One recorded stage failure within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: StageName,
    pub error: String,
}

/// Transient per-run aggregate, serialized as the `complete` event payload.
///
/// Owned exclusively by the orchestrator invocation and discarded after the
/// run's `complete` event has been emitted. Never persisted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunResults {
    pub stages: Vec<StageName>,
    pub errors: Vec<StageFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drawing: Option<Value>,
    #[serde(rename = "drawingSvg", skip_serializing_if = "Option::is_none")]
    pub drawing_svg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qa: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dfm: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<Value>,
}

impl RunResults {
    /// The upstream DFM score, folded into the cost stage's cache key so a
    /// changed DFM result invalidates a stale cached cost.
    #[must_use]
    pub fn dfm_score(&self) -> Option<Value> {
        self.dfm.as_ref().and_then(|d| d.get("score")).cloned()
    }

    /// Record a stage failure.
    pub fn push_error(&mut self, stage: StageName, error: impl Into<String>) {
        self.errors.push(StageFailure {
            stage,
            error: error.into(),
        });
    }
}
