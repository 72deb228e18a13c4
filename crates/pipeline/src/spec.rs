//! Static stage table.

use cadforge_core::{
    StageName, COST_TIMEOUT, CREATE_TIMEOUT, DFM_TIMEOUT, DRAWING_TIMEOUT, TOLERANCE_TIMEOUT,
};
use std::time::Duration;

/// Static description of one pipeline stage, defined once at startup.
#[derive(Debug, Clone, Copy)]
pub struct StageSpec {
    pub name: StageName,
    /// Executor script implementing the stage
    pub script: &'static str,
    pub timeout: Duration,
}

/// The five stages in pipeline run order.
pub const STAGES: [StageSpec; 5] = [
    StageSpec {
        name: StageName::Create,
        script: "create_model.py",
        timeout: CREATE_TIMEOUT,
    },
    StageSpec {
        name: StageName::Drawing,
        script: "generate_drawing.py",
        timeout: DRAWING_TIMEOUT,
    },
    StageSpec {
        name: StageName::Dfm,
        script: "dfm_checker.py",
        timeout: DFM_TIMEOUT,
    },
    StageSpec {
        name: StageName::Tolerance,
        script: "tolerance_analysis.py",
        timeout: TOLERANCE_TIMEOUT,
    },
    StageSpec {
        name: StageName::Cost,
        script: "cost_estimator.py",
        timeout: COST_TIMEOUT,
    },
];

/// Metadata inspection used when the create stage degrades to a direct
/// import.
pub const INSPECT_SCRIPT: &str = "inspect_model.py";

/// Look up a stage's spec.
#[must_use]
pub fn spec_for(stage: StageName) -> &'static StageSpec {
    let index = match stage {
        StageName::Create => 0,
        StageName::Drawing => 1,
        StageName::Dfm => 2,
        StageName::Tolerance => 3,
        StageName::Cost => 4,
    };
    &STAGES[index]
}
