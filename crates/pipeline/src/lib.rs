//! Analysis pipeline orchestrator for cadforge
//!
//! Drives the fixed stage sequence `create → drawing → dfm → tolerance →
//! cost` for one analyze request: consults the result cache before invoking
//! an external stage executor, stores executor output back into the cache,
//! and emits a strictly ordered stream of progress events. Non-fatal stage
//! failures are recorded and the run continues; a `create` failure is fatal
//! because every downstream stage depends on model geometry existing.

pub mod enrich;
pub mod executor;
pub mod runner;
pub mod spec;

pub use enrich::{DrawingEnricher, SystemDrawingEnricher};
pub use executor::{ScriptExecutor, SystemScriptExecutor};
pub use runner::{AnalysisPipeline, EventSink};
pub use spec::{spec_for, StageSpec, INSPECT_SCRIPT, STAGES};
