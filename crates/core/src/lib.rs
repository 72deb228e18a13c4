//! Core domain types, events, errors, and constants for cadforge.
//!
//! This crate establishes the foundational data structures and error handling
//! mechanisms shared by the cache, pipeline, and server crates.
//!
//! ## Key Components
//!
//! - **`errors`**: Defines the primary `Error` enum and `Result` type alias,
//!   centralizing all possible failure modes for predictable error handling.
//! - **`events`**: The progress-event types a pipeline run emits, and their
//!   mapping onto the wire event names consumed by the dashboard.
//! - **`types`**: Domain types — stage names, run options, and the transient
//!   per-run result aggregate.
//! - **`constants`**: Shared static constants such as directory names, stage
//!   timeouts, and defaulting values.

pub mod constants;
pub mod errors;
pub mod events;
pub mod types;

pub use self::{
    constants::*,
    errors::{Error, Result},
    events::{AnalysisEvent, StageEvent, StageStatus},
    types::{RunOptions, RunResults, StageFailure, StageName},
};
