//! Persisted cache record and introspection types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One persisted stage result, stored as a single JSON file per key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub result: Value,
    pub stage: String,
    /// Write time, epoch milliseconds
    pub timestamp: i64,
}

/// Cache introspection result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    #[serde(rename = "totalSizeBytes")]
    pub total_size_bytes: u64,
    #[serde(rename = "byStage")]
    pub by_stage: BTreeMap<String, usize>,
}

/// Outcome of a bulk delete.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ClearOutcome {
    pub deleted: usize,
}
