//! Analysis result cache for cadforge
//!
//! This crate provides the content-addressed store for pipeline stage
//! outputs:
//! - Deterministic cache keys derived from a canonical serialization of each
//!   stage's semantically relevant config subset
//! - One JSON record per key on disk, written atomically
//! - A total-size budget enforced by background eviction, oldest write first
//! - Best-effort semantics throughout: I/O failures degrade to cache misses
//!   or no-ops, never pipeline failures

pub mod canonical;
pub mod entry;
pub mod keys;
pub mod store;

pub use canonical::{canonical_json, content_digest};
pub use entry::{CacheEntry, CacheStats, ClearOutcome};
pub use keys::{compute_key, compute_key_for, KeyOptions};
pub use store::ResultCache;
