//! Disk-backed result store with budgeted, best-effort eviction.
//!
//! Every operation here is non-throwing from the orchestrator's point of
//! view: lookups degrade to misses, stores and deletes degrade to no-ops,
//! and eviction runs in a background task whose errors are logged and
//! dropped. Concurrent runs may share one store; a same-key double write is
//! a benign race because both writers produce identical canonical content.

use cadforge_core::{Result, StageName, CACHE_DIR_NAME, DEFAULT_CACHE_BUDGET_BYTES};
use chrono::Utc;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::entry::{CacheEntry, CacheStats, ClearOutcome};

/// Content-addressed store of stage results, one JSON file per key.
///
/// The cache directory is an explicit constructor dependency so tests and
/// concurrent servers can run against isolated stores.
#[derive(Debug, Clone)]
pub struct ResultCache {
    cache_dir: PathBuf,
    budget_bytes: u64,
}

struct ScannedEntry {
    path: PathBuf,
    file_name: String,
    size: u64,
    modified: SystemTime,
}

impl ResultCache {
    /// Create a cache rooted at `{root}/.cache` with the default budget.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            cache_dir: root.as_ref().join(CACHE_DIR_NAME),
            budget_bytes: DEFAULT_CACHE_BUDGET_BYTES,
        }
    }

    /// Override the total-size budget in bytes.
    #[must_use]
    pub fn with_budget(mut self, budget_bytes: u64) -> Self {
        self.budget_bytes = budget_bytes;
        self
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{key}.json"))
    }

    async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| cadforge_core::Error::file_system(&self.cache_dir, "create cache dir", e))
    }

    /// Look up a key. Missing, unreadable, or unparseable records are all
    /// misses.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        if key.is_empty() {
            return None;
        }
        let path = self.entry_path(key);
        let raw = fs::read(&path).await.ok()?;
        match serde_json::from_slice(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!(key, "discarding unparseable cache record: {e}");
                None
            }
        }
    }

    /// Store a stage result under a key.
    ///
    /// The write is atomic (temp file + rename). A successful store triggers
    /// a background eviction pass; neither the write's nor the eviction's
    /// failure ever reaches the caller.
    pub async fn put(&self, key: &str, result: &Value, stage: StageName) {
        if key.is_empty() {
            return;
        }
        let entry = CacheEntry {
            result: result.clone(),
            stage: stage.as_str().to_string(),
            timestamp: Utc::now().timestamp_millis(),
        };
        match self.write_entry(key, &entry).await {
            Ok(()) => {
                let cache = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = cache.evict_if_needed().await {
                        tracing::warn!("cache eviction pass failed: {e}");
                    }
                });
            }
            Err(e) => tracing::warn!(key, "cache store failed: {e}"),
        }
    }

    async fn write_entry(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        self.ensure_dir().await?;
        let bytes = serde_json::to_vec(entry)?;

        let final_path = self.entry_path(key);
        let temp_path = self.cache_dir.join(format!(".{}.tmp", Uuid::new_v4()));

        let written = async {
            let mut file = fs::File::create(&temp_path)
                .await
                .map_err(|e| cadforge_core::Error::file_system(&temp_path, "create temp file", e))?;
            file.write_all(&bytes)
                .await
                .map_err(|e| cadforge_core::Error::file_system(&temp_path, "write temp file", e))?;
            file.sync_all()
                .await
                .map_err(|e| cadforge_core::Error::file_system(&temp_path, "sync temp file", e))?;
            Ok(())
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| cadforge_core::Error::file_system(&final_path, "rename temp file", e))?;
        Ok(())
    }

    /// Delete oldest-written entries until the store fits the budget.
    ///
    /// Individual delete failures are skipped; the pass continues with the
    /// next candidate.
    pub async fn evict_if_needed(&self) -> Result<()> {
        let mut entries = self.scan().await?;
        let mut total: u64 = entries.iter().map(|e| e.size).sum();
        if total <= self.budget_bytes {
            return Ok(());
        }

        entries.sort_by_key(|e| e.modified);
        let mut evicted = 0usize;
        for entry in entries {
            if total <= self.budget_bytes {
                break;
            }
            match fs::remove_file(&entry.path).await {
                Ok(()) => {
                    total = total.saturating_sub(entry.size);
                    evicted += 1;
                }
                Err(e) => {
                    tracing::warn!(file = %entry.file_name, "eviction skip: {e}");
                }
            }
        }

        if evicted > 0 {
            tracing::info!(evicted, total_bytes = total, "evicted cache entries");
        }
        Ok(())
    }

    /// Entry count, total bytes, and per-stage counts. An inaccessible
    /// store yields a zeroed result, never an error.
    pub async fn stats(&self) -> CacheStats {
        let entries = match self.scan().await {
            Ok(entries) => entries,
            Err(_) => return CacheStats::default(),
        };

        let mut stats = CacheStats {
            entries: entries.len(),
            ..Default::default()
        };
        for entry in &entries {
            stats.total_size_bytes += entry.size;
            let stage = entry
                .file_name
                .split('-')
                .next()
                .unwrap_or_default()
                .to_string();
            *stats.by_stage.entry(stage).or_insert(0) += 1;
        }
        stats
    }

    /// Delete all entries, or only those for one stage. An inaccessible
    /// store yields a zero count, never an error.
    pub async fn clear(&self, stage: Option<&str>) -> ClearOutcome {
        let entries = match self.scan().await {
            Ok(entries) => entries,
            Err(_) => return ClearOutcome::default(),
        };

        let prefix = stage.map(|s| format!("{s}-"));
        let mut deleted = 0usize;
        for entry in entries {
            if let Some(prefix) = &prefix {
                if !entry.file_name.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            if fs::remove_file(&entry.path).await.is_ok() {
                deleted += 1;
            }
        }
        ClearOutcome { deleted }
    }

    async fn scan(&self) -> Result<Vec<ScannedEntry>> {
        self.ensure_dir().await?;
        let mut dir = fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| cadforge_core::Error::file_system(&self.cache_dir, "read cache dir", e))?;

        let mut entries = Vec::new();
        loop {
            let item = match dir.next_entry().await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(_) => break,
            };
            let file_name = item.file_name().to_string_lossy().into_owned();
            if !file_name.ends_with(".json") {
                continue;
            }
            let Ok(meta) = item.metadata().await else {
                continue;
            };
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push(ScannedEntry {
                path: item.path(),
                file_name,
                size: meta.len(),
                modified,
            });
        }
        Ok(entries)
    }
}
