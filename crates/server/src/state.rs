//! Shared application state.

use cadforge_cache::ResultCache;
use cadforge_pipeline::{
    AnalysisPipeline, ScriptExecutor, SystemDrawingEnricher, SystemScriptExecutor,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// State handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    /// Automation root holding `scripts/`, `configs/`, and `output/`
    pub root: PathBuf,
    pub cache: ResultCache,
    pub pipeline: Arc<AnalysisPipeline>,
    pub executor: Arc<dyn ScriptExecutor>,
}

impl AppState {
    /// Wire up the cache, executor, and pipeline for an automation root.
    #[must_use]
    pub fn new(root: impl AsRef<Path>, cache_budget: Option<u64>) -> Self {
        let root = root.as_ref().to_path_buf();

        let mut cache = ResultCache::new(&root);
        if let Some(budget) = cache_budget {
            cache = cache.with_budget(budget);
        }

        let executor: Arc<dyn ScriptExecutor> = Arc::new(SystemScriptExecutor::new(&root));
        let enricher = Arc::new(SystemDrawingEnricher::new(&root));
        let pipeline = Arc::new(AnalysisPipeline::new(
            &root,
            cache.clone(),
            executor.clone(),
            enricher,
        ));

        Self {
            root,
            cache,
            pipeline,
            executor,
        }
    }
}
