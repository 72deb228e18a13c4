//! Pipeline orchestration: the per-stage cache/execute/emit protocol.
//!
//! Stages run strictly sequentially within a run. Each applicable stage
//! emits `start`, then either `done` (with a cached flag) or `error`, and
//! the run always ends with exactly one `complete` event. A failed stage
//! does not abort the run, with one exception: `create` is fatal because
//! every downstream stage depends on model geometry existing.

use cadforge_cache::{compute_key, KeyOptions, ResultCache};
use cadforge_core::{
    AnalysisEvent, Error, Result, RunOptions, RunResults, StageEvent, StageName,
    DEFAULT_BATCH_SIZE, DEFAULT_DRAWING_STANDARD, DEFAULT_MATERIAL, DEFAULT_PROCESS,
    DEFAULT_STROKE_PROFILE, INSPECT_TIMEOUT, OUTPUT_DIR_NAME,
};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::enrich::DrawingEnricher;
use crate::executor::ScriptExecutor;
use crate::spec::{spec_for, INSPECT_SCRIPT};

/// Ordered event sink for one run.
///
/// A failed send means the subscriber dropped the receiving end (e.g. the
/// dashboard closed the stream); the pipeline then stops issuing further
/// stage invocations. An already-dispatched executor call may still finish
/// and populate the cache.
pub type EventSink = tokio::sync::mpsc::Sender<AnalysisEvent>;

/// Whether the run can proceed after a stage's events were emitted.
enum Flow {
    Continue,
    Stop,
}

/// The pipeline orchestrator. One instance serves many concurrent runs; all
/// per-run state lives in the [`RunResults`] owned by each `run` call.
pub struct AnalysisPipeline {
    root: PathBuf,
    cache: ResultCache,
    executor: Arc<dyn ScriptExecutor>,
    enricher: Arc<dyn DrawingEnricher>,
}

impl AnalysisPipeline {
    pub fn new(
        root: impl Into<PathBuf>,
        cache: ResultCache,
        executor: Arc<dyn ScriptExecutor>,
        enricher: Arc<dyn DrawingEnricher>,
    ) -> Self {
        Self {
            root: root.into(),
            cache,
            executor,
            enricher,
        }
    }

    /// Drive one analyze request to completion, emitting progress into
    /// `sink`.
    ///
    /// All failures surface as events; this method itself never fails.
    pub async fn run(
        &self,
        config: Value,
        options: RunOptions,
        shop_profile: Option<Value>,
        sink: EventSink,
    ) {
        let mut config = config;
        match config.as_object_mut() {
            Some(obj) => {
                let standard = options
                    .standard
                    .clone()
                    .unwrap_or_else(|| DEFAULT_DRAWING_STANDARD.to_string());
                obj.insert("standard".to_string(), Value::String(standard));
            }
            None => {
                let _ = sink
                    .send(AnalysisEvent::Error {
                        error: "config must be a table".to_string(),
                    })
                    .await;
                return;
            }
        }

        let has_shapes = non_empty_array(config.get("shapes"));
        let has_parts = non_empty_array(config.get("parts"));
        let has_assembly = truthy(config.get("assembly"));
        let can_create = has_shapes || has_parts;
        let step_source = config
            .pointer("/import/source_step")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from);
        let is_step_direct = !can_create && step_source.is_some();

        let mut results = RunResults::default();

        // create: fatal on failure
        if !emit(&sink, AnalysisEvent::Stage(StageEvent::start(StageName::Create))).await {
            return;
        }
        match self
            .run_create(&config, &options, &mut results, can_create, step_source.as_deref())
            .await
        {
            Ok(cached) => {
                results.stages.push(StageName::Create);
                let event = StageEvent::done(StageName::Create, cached)
                    .with_step_direct(is_step_direct);
                if !emit(&sink, AnalysisEvent::Stage(event)).await {
                    return;
                }
            }
            Err(e) => {
                let message = e.to_string();
                results.push_error(StageName::Create, message.clone());
                let _ = sink
                    .send(AnalysisEvent::Stage(StageEvent::error(
                        StageName::Create,
                        message,
                    )))
                    .await;
                let _ = sink.send(AnalysisEvent::Complete(results)).await;
                return;
            }
        }

        // drawing
        if options.stage_enabled(StageName::Drawing) {
            if !emit(&sink, AnalysisEvent::Stage(StageEvent::start(StageName::Drawing))).await {
                return;
            }
            let outcome = self
                .run_drawing(&config, &options, &mut results, is_step_direct)
                .await;
            if let Flow::Stop = finish_stage(&sink, &mut results, StageName::Drawing, outcome).await
            {
                return;
            }
        }

        // dfm
        if options.stage_enabled(StageName::Dfm) {
            if !emit(&sink, AnalysisEvent::Stage(StageEvent::start(StageName::Dfm))).await {
                return;
            }
            let outcome = self
                .run_dfm(&config, &options, shop_profile.as_ref(), &mut results)
                .await;
            if let Flow::Stop = finish_stage(&sink, &mut results, StageName::Dfm, outcome).await {
                return;
            }
        }

        // tolerance: requires an assembly with at least one part
        if options.stage_enabled(StageName::Tolerance) && has_assembly && has_parts {
            if !emit(&sink, AnalysisEvent::Stage(StageEvent::start(StageName::Tolerance))).await {
                return;
            }
            let outcome = self.run_tolerance(&config, &options, &mut results).await;
            if let Flow::Stop =
                finish_stage(&sink, &mut results, StageName::Tolerance, outcome).await
            {
                return;
            }
        }

        // cost
        if options.stage_enabled(StageName::Cost) {
            if !emit(&sink, AnalysisEvent::Stage(StageEvent::start(StageName::Cost))).await {
                return;
            }
            let outcome = self
                .run_cost(&config, &options, shop_profile.as_ref(), &mut results)
                .await;
            if let Flow::Stop = finish_stage(&sink, &mut results, StageName::Cost, outcome).await {
                return;
            }
        }

        let _ = sink.send(AnalysisEvent::Complete(results)).await;
    }

    /// Returns whether the result came from the cache.
    async fn run_create(
        &self,
        config: &Value,
        options: &RunOptions,
        results: &mut RunResults,
        can_create: bool,
        step_source: Option<&str>,
    ) -> Result<bool> {
        if !can_create {
            let Some(source) = step_source else {
                return Err(Error::configuration(
                    "Config has no shapes/parts. Define geometry before Analyze.",
                ));
            };

            // Direct import: inspect the supplied artifact instead of
            // constructing geometry. Never cached.
            let inspect = self
                .executor
                .run_script(INSPECT_SCRIPT, &json!({ "file": source }), INSPECT_TIMEOUT)
                .await?;
            let model = match inspect.get("model") {
                Some(model) => model.clone(),
                None => inspect,
            };
            let name = config
                .pointer("/import/name")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .unwrap_or_else(|| file_stem_of(source));

            // best-effort copy into the served output directory
            let output_dir = self.root.join(OUTPUT_DIR_NAME);
            if tokio::fs::create_dir_all(&output_dir).await.is_ok() {
                let dest = output_dir.join(format!("{name}.step"));
                if let Err(e) = tokio::fs::copy(source, &dest).await {
                    tracing::debug!("source step copy skipped: {e}");
                }
            }

            let mut model_obj = match model {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            model_obj.insert("name".to_string(), Value::String(name.clone()));

            results.model = Some(json!({
                "success": true,
                "model": model_obj,
                "exports": [{ "format": "step", "path": format!("output/{name}.step") }],
                "stepDirect": true,
            }));
            return Ok(false);
        }

        let key = compute_key(StageName::Create, config, &KeyOptions::from(options));
        if let Some(entry) = self.cache.get(&key).await {
            results.model = Some(entry.result);
            return Ok(true);
        }

        let spec = spec_for(StageName::Create);
        let result = self.executor.run_script(spec.script, config, spec.timeout).await?;
        results.model = Some(result.clone());
        self.cache.put(&key, &result, StageName::Create).await;
        Ok(false)
    }

    async fn run_drawing(
        &self,
        config: &Value,
        options: &RunOptions,
        results: &mut RunResults,
        is_step_direct: bool,
    ) -> Result<bool> {
        if is_step_direct {
            return Err(Error::configuration(
                "Drawing generation is not available for STEP template-only configs. \
                 Add [[shapes]] or [[parts]] before generating drawing.",
            ));
        }

        let key = compute_key(StageName::Drawing, config, &KeyOptions::from(options));
        if let Some(entry) = self.cache.get(&key).await {
            let data = entry.result;
            results.drawing = Some(data.get("drawing").cloned().unwrap_or_else(|| data.clone()));
            if let Some(svg) = data.get("drawingSvg").and_then(Value::as_str) {
                results.drawing_svg = Some(svg.to_string());
            }
            if let Some(qa) = data.get("qa") {
                results.qa = Some(qa.clone());
            }
            return Ok(true);
        }

        let mut draw_config = config.clone();
        ensure_object(&mut draw_config, "drawing");
        if options.dxf_export == Some(true) {
            draw_config["drawing"]["dxf"] = Value::Bool(true);
        }

        let spec = spec_for(StageName::Drawing);
        let draw_result = self
            .executor
            .run_script(spec.script, &draw_config, spec.timeout)
            .await?;
        results.drawing = Some(draw_result.clone());

        if let Some(svg_path) = svg_path_of(&draw_result) {
            let stroke_profile = draw_config
                .pointer("/drawing_plan/style/stroke_profile")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_STROKE_PROFILE)
                .to_string();

            if let Err(e) = self.enricher.postprocess(&svg_path, &stroke_profile).await {
                tracing::debug!("svg post-process skipped: {e}");
            }
            match self.enricher.read_svg(&svg_path).await {
                Ok(text) => results.drawing_svg = Some(text),
                Err(e) => tracing::debug!("svg preview skipped: {e}"),
            }
            match self
                .enricher
                .qa_score(&svg_path, options.weights_preset.as_deref())
                .await
            {
                Ok(qa) => results.qa = Some(qa),
                Err(e) => tracing::debug!("qa scoring skipped: {e}"),
            }
        }

        // composite payload so a later cache hit reproduces the enrichments
        let mut composite = Map::new();
        composite.insert("drawing".to_string(), draw_result);
        if let Some(svg) = &results.drawing_svg {
            composite.insert("drawingSvg".to_string(), Value::String(svg.clone()));
        }
        if let Some(qa) = &results.qa {
            composite.insert("qa".to_string(), qa.clone());
        }
        self.cache
            .put(&key, &Value::Object(composite), StageName::Drawing)
            .await;
        Ok(false)
    }

    async fn run_dfm(
        &self,
        config: &Value,
        options: &RunOptions,
        shop_profile: Option<&Value>,
        results: &mut RunResults,
    ) -> Result<bool> {
        let key_options =
            KeyOptions::from(options).with_shop_profile(shop_profile.cloned());
        let key = compute_key(StageName::Dfm, config, &key_options);
        if let Some(entry) = self.cache.get(&key).await {
            results.dfm = Some(entry.result);
            return Ok(true);
        }

        let mut dfm_config = config.clone();
        ensure_object(&mut dfm_config, "manufacturing");
        if let Some(process) = &options.process {
            dfm_config["manufacturing"]["process"] = Value::String(process.clone());
        }
        if let Some(material) = &options.material {
            dfm_config["manufacturing"]["material"] = Value::String(material.clone());
        }
        if !truthy(dfm_config["manufacturing"].get("process")) {
            dfm_config["manufacturing"]["process"] = Value::String(DEFAULT_PROCESS.to_string());
        }
        if let Some(profile) = shop_profile {
            dfm_config["shop_profile"] = profile.clone();
        }

        let spec = spec_for(StageName::Dfm);
        let dfm_result = self
            .executor
            .run_script(spec.script, &dfm_config, spec.timeout)
            .await?;
        results.dfm = Some(dfm_result.clone());
        self.cache.put(&key, &dfm_result, StageName::Dfm).await;
        Ok(false)
    }

    async fn run_tolerance(
        &self,
        config: &Value,
        options: &RunOptions,
        results: &mut RunResults,
    ) -> Result<bool> {
        let key = compute_key(StageName::Tolerance, config, &KeyOptions::from(options));
        if let Some(entry) = self.cache.get(&key).await {
            results.tolerance = Some(entry.result);
            return Ok(true);
        }

        let mut tol_config = config.clone();
        ensure_object(&mut tol_config, "tolerance");
        if let Some(monte_carlo) = options.monte_carlo {
            tol_config["tolerance"]["monte_carlo"] = Value::Bool(monte_carlo);
        }
        if let Some(samples) = options.mc_sample_count() {
            tol_config["tolerance"]["mc_samples"] = Value::from(samples);
        }

        let spec = spec_for(StageName::Tolerance);
        let tol_result = self
            .executor
            .run_script(spec.script, &tol_config, spec.timeout)
            .await?;
        results.tolerance = Some(tol_result.clone());
        self.cache.put(&key, &tol_result, StageName::Tolerance).await;
        Ok(false)
    }

    async fn run_cost(
        &self,
        config: &Value,
        options: &RunOptions,
        shop_profile: Option<&Value>,
        results: &mut RunResults,
    ) -> Result<bool> {
        let key_options = KeyOptions::from(options)
            .with_shop_profile(shop_profile.cloned())
            .with_dfm_score(results.dfm_score());
        let key = compute_key(StageName::Cost, config, &key_options);
        if let Some(entry) = self.cache.get(&key).await {
            results.cost = Some(entry.result);
            return Ok(true);
        }

        let material = options
            .material
            .clone()
            .or_else(|| string_field(config, "/manufacturing/material"))
            .unwrap_or_else(|| DEFAULT_MATERIAL.to_string());
        let process = options
            .process
            .clone()
            .or_else(|| string_field(config, "/manufacturing/process"))
            .unwrap_or_else(|| DEFAULT_PROCESS.to_string());

        let mut cost_input = config.clone();
        cost_input["dfm_result"] = results.dfm.clone().unwrap_or(Value::Null);
        cost_input["material"] = Value::String(material);
        cost_input["process"] = Value::String(process);
        cost_input["batch_size"] = Value::from(options.batch.unwrap_or(DEFAULT_BATCH_SIZE));
        if let Some(profile) = shop_profile {
            cost_input["shop_profile"] = profile.clone();
        }

        let spec = spec_for(StageName::Cost);
        let cost_result = self
            .executor
            .run_script(spec.script, &cost_input, spec.timeout)
            .await?;
        results.cost = Some(cost_result.clone());
        self.cache.put(&key, &cost_result, StageName::Cost).await;
        Ok(false)
    }
}

async fn emit(sink: &EventSink, event: AnalysisEvent) -> bool {
    if sink.send(event).await.is_err() {
        tracing::debug!("event subscriber gone; stopping run");
        return false;
    }
    true
}

/// Record a stage's outcome and emit its terminal event.
async fn finish_stage(
    sink: &EventSink,
    results: &mut RunResults,
    stage: StageName,
    outcome: Result<bool>,
) -> Flow {
    let event = match outcome {
        Ok(cached) => {
            results.stages.push(stage);
            StageEvent::done(stage, cached)
        }
        Err(e) => {
            let message = e.to_string();
            results.push_error(stage, message.clone());
            StageEvent::error(stage, message)
        }
    };
    if emit(sink, AnalysisEvent::Stage(event)).await {
        Flow::Continue
    } else {
        Flow::Stop
    }
}

fn non_empty_array(value: Option<&Value>) -> bool {
    value.and_then(Value::as_array).is_some_and(|a| !a.is_empty())
}

/// JS-truthiness for config fields, which the original wire contract leans
/// on for presence checks.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(true, |f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Ensure `config[field]` exists and is an object.
fn ensure_object(config: &mut Value, field: &str) {
    let needs_reset = !config
        .get(field)
        .map(Value::is_object)
        .unwrap_or(false);
    if needs_reset {
        config[field] = Value::Object(Map::new());
    }
}

fn string_field(config: &Value, pointer: &str) -> Option<String> {
    config
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn file_stem_of(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string())
}

fn svg_path_of(result: &Value) -> Option<String> {
    let direct = result
        .get("svg_path")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| {
            result
                .get("drawing_path")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        });
    if let Some(path) = direct {
        return Some(path.to_string());
    }

    result
        .get("drawing_paths")?
        .as_array()?
        .iter()
        .find(|p| p.get("format").and_then(Value::as_str) == Some("svg"))?
        .get("path")
        .and_then(Value::as_str)
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::ScriptedEnricher;
    use crate::executor::ScriptedExecutor;
    use cadforge_core::StageStatus;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn base_config() -> Value {
        json!({
            "shapes": [{"type": "box", "size": [10, 20, 5]}],
            "operations": [{"op": "fillet", "radius": 1.0}]
        })
    }

    fn respond_all(executor: &ScriptedExecutor) {
        executor.respond("create_model.py", json!({"success": true, "model": {"name": "part"}}));
        executor.respond(
            "generate_drawing.py",
            json!({"drawing_paths": [{"format": "svg", "path": "output/part.svg"}]}),
        );
        executor.respond("dfm_checker.py", json!({"score": 80, "issues": []}));
        executor.respond("cost_estimator.py", json!({"total": 42.5}));
    }

    fn pipeline_in(
        dir: &TempDir,
        executor: Arc<ScriptedExecutor>,
        enricher: ScriptedEnricher,
    ) -> AnalysisPipeline {
        AnalysisPipeline::new(
            dir.path(),
            ResultCache::new(dir.path()),
            executor,
            Arc::new(enricher),
        )
    }

    async fn collect_run(
        pipeline: &AnalysisPipeline,
        config: Value,
        options: RunOptions,
        shop_profile: Option<Value>,
    ) -> Vec<AnalysisEvent> {
        let (tx, mut rx) = mpsc::channel(64);
        pipeline.run(config, options, shop_profile, tx).await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn stage_events(events: &[AnalysisEvent]) -> Vec<(StageName, StageStatus)> {
        events
            .iter()
            .filter_map(|e| match e {
                AnalysisEvent::Stage(s) => Some((s.stage, s.status)),
                _ => None,
            })
            .collect()
    }

    fn complete_of(events: &[AnalysisEvent]) -> &RunResults {
        match events.last() {
            Some(AnalysisEvent::Complete(results)) => results,
            other => panic!("run did not end with complete: {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_run_emits_strictly_ordered_events() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(ScriptedExecutor::new());
        respond_all(&executor);
        let pipeline = pipeline_in(&dir, executor.clone(), ScriptedEnricher::default());

        let events = collect_run(&pipeline, base_config(), RunOptions::default(), None).await;

        assert_eq!(
            stage_events(&events),
            vec![
                (StageName::Create, StageStatus::Start),
                (StageName::Create, StageStatus::Done),
                (StageName::Drawing, StageStatus::Start),
                (StageName::Drawing, StageStatus::Done),
                (StageName::Dfm, StageStatus::Start),
                (StageName::Dfm, StageStatus::Done),
                (StageName::Cost, StageStatus::Start),
                (StageName::Cost, StageStatus::Done),
            ]
        );

        let results = complete_of(&events);
        assert_eq!(
            results.stages,
            vec![StageName::Create, StageName::Drawing, StageName::Dfm, StageName::Cost]
        );
        assert!(results.errors.is_empty());
        assert_eq!(results.cost, Some(json!({"total": 42.5})));
        assert_eq!(
            executor.called_scripts(),
            vec![
                "create_model.py",
                "generate_drawing.py",
                "dfm_checker.py",
                "cost_estimator.py"
            ]
        );
    }

    #[tokio::test]
    async fn drawing_failure_does_not_stop_the_run() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond("create_model.py", json!({"success": true}));
        executor.fail("generate_drawing.py", "TechDraw crashed");
        executor.respond("dfm_checker.py", json!({"score": 55}));
        executor.respond("cost_estimator.py", json!({"total": 10}));
        let pipeline = pipeline_in(&dir, executor, ScriptedEnricher::default());

        let events = collect_run(&pipeline, base_config(), RunOptions::default(), None).await;
        let results = complete_of(&events);

        assert_eq!(results.errors.len(), 1);
        assert_eq!(results.errors[0].stage, StageName::Drawing);
        assert!(results.errors[0].error.contains("TechDraw crashed"));
        assert!(!results.stages.contains(&StageName::Drawing));
        assert!(results.stages.contains(&StageName::Dfm));
        assert!(results.stages.contains(&StageName::Cost));
    }

    #[tokio::test]
    async fn create_failure_short_circuits_the_run() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(ScriptedExecutor::new());
        executor.fail("create_model.py", "geometry kernel fault");
        let pipeline = pipeline_in(&dir, executor.clone(), ScriptedEnricher::default());

        let events = collect_run(&pipeline, base_config(), RunOptions::default(), None).await;

        assert_eq!(
            stage_events(&events),
            vec![
                (StageName::Create, StageStatus::Start),
                (StageName::Create, StageStatus::Error),
            ]
        );
        let results = complete_of(&events);
        assert_eq!(results.stages, Vec::<StageName>::new());
        assert_eq!(results.errors[0].stage, StageName::Create);
        assert_eq!(executor.called_scripts(), vec!["create_model.py"]);
    }

    #[tokio::test]
    async fn empty_config_is_a_fatal_create_error() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(ScriptedExecutor::new());
        let pipeline = pipeline_in(&dir, executor.clone(), ScriptedEnricher::default());

        let events = collect_run(&pipeline, json!({}), RunOptions::default(), None).await;

        let results = complete_of(&events);
        assert_eq!(results.errors[0].stage, StageName::Create);
        assert!(results.errors[0].error.contains("no shapes/parts"));
        assert!(executor.called_scripts().is_empty());
    }

    #[tokio::test]
    async fn cached_stages_skip_their_executors() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(ScriptedExecutor::new());
        respond_all(&executor);
        let pipeline = pipeline_in(&dir, executor, ScriptedEnricher::default());
        collect_run(&pipeline, base_config(), RunOptions::default(), None).await;

        // second run against the same store, executor has no responses left
        let fresh = Arc::new(ScriptedExecutor::new());
        let pipeline = pipeline_in(&dir, fresh.clone(), ScriptedEnricher::default());
        let events = collect_run(&pipeline, base_config(), RunOptions::default(), None).await;

        assert!(fresh.called_scripts().is_empty());
        for event in &events {
            if let AnalysisEvent::Stage(stage) = event {
                if stage.status == StageStatus::Done {
                    assert_eq!(stage.cached, Some(true), "stage {} not cached", stage.stage);
                }
            }
        }
        let results = complete_of(&events);
        assert_eq!(results.cost, Some(json!({"total": 42.5})));
        assert!(results.errors.is_empty());
    }

    #[tokio::test]
    async fn tolerance_needs_an_assembly_with_parts() {
        let dir = TempDir::new().unwrap();

        // no assembly: silent skip, not an error
        let executor = Arc::new(ScriptedExecutor::new());
        respond_all(&executor);
        let pipeline = pipeline_in(&dir, executor, ScriptedEnricher::default());
        let events = collect_run(&pipeline, base_config(), RunOptions::default(), None).await;
        assert!(!stage_events(&events)
            .iter()
            .any(|(stage, _)| *stage == StageName::Tolerance));
        assert!(complete_of(&events).errors.is_empty());

        // assembly with parts: the stage runs
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(ScriptedExecutor::new());
        respond_all(&executor);
        executor.respond("tolerance_analysis.py", json!({"cpk": 1.31}));
        let pipeline = pipeline_in(&dir, executor, ScriptedEnricher::default());
        let config = json!({
            "parts": [{"name": "base"}],
            "assembly": {"name": "asm", "mates": []},
            "shapes": [{"type": "box"}]
        });
        let events = collect_run(&pipeline, config, RunOptions::default(), None).await;
        let results = complete_of(&events);
        assert!(results.stages.contains(&StageName::Tolerance));
        assert_eq!(results.tolerance, Some(json!({"cpk": 1.31})));
    }

    #[tokio::test]
    async fn option_toggles_skip_stages_silently() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond("create_model.py", json!({"success": true}));
        let pipeline = pipeline_in(&dir, executor.clone(), ScriptedEnricher::default());

        let options = RunOptions {
            drawing: Some(false),
            dfm: Some(false),
            tolerance: Some(false),
            cost: Some(false),
            ..Default::default()
        };
        let events = collect_run(&pipeline, base_config(), options, None).await;

        assert_eq!(
            stage_events(&events),
            vec![
                (StageName::Create, StageStatus::Start),
                (StageName::Create, StageStatus::Done),
            ]
        );
        assert_eq!(executor.called_scripts(), vec!["create_model.py"]);
        assert!(complete_of(&events).errors.is_empty());
    }

    #[tokio::test]
    async fn changed_dfm_output_invalidates_the_cached_cost() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(ScriptedExecutor::new());
        respond_all(&executor);
        let pipeline = pipeline_in(&dir, executor, ScriptedEnricher::default());
        collect_run(&pipeline, base_config(), RunOptions::default(), None).await;

        // a manufacturing change misses the dfm key but not create/drawing
        let mut config = base_config();
        config["manufacturing"] = json!({"tooling": "5-axis"});
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond("dfm_checker.py", json!({"score": 40, "issues": ["deep pocket"]}));
        executor.respond("cost_estimator.py", json!({"total": 99.0}));
        let pipeline = pipeline_in(&dir, executor.clone(), ScriptedEnricher::default());
        let events = collect_run(&pipeline, config, RunOptions::default(), None).await;

        assert_eq!(
            executor.called_scripts(),
            vec!["dfm_checker.py", "cost_estimator.py"],
            "a changed dfm score must re-run cost even though cost inputs look unchanged"
        );
        let results = complete_of(&events);
        assert_eq!(results.cost, Some(json!({"total": 99.0})));
    }

    #[tokio::test]
    async fn direct_import_inspects_instead_of_constructing() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond("inspect_model.py", json!({"model": {"faces": 12}}));
        executor.respond("dfm_checker.py", json!({"score": 70}));
        executor.respond("cost_estimator.py", json!({"total": 5}));
        let pipeline = pipeline_in(&dir, executor.clone(), ScriptedEnricher::default());

        let config = json!({"import": {"source_step": "models/bracket.step", "name": "bracket"}});
        let events = collect_run(&pipeline, config, RunOptions::default(), None).await;

        let results = complete_of(&events);
        let model = results.model.as_ref().unwrap();
        assert_eq!(model["stepDirect"], true);
        assert_eq!(model["model"]["name"], "bracket");
        assert_eq!(model["exports"][0]["path"], "output/bracket.step");

        // drawing is an error (not a skip) for direct imports
        assert_eq!(results.errors.len(), 1);
        assert_eq!(results.errors[0].stage, StageName::Drawing);
        assert!(results.stages.contains(&StageName::Dfm));
        assert!(results.stages.contains(&StageName::Cost));

        // the create done event flags the direct import
        let create_done = events.iter().find_map(|e| match e {
            AnalysisEvent::Stage(s)
                if s.stage == StageName::Create && s.status == StageStatus::Done =>
            {
                Some(s.clone())
            }
            _ => None,
        });
        assert_eq!(create_done.unwrap().step_direct, Some(true));
        assert_eq!(executor.called_scripts()[0], "inspect_model.py");
    }

    #[tokio::test]
    async fn dropped_subscriber_stops_the_run_promptly() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(ScriptedExecutor::new());
        respond_all(&executor);
        let pipeline = pipeline_in(&dir, executor.clone(), ScriptedEnricher::default());

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        pipeline.run(base_config(), RunOptions::default(), None, tx).await;

        assert!(executor.called_scripts().is_empty());
    }

    #[tokio::test]
    async fn drawing_enrichments_are_reproduced_from_cache() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(ScriptedExecutor::new());
        respond_all(&executor);
        let enricher = ScriptedEnricher {
            svg_text: Some("<svg/>".to_string()),
            qa: Some(json!({"score": 91, "file": "part.svg"})),
        };
        let pipeline = pipeline_in(&dir, executor, enricher);
        let events = collect_run(&pipeline, base_config(), RunOptions::default(), None).await;
        let results = complete_of(&events);
        assert_eq!(results.drawing_svg.as_deref(), Some("<svg/>"));
        assert_eq!(results.qa, Some(json!({"score": 91, "file": "part.svg"})));

        // cache hit must reproduce the enrichments without the enricher
        let executor = Arc::new(ScriptedExecutor::new());
        let pipeline = pipeline_in(&dir, executor, ScriptedEnricher::default());
        let events = collect_run(&pipeline, base_config(), RunOptions::default(), None).await;
        let results = complete_of(&events);
        assert_eq!(results.drawing_svg.as_deref(), Some("<svg/>"));
        assert_eq!(results.qa, Some(json!({"score": 91, "file": "part.svg"})));
    }

    #[tokio::test]
    async fn enrichment_failures_never_fail_the_stage() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(ScriptedExecutor::new());
        respond_all(&executor);
        // default enricher fails every pass
        let pipeline = pipeline_in(&dir, executor, ScriptedEnricher::default());

        let events = collect_run(&pipeline, base_config(), RunOptions::default(), None).await;
        let results = complete_of(&events);
        assert!(results.stages.contains(&StageName::Drawing));
        assert!(results.errors.is_empty());
        assert!(results.drawing_svg.is_none());
        assert!(results.qa.is_none());
    }

    #[tokio::test]
    async fn stage_inputs_apply_documented_defaults() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(ScriptedExecutor::new());
        respond_all(&executor);
        let pipeline = pipeline_in(&dir, executor.clone(), ScriptedEnricher::default());
        let profile = json!({"name": "main-shop", "machine_rate": 85.0});
        collect_run(
            &pipeline,
            base_config(),
            RunOptions::default(),
            Some(profile.clone()),
        )
        .await;

        let calls = executor.calls();
        let dfm_input = &calls
            .iter()
            .find(|(s, _)| s == "dfm_checker.py")
            .unwrap()
            .1;
        assert_eq!(dfm_input["manufacturing"]["process"], "machining");
        assert_eq!(dfm_input["shop_profile"], profile);

        let cost_input = &calls
            .iter()
            .find(|(s, _)| s == "cost_estimator.py")
            .unwrap()
            .1;
        assert_eq!(cost_input["material"], "SS304");
        assert_eq!(cost_input["process"], "machining");
        assert_eq!(cost_input["batch_size"], 1);
        assert_eq!(cost_input["dfm_result"]["score"], 80);
        assert_eq!(cost_input["shop_profile"], profile);
        assert_eq!(cost_input["standard"], "KS");
    }

    #[tokio::test]
    async fn non_table_config_emits_a_run_error() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(ScriptedExecutor::new());
        let pipeline = pipeline_in(&dir, executor.clone(), ScriptedEnricher::default());

        let events = collect_run(&pipeline, json!([1, 2, 3]), RunOptions::default(), None).await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            AnalysisEvent::Error { error } => assert!(error.contains("config must be a table")),
            other => panic!("expected run error, got {other:?}"),
        }
        assert!(executor.called_scripts().is_empty());
    }
}
