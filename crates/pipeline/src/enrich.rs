//! Drawing enrichment collaborators.
//!
//! After a successful drawing generation, three independent optional passes
//! enrich the result: an in-place SVG post-process, a read of the SVG text
//! for inline preview, and a QA score. Each is presentation enrichment, not
//! a pipeline-defining output — the orchestrator lets every one of them fail
//! silently.

use async_trait::async_trait;
use cadforge_core::{Error, Result, ENRICH_TIMEOUT, SCRIPTS_DIR_NAME};
use regex::Regex;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Optional enrichment passes over a generated vector drawing
#[async_trait]
pub trait DrawingEnricher: Send + Sync {
    /// Geometry/style post-process of the SVG, in place.
    async fn postprocess(&self, svg_path: &str, stroke_profile: &str) -> Result<()>;

    /// Read the SVG text for inline preview.
    async fn read_svg(&self, svg_path: &str) -> Result<String>;

    /// Score the drawing's quality.
    async fn qa_score(&self, svg_path: &str, weights_preset: Option<&str>) -> Result<Value>;
}

/// Production enricher: shells out to the automation CLI tools.
pub struct SystemDrawingEnricher {
    root: PathBuf,
    interpreter: String,
}

impl SystemDrawingEnricher {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            interpreter: "python3".to_string(),
        }
    }

    #[must_use]
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    async fn run_tool(&self, script: &str, args: &[String]) -> Result<String> {
        let script_path = self.root.join(SCRIPTS_DIR_NAME).join(script);
        let output = tokio::time::timeout(
            ENRICH_TIMEOUT,
            Command::new(&self.interpreter)
                .arg(&script_path)
                .args(args)
                .current_dir(&self.root)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| Error::timeout(script, ENRICH_TIMEOUT))?
        .map_err(|e| Error::script(script, format!("failed to spawn: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output.status.code().unwrap_or(-1);
            return Err(Error::script_exited(
                script,
                format!("{} {}", stderr.trim(), stdout.trim()),
                code,
            ));
        }
        Ok(stdout)
    }
}

/// Repair report written next to the SVG by the post-process pass.
fn repair_report_path(svg: &Path) -> PathBuf {
    let stem = svg.file_stem().unwrap_or_default().to_string_lossy();
    svg.with_file_name(format!("{stem}_repair_report.json"))
}

#[async_trait]
impl DrawingEnricher for SystemDrawingEnricher {
    async fn postprocess(&self, svg_path: &str, stroke_profile: &str) -> Result<()> {
        let svg = self.resolve(svg_path);
        let report = repair_report_path(&svg);
        let args = vec![
            svg.to_string_lossy().into_owned(),
            "-o".to_string(),
            svg.to_string_lossy().into_owned(),
            "--report".to_string(),
            report.to_string_lossy().into_owned(),
            "--profile".to_string(),
            stroke_profile.to_string(),
        ];
        self.run_tool("postprocess_svg.py", &args).await?;
        Ok(())
    }

    async fn read_svg(&self, svg_path: &str) -> Result<String> {
        let svg = self.resolve(svg_path);
        tokio::fs::read_to_string(&svg)
            .await
            .map_err(|e| Error::file_system(svg, "read svg", e))
    }

    async fn qa_score(&self, svg_path: &str, weights_preset: Option<&str>) -> Result<Value> {
        let svg = self.resolve(svg_path);
        let mut args = vec![svg.to_string_lossy().into_owned()];
        if let Some(preset) = weights_preset {
            args.push("--weights-preset".to_string());
            args.push(preset.to_string());
        }

        let stdout = self.run_tool("qa_scorer.py", &args).await?;

        let score_re = Regex::new(r"(?i)QA Score:\s*(\d+)/100")
            .map_err(|e| Error::configuration(format!("qa score pattern: {e}")))?;
        let Some(captures) = score_re.captures(&stdout) else {
            return Err(Error::script(
                "qa_scorer.py",
                format!("output did not include score: {}", stdout.trim()),
            ));
        };
        let score: u64 = captures[1]
            .parse()
            .map_err(|e| Error::script("qa_scorer.py", format!("bad score: {e}")))?;

        let profile_re = Regex::new(r"(?i)weight_profile:\s*([a-z0-9_-]+)")
            .map_err(|e| Error::configuration(format!("qa profile pattern: {e}")))?;
        let weight_profile = profile_re
            .captures(&stdout)
            .map(|c| c[1].to_string());

        let file = svg
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut result = json!({ "score": score, "file": file });
        if let Some(profile) = weight_profile {
            result["weightProfile"] = Value::String(profile);
        }
        Ok(result)
    }
}

/// Test enricher with configurable outcomes.
#[cfg(test)]
#[derive(Default)]
pub struct ScriptedEnricher {
    pub svg_text: Option<String>,
    pub qa: Option<Value>,
}

#[cfg(test)]
#[async_trait]
impl DrawingEnricher for ScriptedEnricher {
    async fn postprocess(&self, _svg_path: &str, _stroke_profile: &str) -> Result<()> {
        Ok(())
    }

    async fn read_svg(&self, svg_path: &str) -> Result<String> {
        self.svg_text
            .clone()
            .ok_or_else(|| Error::script("read_svg", format!("no svg for {svg_path}")))
    }

    async fn qa_score(&self, _svg_path: &str, _weights_preset: Option<&str>) -> Result<Value> {
        self.qa
            .clone()
            .ok_or_else(|| Error::script("qa_scorer.py", "no qa configured"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repair_report_sits_next_to_the_svg() {
        let report = repair_report_path(Path::new("output/bracket_drawing.svg"));
        assert_eq!(
            report,
            Path::new("output/bracket_drawing_repair_report.json")
        );
    }
}
