//! External stage executor seam.
//!
//! A stage executor is an opaque external tool: it takes a JSON input on
//! stdin and prints a JSON result on stdout. The trait abstraction allows
//! the orchestrator to be tested without spawning processes.

use async_trait::async_trait;
use cadforge_core::{Error, Result, SCRIPTS_DIR_NAME};
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Trait for invoking external analysis scripts
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Run a script with a JSON input, bounded by `timeout`.
    ///
    /// Fails on non-zero exit, timeout, or output that is not valid JSON.
    async fn run_script(&self, script: &str, input: &Value, timeout: Duration) -> Result<Value>;
}

/// Production executor: spawns the automation interpreter with the script,
/// feeds the input JSON on stdin, and parses the stdout JSON.
pub struct SystemScriptExecutor {
    root: PathBuf,
    interpreter: String,
}

impl SystemScriptExecutor {
    /// Create an executor for scripts under `{root}/scripts`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            interpreter: "python3".to_string(),
        }
    }

    /// Override the interpreter binary.
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }
}

/// Last `limit` characters of combined stderr/stdout, for error context.
fn output_tail(stderr: &str, stdout: &str, limit: usize) -> String {
    let tail = |s: &str| -> String {
        let chars: Vec<char> = s.chars().collect();
        let start = chars.len().saturating_sub(limit);
        chars[start..].iter().collect()
    };
    format!("{} {}", tail(stderr), tail(stdout)).trim().to_string()
}

/// Parse executor stdout: the whole output, or failing that its last
/// non-empty line (engine scripts may print progress noise before the
/// result).
fn parse_script_output(script: &str, stdout: &str) -> Result<Value> {
    let trimmed = stdout.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }
    if let Some(line) = trimmed.lines().rev().find(|l| !l.trim().is_empty()) {
        if let Ok(value) = serde_json::from_str(line.trim()) {
            return Ok(value);
        }
    }
    Err(Error::script(
        script,
        format!("output was not valid JSON: {}", output_tail("", stdout, 300)),
    ))
}

#[async_trait]
impl ScriptExecutor for SystemScriptExecutor {
    async fn run_script(&self, script: &str, input: &Value, timeout: Duration) -> Result<Value> {
        let script_path = self.root.join(SCRIPTS_DIR_NAME).join(script);
        tracing::debug!(script, timeout_secs = timeout.as_secs(), "running stage script");

        let mut child = Command::new(&self.interpreter)
            .arg(&script_path)
            .current_dir(&self.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::script(script, format!("failed to spawn: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload = serde_json::to_vec(input)?;
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| Error::script(script, format!("failed to write input: {e}")))?;
        }

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::timeout(script, timeout))?
            .map_err(|e| Error::script(script, format!("failed to collect output: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            return Err(Error::script_exited(
                script,
                output_tail(&stderr, &stdout, 300),
                code,
            ));
        }

        parse_script_output(script, &stdout)
    }
}

/// Test executor that replays queued responses per script.
///
/// Provides deterministic behavior for orchestrator tests and records every
/// invocation so tests can assert a cached stage never reached its executor.
#[cfg(test)]
pub struct ScriptedExecutor {
    responses: std::sync::Mutex<
        std::collections::HashMap<String, std::collections::VecDeque<ScriptedResponse>>,
    >,
    calls: std::sync::Mutex<Vec<(String, Value)>>,
}

#[cfg(test)]
#[derive(Clone)]
pub enum ScriptedResponse {
    Ok(Value),
    Err(String),
}

#[cfg(test)]
impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            responses: std::sync::Mutex::new(std::collections::HashMap::new()),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn respond(&self, script: &str, result: Value) {
        self.push(script, ScriptedResponse::Ok(result));
    }

    pub fn fail(&self, script: &str, error: &str) {
        self.push(script, ScriptedResponse::Err(error.to_string()));
    }

    fn push(&self, script: &str, response: ScriptedResponse) {
        self.responses
            .lock()
            .unwrap()
            .entry(script.to_string())
            .or_default()
            .push_back(response);
    }

    /// Scripts invoked so far, with their inputs, in order.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called_scripts(&self) -> Vec<String> {
        self.calls().into_iter().map(|(s, _)| s).collect()
    }
}

#[cfg(test)]
#[async_trait]
impl ScriptExecutor for ScriptedExecutor {
    async fn run_script(&self, script: &str, input: &Value, _timeout: Duration) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((script.to_string(), input.clone()));

        let response = self
            .responses
            .lock()
            .unwrap()
            .get_mut(script)
            .and_then(|queue| queue.pop_front());

        match response {
            Some(ScriptedResponse::Ok(value)) => Ok(value),
            Some(ScriptedResponse::Err(message)) => Err(Error::script(script, message)),
            None => Err(Error::script(script, "no scripted response configured")),
        }
    }
}
