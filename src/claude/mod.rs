//! `AgentExecutor`: launches the Agent binary and decodes its NDJSON
//! stream.
//!
//! A line-by-line, tolerant-of-garbage decode loop dispatching on each
//! line's `"type"` tag (`system`/`assistant`/`user`/`result`).

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::WorkflowError;
use crate::session;
use crate::state::ProgressEvent;
use crate::subprocess::{ExitStatus, ProcessCommand, ProcessError, ProcessRunner};

#[derive(Debug, Clone, Default)]
pub struct ExecuteRequest {
    pub prompt: String,
    pub working_directory: PathBuf,
    pub env: HashMap<String, String>,
    pub timeout: Duration,
    pub json_schema: Option<String>,
    pub resume_session_id: Option<String>,
    pub extra_args: Vec<String>,
    /// Cancelled to kill the in-flight Agent subprocess (`ProcessCommand`'s
    /// `kill_on_drop` does the actual killing once this future is dropped).
    pub cancellation: CancellationToken,
}

#[derive(Debug, Clone)]
pub struct ExecuteResult {
    pub output: String,
    pub session_id: Option<String>,
    pub exit_code: i32,
    pub duration: Duration,
    pub error: Option<String>,
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn execute_streaming(
        &self,
        request: ExecuteRequest,
        on_progress: ProgressCallback,
    ) -> Result<ExecuteResult, WorkflowError>;
}

pub struct AgentExecutorImpl {
    runner: Arc<dyn ProcessRunner>,
    claude_path: String,
    dangerously_skip_permissions: bool,
}

impl AgentExecutorImpl {
    pub fn new(runner: Arc<dyn ProcessRunner>, claude_path: String, dangerously_skip_permissions: bool) -> Self {
        Self {
            runner,
            claude_path,
            dangerously_skip_permissions,
        }
    }

    fn build_command(&self, request: &ExecuteRequest) -> ProcessCommand {
        let mut args = vec!["--print".to_string(), "--output-format".to_string(), "stream-json".to_string()];

        if let Some(session_id) = &request.resume_session_id {
            args.push("--resume".to_string());
            args.push(session_id.clone());
        }
        if let Some(schema) = &request.json_schema {
            args.push("--json-schema".to_string());
            args.push(schema.clone());
        }
        if self.dangerously_skip_permissions {
            args.push("--dangerously-skip-permissions".to_string());
        }
        args.extend(request.extra_args.iter().cloned());

        ProcessCommand {
            program: self.claude_path.clone(),
            args,
            env: request.env.clone(),
            working_dir: Some(request.working_directory.clone()),
            timeout: Some(request.timeout),
            stdin: Some(request.prompt.clone()),
        }
    }
}

#[async_trait]
impl AgentExecutor for AgentExecutorImpl {
    async fn execute_streaming(
        &self,
        request: ExecuteRequest,
        on_progress: ProgressCallback,
    ) -> Result<ExecuteResult, WorkflowError> {
        let command = self.build_command(&request);
        let started = Instant::now();

        let output = tokio::select! {
            result = self.runner.run(command) => result,
            () = request.cancellation.cancelled() => {
                return Err(crate::error::helpers::workflow_cancelled("agent execution"));
            }
        };

        let output = match output {
            Ok(output) => output,
            Err(ProcessError::CommandNotFound(cmd)) => {
                return Err(crate::error::helpers::exec_command_not_found(cmd));
            }
            Err(ProcessError::Timeout(_)) => {
                return Err(crate::error::helpers::exec_timeout(self.claude_path.clone()));
            }
            Err(other) => return Err(WorkflowError::from(other)),
        };

        let mut last_result: Option<String> = None;
        for line in output.stdout.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Ok(value) = serde_json::from_str::<Value>(line) else {
                tracing::debug!(%line, "non-JSON line from agent stream, skipping");
                continue;
            };
            if let Some(event) = dispatch_event(&value) {
                on_progress(event);
            }
            if value.get("type").and_then(Value::as_str) == Some("result") {
                if let Some(result) = value.get("result").and_then(Value::as_str) {
                    last_result = Some(result.to_string());
                }
            }
        }

        let duration = started.elapsed();
        let exit_code = output.status.code().unwrap_or(-1);
        let session_id = session::parse_session_id(&output.stdout);
        let session_id = (!session_id.is_empty()).then_some(session_id);

        if !output.status.success() {
            return Ok(ExecuteResult {
                output: last_result.unwrap_or_else(|| output.stdout.clone()),
                session_id,
                exit_code,
                duration,
                error: Some(format!("agent exited with non-zero status: {}", output.stderr)),
            });
        }

        Ok(ExecuteResult {
            output: last_result.unwrap_or(output.stdout),
            session_id,
            exit_code,
            duration,
            error: None,
        })
    }
}

/// Maps one decoded stream line to a `ProgressEvent`, or `None` if the line
/// carries no user-facing progress (e.g. a bare `system` heartbeat).
fn dispatch_event(value: &Value) -> Option<ProgressEvent> {
    match value.get("type").and_then(Value::as_str)? {
        "assistant" => dispatch_assistant(value),
        "user" => dispatch_tool_result(value),
        _ => None,
    }
}

fn dispatch_assistant(value: &Value) -> Option<ProgressEvent> {
    let content = value.get("message")?.get("content")?.as_array()?;
    for block in content {
        match block.get("type").and_then(Value::as_str) {
            Some("tool_use") => {
                let tool_name = block.get("name").and_then(Value::as_str).unwrap_or("unknown").to_string();
                let tool_input = summarize_tool_input(&tool_name, block.get("input"));
                return Some(ProgressEvent::ToolUse { tool_name, tool_input });
            }
            Some("text") => {
                let text = block.get("text").and_then(Value::as_str).unwrap_or_default().to_string();
                return Some(ProgressEvent::Text { text });
            }
            Some("thinking") => {
                let text = block.get("thinking").and_then(Value::as_str).unwrap_or_default().to_string();
                return Some(ProgressEvent::Thinking { text });
            }
            _ => continue,
        }
    }
    None
}

fn dispatch_tool_result(value: &Value) -> Option<ProgressEvent> {
    let content = value.get("message")?.get("content")?.as_array()?;
    for block in content {
        if block.get("type").and_then(Value::as_str) == Some("tool_result") {
            let is_error = block.get("is_error").and_then(Value::as_bool).unwrap_or(false);
            let text = match block.get("content") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            return Some(ProgressEvent::ToolResult { text: truncate(&text, 200), is_error });
        }
    }
    None
}

/// Truncated summary by tool kind (`file_path` for Read/Edit/Write,
/// `pattern` for Glob/Grep, `command` for Bash, `description` for Task).
fn summarize_tool_input(tool_name: &str, input: Option<&Value>) -> String {
    let Some(input) = input else {
        return String::new();
    };
    let field = match tool_name {
        "Read" | "Edit" | "Write" => "file_path",
        "Glob" | "Grep" => "pattern",
        "Bash" => "command",
        "Task" => "description",
        _ => return truncate(&input.to_string(), 120),
    };
    input
        .get(field)
        .and_then(Value::as_str)
        .map(|s| truncate(s, 120))
        .unwrap_or_default()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{truncated}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subprocess::mock::MockProcessRunner;
    use std::sync::Mutex;

    fn events_callback() -> (ProgressCallback, Arc<Mutex<Vec<ProgressEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let captured = events.clone();
        let cb: ProgressCallback = Arc::new(move |e| captured.lock().unwrap().push(e));
        (cb, events)
    }

    #[tokio::test]
    async fn extracts_last_result_chunk_and_tool_events() {
        let stdout = [
            r#"{"type":"system","subtype":"init","session_id":"sess-1"}"#,
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Read","input":{"file_path":"src/lib.rs"}}]}}"#,
            "not json at all",
            r#"{"type":"result","session_id":"sess-1","result":"done"}"#,
        ]
        .join("\n");

        let runner = Arc::new(MockProcessRunner::default());
        runner.push_success(stdout);

        let executor = AgentExecutorImpl::new(runner, "claude".to_string(), false);
        let (cb, events) = events_callback();
        let result = executor
            .execute_streaming(
                ExecuteRequest {
                    prompt: "do the thing".to_string(),
                    working_directory: PathBuf::from("/repo"),
                    timeout: Duration::from_secs(60),
                    ..Default::default()
                },
                cb,
            )
            .await
            .unwrap();

        assert_eq!(result.output, "done");
        assert_eq!(result.session_id.as_deref(), Some("sess-1"));
        assert!(result.error.is_none());
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        matches!(&events[0], ProgressEvent::ToolUse { tool_name, tool_input } if tool_name == "Read" && tool_input == "src/lib.rs");
    }

    #[tokio::test]
    async fn nonzero_exit_surfaces_error_but_keeps_partial_output() {
        let runner = Arc::new(MockProcessRunner::default());
        runner.push_failure_with_stdout(1, r#"{"type":"result","result":"partial"}"#, "boom");
        let executor = AgentExecutorImpl::new(runner, "claude".to_string(), false);
        let (cb, _events) = events_callback();
        let result = executor
            .execute_streaming(
                ExecuteRequest {
                    working_directory: PathBuf::from("/repo"),
                    timeout: Duration::from_secs(60),
                    ..Default::default()
                },
                cb,
            )
            .await
            .unwrap();
        assert_eq!(result.output, "partial");
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn command_not_found_is_a_distinct_fatal_error() {
        let runner = Arc::new(MockProcessRunner::default());
        runner.push_error(ProcessError::CommandNotFound("claude".to_string()));
        let executor = AgentExecutorImpl::new(runner, "claude".to_string(), false);
        let (cb, _events) = events_callback();
        let err = executor
            .execute_streaming(
                ExecuteRequest {
                    working_directory: PathBuf::from("/repo"),
                    timeout: Duration::from_secs(60),
                    ..Default::default()
                },
                cb,
            )
            .await
            .unwrap_err();
        assert!(!err.recoverable());
    }
}
