//! `PhaseRunner`: retries one Agent phase within an attempt budget, with
//! transcript archival and optional JSON-schema validation.
//!
//! A bounded attempt loop with simplified/degraded prompting near the
//! attempt ceiling, archiving the full Agent conversation at every step.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::claude::{AgentExecutor, ExecuteRequest, ProgressCallback};
use crate::error::WorkflowError;
use crate::session;
use crate::state::Phase;
use crate::storage::StateStore;

/// Builds the prompt text for one attempt; `simplified` is true only on the
/// final attempt.
pub type PromptFn<'a> = dyn Fn(u32, bool) -> String + Send + Sync + 'a;

pub struct PhaseRequest<'a> {
    pub workflow_name: &'a str,
    pub phase: Phase,
    pub working_directory: PathBuf,
    pub env: std::collections::HashMap<String, String>,
    pub timeout: Duration,
    /// The attempt number this call represents, as tracked by the caller's
    /// own persisted `WorkflowState.phases[phase].attempts` counter.
    pub attempt: u32,
    pub max_attempts: u32,
    pub json_schema: Option<String>,
    pub resume_session_id: Option<String>,
    pub force_new_session: bool,
    pub prompt: &'a PromptFn<'a>,
    pub cancellation: CancellationToken,
}

pub struct PhaseOutcome {
    pub output: String,
    pub parsed: Option<Value>,
    pub attempts: u32,
    pub duration: Duration,
    pub session_id: Option<String>,
}

pub struct PhaseRunner {
    executor: Arc<dyn AgentExecutor>,
    store: Arc<dyn StateStore>,
}

impl PhaseRunner {
    pub fn new(executor: Arc<dyn AgentExecutor>, store: Arc<dyn StateStore>) -> Self {
        Self { executor, store }
    }

    /// Runs exactly one Agent invocation for `request.attempt`. Retrying
    /// across attempts is the caller's job: it owns the persisted
    /// `WorkflowState.phases[phase].attempts` counter and decides, via
    /// that counter, whether a recoverable error here gets another call
    /// (on the next `drive()`/`resume()` pass) or terminates the phase.
    /// Keeping the retry loop out of this function means a crash never
    /// loses attempt tracking and `max_attempts` bounds the real number of
    /// Agent invocations rather than `max_attempts` per call.
    pub async fn run(
        &self,
        request: PhaseRequest<'_>,
        on_progress: ProgressCallback,
    ) -> Result<PhaseOutcome, WorkflowError> {
        let started = std::time::Instant::now();
        let simplified = request.attempt == request.max_attempts && request.max_attempts > 2;
        let prompt_text = (request.prompt)(request.attempt, simplified);

        self.store
            .save_prompt(request.workflow_name, request.phase, request.attempt, &prompt_text)
            .await?;

        // `AgentExecutor` derives the `--resume` flag itself from
        // `resume_session_id`; forcing a new session just means not
        // passing one.
        let resume_session_id = if request.force_new_session {
            None
        } else {
            request.resume_session_id.clone()
        };

        let exec_result = self
            .executor
            .execute_streaming(
                ExecuteRequest {
                    prompt: prompt_text,
                    working_directory: request.working_directory.clone(),
                    env: request.env.clone(),
                    timeout: request.timeout,
                    json_schema: request.json_schema.clone(),
                    resume_session_id,
                    extra_args: Vec::new(),
                    cancellation: request.cancellation.clone(),
                },
                on_progress,
            )
            .await?;

        self.store
            .save_raw_output(request.workflow_name, request.phase, request.attempt, &exec_result.output)
            .await?;

        let session_id = exec_result.session_id.clone();

        if exec_result.error.is_some() {
            return Err(crate::error::helpers::exec_nonzero_exit(
                format!("agent phase {}", request.phase),
                exec_result.exit_code,
            ));
        }

        let parsed = match &request.json_schema {
            Some(_) => match extract_last_json(&exec_result.output) {
                Some(value) => Some(value),
                None => {
                    return Err(crate::error::helpers::exec_schema_invalid(
                        "no well-formed JSON result found in agent output",
                    ));
                }
            },
            None => None,
        };

        if let Some(value) = &parsed {
            self.store
                .save_phase_output_value(request.workflow_name, request.phase, value.clone())
                .await?;
        }

        Ok(PhaseOutcome {
            output: exec_result.output,
            parsed,
            attempts: request.attempt,
            duration: started.elapsed(),
            session_id,
        })
    }
}

/// Scans `output` for every top-level JSON value that parses, in source
/// order, and returns the last one — the Agent's final `result` chunk, on
/// the assumption that exactly one well-formed JSON value is meaningful
/// and any earlier ones are incidental tool-use chatter.
fn extract_last_json(output: &str) -> Option<Value> {
    let mut last = None;
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(line) {
            last = Some(value);
        }
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claude::ExecuteResult;
    use crate::state::{ProgressEvent, WorkflowConfigSnapshot, WorkflowType};
    use crate::storage::FileStateStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubExecutor {
        responses: Mutex<Vec<Result<ExecuteResult, WorkflowError>>>,
        prompts_seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AgentExecutor for StubExecutor {
        async fn execute_streaming(
            &self,
            request: ExecuteRequest,
            _on_progress: ProgressCallback,
        ) -> Result<ExecuteResult, WorkflowError> {
            self.prompts_seen.lock().unwrap().push(request.prompt);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                panic!("no more stubbed responses");
            }
            responses.remove(0)
        }
    }

    fn make_store() -> (Arc<FileStateStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (Arc::new(FileStateStore::new(dir.path().to_path_buf())), dir)
    }

    fn ok_result(output: &str) -> Result<ExecuteResult, WorkflowError> {
        let session_id = session::parse_session_id(output);
        Ok(ExecuteResult {
            output: output.to_string(),
            session_id: (!session_id.is_empty()).then_some(session_id),
            exit_code: 0,
            duration: Duration::from_millis(1),
            error: None,
        })
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt_with_schema() {
        let (store, _dir) = make_store();
        store
            .init_state("demo", "d", WorkflowType::Feature, WorkflowConfigSnapshot {
                split_threshold_lines: 100,
                split_threshold_files: 10,
                split_pr_enabled: true,
                ci_fix_max_attempts: 3,
                max_attempts: 3,
            })
            .await
            .unwrap();

        let executor = Arc::new(StubExecutor {
            responses: Mutex::new(vec![ok_result(
                r#"{"type":"result","session_id":"s1","result":"{\"summary\":\"done\"}"}"#,
            )]),
            prompts_seen: Mutex::new(Vec::new()),
        });
        let runner = PhaseRunner::new(executor, store.clone());

        let outcome = runner
            .run(
                PhaseRequest {
                    workflow_name: "demo",
                    phase: Phase::Planning,
                    working_directory: PathBuf::from("/repo"),
                    env: Default::default(),
                    timeout: Duration::from_secs(60),
                    attempt: 1,
                    max_attempts: 3,
                    json_schema: Some("{}".to_string()),
                    resume_session_id: None,
                    force_new_session: false,
                    prompt: &|_attempt, _simplified| "do the plan".to_string(),
                    cancellation: CancellationToken::new(),
                },
                Arc::new(|_: ProgressEvent| {}),
            )
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 1);
        assert!(outcome.parsed.is_some());
    }

    /// A caller drives the retry loop itself, one `run()` call per attempt;
    /// this exercises three such calls end to end and checks that the
    /// simplified prompt only appears on the call carrying the final
    /// attempt number, not after some internal count within one call.
    #[tokio::test]
    async fn caller_driven_retries_use_simplified_prompt_only_on_final_attempt() {
        let (store, _dir) = make_store();
        store
            .init_state("demo", "d", WorkflowType::Feature, WorkflowConfigSnapshot {
                split_threshold_lines: 100,
                split_threshold_files: 10,
                split_pr_enabled: true,
                ci_fix_max_attempts: 3,
                max_attempts: 3,
            })
            .await
            .unwrap();

        let executor = Arc::new(StubExecutor {
            responses: Mutex::new(vec![
                ok_result("no json here at all"),
                ok_result("still nothing"),
                ok_result(r#"{"type":"result","result":"{\"summary\":\"ok\"}"}"#),
            ]),
            prompts_seen: Mutex::new(Vec::new()),
        });
        let runner = PhaseRunner::new(executor.clone(), store);

        for attempt in 1..=2 {
            let err = runner
                .run(
                    PhaseRequest {
                        workflow_name: "demo",
                        phase: Phase::Planning,
                        working_directory: PathBuf::from("/repo"),
                        env: Default::default(),
                        timeout: Duration::from_secs(60),
                        attempt,
                        max_attempts: 3,
                        json_schema: Some("{}".to_string()),
                        resume_session_id: None,
                        force_new_session: false,
                        prompt: &|attempt, simplified| format!("attempt={attempt} simplified={simplified}"),
                        cancellation: CancellationToken::new(),
                    },
                    Arc::new(|_: ProgressEvent| {}),
                )
                .await
                .unwrap_err();
            assert!(err.recoverable());
        }

        let outcome = runner
            .run(
                PhaseRequest {
                    workflow_name: "demo",
                    phase: Phase::Planning,
                    working_directory: PathBuf::from("/repo"),
                    env: Default::default(),
                    timeout: Duration::from_secs(60),
                    attempt: 3,
                    max_attempts: 3,
                    json_schema: Some("{}".to_string()),
                    resume_session_id: None,
                    force_new_session: false,
                    prompt: &|attempt, simplified| format!("attempt={attempt} simplified={simplified}"),
                    cancellation: CancellationToken::new(),
                },
                Arc::new(|_: ProgressEvent| {}),
            )
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 3);
        let prompts = executor.prompts_seen.lock().unwrap();
        assert_eq!(prompts[2], "attempt=3 simplified=true");
        assert_eq!(prompts[0], "attempt=1 simplified=false");
    }

    #[tokio::test]
    async fn invalid_json_on_the_final_attempt_is_still_a_single_recoverable_call() {
        let (store, _dir) = make_store();
        store
            .init_state("demo", "d", WorkflowType::Feature, WorkflowConfigSnapshot {
                split_threshold_lines: 100,
                split_threshold_files: 10,
                split_pr_enabled: true,
                ci_fix_max_attempts: 3,
                max_attempts: 2,
            })
            .await
            .unwrap();

        let executor = Arc::new(StubExecutor {
            responses: Mutex::new(vec![ok_result("nope")]),
            prompts_seen: Mutex::new(Vec::new()),
        });
        let runner = PhaseRunner::new(executor, store);

        let err = runner
            .run(
                PhaseRequest {
                    workflow_name: "demo",
                    phase: Phase::Planning,
                    working_directory: PathBuf::from("/repo"),
                    env: Default::default(),
                    timeout: Duration::from_secs(60),
                    attempt: 2,
                    max_attempts: 2,
                    json_schema: Some("{}".to_string()),
                    resume_session_id: None,
                    force_new_session: false,
                    prompt: &|_attempt, _simplified| "prompt".to_string(),
                    cancellation: CancellationToken::new(),
                },
                Arc::new(|_: ProgressEvent| {}),
            )
            .await
            .unwrap_err();

        // A single call never exhausts attempts itself; whether this error
        // is terminal is the caller's decision based on its own counter.
        assert!(err.recoverable());
    }

    #[test]
    fn extract_last_json_picks_final_well_formed_value() {
        let output = "garbage\n{\"a\":1}\nmore garbage\n{\"a\":2}\n";
        let value = extract_last_json(output).unwrap();
        assert_eq!(value["a"], 2);
    }

    #[test]
    fn extract_last_json_is_none_when_nothing_parses() {
        assert!(extract_last_json("no json anywhere").is_none());
    }
}
