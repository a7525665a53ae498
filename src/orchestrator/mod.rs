//! `Orchestrator`: the workflow state machine.
//!
//! A single-threaded driver over a phase sequence, owning the
//! confirmation/progress callbacks and delegating every external effect
//! (Agent invocation, git, gh, CI polling, durable state) to the injected
//! collaborators built in `crate::phase`, `crate::git`, `crate::gh`,
//! `crate::ci`, `crate::storage`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::ci::{CiMonitor, WaitForCiOptions};
use crate::claude::ProgressCallback;
use crate::config::Config;
use crate::error::WorkflowError;
use crate::gh::GhOps;
use crate::git::GitOps;
use crate::phase::{PhaseOutcome, PhaseRequest, PhaseRunner};
use crate::prompt::{build_prompt, PromptContext};
use crate::session;
use crate::state::{
    CiStatus, ChildPrPlan, FailureType, Phase, PhaseStatus, Plan, PrInfo, PrMetrics,
    PrSplitPlan, PrSplitResult, ProgressEvent, WorkflowErrorInfo, WorkflowInfo, WorkflowState,
    WorkflowType,
};
use crate::storage::{StateStore, StateStoreExt};
use crate::worktree::WorktreeManager;

/// `(approve, feedback, fatal_error)`, called synchronously with the plan
/// the orchestrator wants signed off and the workflow's cancellation token,
/// which the callback must itself observe (a blocking terminal prompt, for
/// instance, has no other way to be interrupted by Ctrl-C).
pub type ConfirmCallback = Arc<dyn Fn(&Plan, &CancellationToken) -> (bool, String, Option<WorkflowError>) + Send + Sync>;

pub struct Orchestrator {
    store: Arc<dyn StateStore>,
    worktree: Arc<dyn WorktreeManager>,
    git: Arc<dyn GitOps>,
    gh: Arc<dyn GhOps>,
    phase_runner: PhaseRunner,
    ci: CiMonitor,
    config: Config,
    repo_path: PathBuf,
    confirm_callback: Option<ConfirmCallback>,
    progress_callback: Option<ProgressCallback>,
    cancellation: CancellationToken,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn StateStore>,
        worktree: Arc<dyn WorktreeManager>,
        git: Arc<dyn GitOps>,
        gh: Arc<dyn GhOps>,
        phase_runner: PhaseRunner,
        ci: CiMonitor,
        config: Config,
        repo_path: PathBuf,
    ) -> Self {
        Self {
            store,
            worktree,
            git,
            gh,
            phase_runner,
            ci,
            config,
            repo_path,
            confirm_callback: None,
            progress_callback: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn set_confirm_callback(&mut self, callback: ConfirmCallback) {
        self.confirm_callback = Some(callback);
    }

    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.progress_callback = Some(callback);
    }

    /// Wires an external cancellation signal (e.g. Ctrl-C) through to child
    /// Agent processes, the CI poll loop, and the confirmation callback.
    /// Cancelling never mutates persisted state directly: `drive()` notices
    /// the token at the top of its next iteration and returns a recoverable
    /// `WORKFLOW_CANCELLED` error, leaving the workflow resumable.
    pub fn set_cancellation_token(&mut self, token: CancellationToken) {
        self.cancellation = token;
    }

    pub async fn start(
        &self,
        name: &str,
        description: &str,
        workflow_type: WorkflowType,
    ) -> Result<WorkflowState, WorkflowError> {
        let state = self
            .store
            .init_state(name, description, workflow_type, self.config.snapshot())
            .await?;
        self.drive(state).await
    }

    pub async fn resume(&self, name: &str) -> Result<WorkflowState, WorkflowError> {
        let state = self.store.load_state(name).await?;
        if state.current_phase.is_terminal() {
            return Ok(state);
        }
        self.drive(state).await
    }

    pub async fn status(&self, name: &str) -> Result<WorkflowState, WorkflowError> {
        self.store.load_state(name).await
    }

    pub async fn list(&self) -> Result<Vec<WorkflowInfo>, WorkflowError> {
        self.store.list_workflows().await
    }

    pub async fn delete(&self, name: &str) -> Result<(), WorkflowError> {
        let state = self.store.load_state(name).await?;
        if let Some(path) = &state.worktree_path {
            self.worktree.delete_worktree(path).await?;
        }
        self.store.delete_workflow(name).await
    }

    /// The canonical sequence: `PLANNING → CONFIRMATION →
    /// IMPLEMENTATION → CREATE_PR → (CI loop) → REFACTORING → (CI loop) →
    /// PR_SPLIT? → COMPLETED`. `fix` may skip `REFACTORING`.
    async fn drive(&self, mut state: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        loop {
            if self.cancellation.is_cancelled() {
                return Err(crate::error::helpers::workflow_cancelled(state.current_phase.to_string()));
            }

            let step = match state.current_phase {
                Phase::Planning => self.run_planning(&mut state).await,
                Phase::Confirmation => self.run_confirmation(&mut state).await,
                Phase::Implementation => self.run_implementation(&mut state).await,
                Phase::CreatePr => self.run_create_pr(&mut state).await,
                Phase::CiFix => self.run_ci_fix(&mut state).await,
                Phase::Refactoring => self.run_refactoring(&mut state).await,
                Phase::PrSplit => self.run_pr_split(&mut state).await,
                Phase::Completed | Phase::Failed => return Ok(state),
            };

            // Persist unconditionally, before propagating any error, so an
            // attempt counter bumped by the phase above survives a crash
            // even when the phase itself returns a recoverable error for
            // `resume` to retry later.
            self.store.save_state(&state).await?;
            step?;

            if state.current_phase.is_terminal() {
                return Ok(state);
            }
        }
    }

    fn worktree_path_of(&self, state: &WorkflowState) -> PathBuf {
        state
            .worktree_path
            .clone()
            .unwrap_or_else(|| self.worktree.worktree_path(&state.name))
    }

    /// Marks a phase failed and terminates the workflow if attempts are
    /// exhausted or the error is fatal; otherwise propagates it so the
    /// caller (and ultimately `resume`) can retry later.
    fn record_failure(
        &self,
        state: &mut WorkflowState,
        phase: Phase,
        attempts_so_far: u32,
        max_attempts: u32,
        err: WorkflowError,
    ) -> Result<(), WorkflowError> {
        let recoverable = err.recoverable();
        let exhausted = attempts_so_far >= max_attempts;
        let message = if exhausted && recoverable {
            crate::error::helpers::attempts_exhausted(phase.to_string(), attempts_so_far).developer_message()
        } else {
            err.developer_message()
        };
        state.phase_state_mut(phase).last_error = Some(message.clone());

        if exhausted || !recoverable {
            state.phase_state_mut(phase).status = PhaseStatus::Failed;
            state.current_phase = Phase::Failed;
            state.last_error = Some(WorkflowErrorInfo {
                phase,
                message,
                failure_type: if recoverable {
                    FailureType::Transient
                } else {
                    FailureType::Environment
                },
                recoverable,
            });
            Ok(())
        } else {
            Err(err)
        }
    }

    async fn run_planning(&self, state: &mut WorkflowState) -> Result<(), WorkflowError> {
        if state.worktree_path.is_none() {
            let path = self.worktree.create_worktree(&state.name).await?;
            state.worktree_path = Some(path);
        }

        let phase_state = state.phase_state_mut(Phase::Planning);
        phase_state.status = PhaseStatus::InProgress;
        phase_state.attempts += 1;
        let attempts_so_far = phase_state.attempts;
        let feedback = phase_state.last_error.take().unwrap_or_default();

        let description = state.description.clone();
        let workflow_type = state.workflow_type;

        let outcome = self
            .run_phase(
                state,
                Phase::Planning,
                self.config.timeout_planning,
                Some(Plan::JSON_SCHEMA),
                attempts_so_far,
                self.config.max_attempts,
                move |attempt, simplified| {
                    let ctx = PromptContext {
                        phase: Phase::Planning,
                        workflow_type,
                        description: &description,
                        plan: None,
                        metrics: None,
                        commits: &[],
                        ci_failures: &[],
                        attempt,
                        simplified,
                    };
                    let mut text = build_prompt(&ctx);
                    if !feedback.is_empty() {
                        text.push_str(&format!("\n## Feedback from prior review\n{feedback}\n"));
                    }
                    text
                },
            )
            .await;

        match outcome {
            Ok(outcome) => {
                if let Some(session_id) = &outcome.session_id {
                    session::update_state_with_session(state, session_id, false);
                }
                let plan: Plan = match serde_json::from_value(outcome.parsed.clone().unwrap_or_default()) {
                    Ok(plan) => plan,
                    Err(e) => {
                        return self.record_failure(
                            state,
                            Phase::Planning,
                            attempts_so_far,
                            self.config.max_attempts,
                            crate::error::helpers::exec_schema_invalid(e.to_string()),
                        );
                    }
                };
                self.store.save_plan(&state.name, &plan).await?;

                let phase_state = state.phase_state_mut(Phase::Planning);
                phase_state.status = PhaseStatus::Completed;
                phase_state.completed_at = Some(chrono::Utc::now());
                phase_state.last_duration = Some(outcome.duration);
                state.current_phase = Phase::Confirmation;
                Ok(())
            }
            Err(err) => self.record_failure(state, Phase::Planning, attempts_so_far, self.config.max_attempts, err),
        }
    }

    async fn run_confirmation(&self, state: &mut WorkflowState) -> Result<(), WorkflowError> {
        let plan = self.store.load_plan(&state.name).await?;
        let Some(callback) = &self.confirm_callback else {
            // No callback configured: auto-approve rather than block
            // forever waiting on a prompt that will never arrive.
            state.current_phase = Phase::Implementation;
            return Ok(());
        };

        let (approve, feedback, err) = callback(&plan, &self.cancellation);
        if let Some(err) = err {
            state.current_phase = Phase::Failed;
            state.last_error = Some(WorkflowErrorInfo {
                phase: Phase::Confirmation,
                message: err.developer_message(),
                failure_type: FailureType::Semantic,
                recoverable: false,
            });
            return Ok(());
        }

        if approve {
            state.current_phase = Phase::Implementation;
            return Ok(());
        }

        if feedback.is_empty() {
            state.current_phase = Phase::Failed;
            state.last_error = Some(WorkflowErrorInfo {
                phase: Phase::Confirmation,
                message: "confirmation denied without feedback".to_string(),
                failure_type: FailureType::Semantic,
                recoverable: false,
            });
            return Ok(());
        }

        let phase_state = state.phase_state_mut(Phase::Planning);
        phase_state.status = PhaseStatus::Pending;
        phase_state.last_error = Some(feedback);
        state.current_phase = Phase::Planning;
        Ok(())
    }

    async fn run_implementation(&self, state: &mut WorkflowState) -> Result<(), WorkflowError> {
        self.run_agent_code_phase(state, Phase::Implementation, self.config.timeout_implementation, Phase::CreatePr)
            .await
    }

    async fn run_refactoring(&self, state: &mut WorkflowState) -> Result<(), WorkflowError> {
        self.run_agent_code_phase(state, Phase::Refactoring, self.config.timeout_refactoring, Phase::CiFix)
            .await
    }

    async fn run_agent_code_phase(
        &self,
        state: &mut WorkflowState,
        phase: Phase,
        timeout: Duration,
        next_on_success: Phase,
    ) -> Result<(), WorkflowError> {
        let phase_state = state.phase_state_mut(phase);
        phase_state.status = PhaseStatus::InProgress;
        phase_state.attempts += 1;
        let attempts_so_far = phase_state.attempts;

        let plan = self.store.load_plan(&state.name).await.ok();
        let description = state.description.clone();
        let workflow_type = state.workflow_type;

        let outcome = self
            .run_phase(
                state,
                phase,
                timeout,
                None,
                attempts_so_far,
                self.config.max_attempts,
                move |attempt, simplified| {
                    let ctx = PromptContext {
                        phase,
                        workflow_type,
                        description: &description,
                        plan: plan.as_ref(),
                        metrics: None,
                        commits: &[],
                        ci_failures: &[],
                        attempt,
                        simplified,
                    };
                    build_prompt(&ctx)
                },
            )
            .await;

        match outcome {
            Ok(outcome) => {
                if let Some(session_id) = &outcome.session_id {
                    session::update_state_with_session(state, session_id, false);
                }
                let phase_state = state.phase_state_mut(phase);
                phase_state.status = PhaseStatus::Completed;
                phase_state.completed_at = Some(chrono::Utc::now());
                phase_state.last_duration = Some(outcome.duration);
                state.current_phase = next_on_success;
                Ok(())
            }
            Err(err) => self.record_failure(state, phase, attempts_so_far, self.config.max_attempts, err),
        }
    }

    async fn run_create_pr(&self, state: &mut WorkflowState) -> Result<(), WorkflowError> {
        let worktree_path = self.worktree_path_of(state);
        let branch = self.git.current_branch(&worktree_path).await?;
        let base = self.git.current_branch(&self.repo_path).await.unwrap_or_else(|_| "main".to_string());

        let existing = self.gh.list_prs_for_branch(&self.repo_path, &branch).await?;
        let pr = match existing.into_iter().next() {
            Some(pr) => pr,
            None => {
                self.gh
                    .create_pr(
                        &worktree_path,
                        &format!("{}: {}", state.workflow_type, state.description),
                        &state.description,
                        &base,
                        &branch,
                    )
                    .await?
            }
        };

        self.store.save_phase_output(&state.name, Phase::CreatePr, &pr).await?;
        let phase_state = state.phase_state_mut(Phase::CreatePr);
        phase_state.status = PhaseStatus::Completed;
        phase_state.completed_at = Some(chrono::Utc::now());
        state.current_phase = Phase::CiFix;
        Ok(())
    }

    /// Waits for CI, and on real (non-ignored) failure invokes the Agent
    /// with failing-job context; exceeding `ci_fix_max_attempts` is fatal.
    /// Re-entered after `REFACTORING` lands its own commits, distinguished
    /// from the post-`IMPLEMENTATION` entry by whether `REFACTORING` has
    /// already started for this workflow.
    async fn run_ci_fix(&self, state: &mut WorkflowState) -> Result<(), WorkflowError> {
        let worktree_path = self.worktree_path_of(state);
        let pr: PrInfo = self.store.load_phase_output(&state.name, Phase::CreatePr).await?;

        let refactoring_started = state.phases.contains_key(&Phase::Refactoring);
        let next_phase_on_success = if refactoring_started || state.workflow_type == WorkflowType::Fix {
            Phase::PrSplit
        } else {
            Phase::Refactoring
        };

        let options = WaitForCiOptions {
            initial_delay: self.config.ci_initial_delay,
            check_interval: self.config.ci_check_interval,
            per_command_timeout: self.config.ci_per_command_timeout,
            e2e_ignore_pattern: self.config.e2e_ignore_pattern.clone(),
        };

        let result = self
            .ci
            .wait_for_ci(&worktree_path, pr.number, self.config.ci_total_timeout, &options, &self.cancellation)
            .await?;

        match result.status {
            CiStatus::Success => {
                state.current_phase = next_phase_on_success;
                state.phase_state_mut(Phase::CiFix).status = PhaseStatus::Completed;
                return Ok(());
            }
            CiStatus::Pending => {
                return Err(crate::error::helpers::ci_error(
                    "CI still pending after wait_for_ci returned",
                    Some(pr.number),
                ));
            }
            CiStatus::Failure if result.passed => {
                // Real failure restricted entirely to the ignored pattern.
                state.current_phase = next_phase_on_success;
                state.phase_state_mut(Phase::CiFix).status = PhaseStatus::Completed;
                return Ok(());
            }
            CiStatus::Failure => {}
        }

        let phase_state = state.phase_state_mut(Phase::CiFix);
        phase_state.status = PhaseStatus::InProgress;
        phase_state.attempts += 1;
        let attempts_so_far = phase_state.attempts;

        if attempts_so_far > self.config.ci_fix_max_attempts {
            state.current_phase = Phase::Failed;
            state.phase_state_mut(Phase::CiFix).status = PhaseStatus::Failed;
            state.last_error = Some(WorkflowErrorInfo {
                phase: Phase::CiFix,
                message: format!("CI failures remained after {attempts_so_far} attempts"),
                failure_type: FailureType::Ci,
                recoverable: false,
            });
            return Ok(());
        }

        let failed_jobs = result.failed_jobs.clone();
        let description = state.description.clone();
        let workflow_type = state.workflow_type;

        let outcome = self
            .run_phase(
                state,
                Phase::CiFix,
                self.config.ci_total_timeout,
                None,
                attempts_so_far,
                self.config.ci_fix_max_attempts,
                move |attempt, simplified| {
                    let ctx = PromptContext {
                        phase: Phase::CiFix,
                        workflow_type,
                        description: &description,
                        plan: None,
                        metrics: None,
                        commits: &[],
                        ci_failures: &failed_jobs,
                        attempt,
                        simplified,
                    };
                    build_prompt(&ctx)
                },
            )
            .await;

        match outcome {
            Ok(outcome) => {
                if let Some(session_id) = &outcome.session_id {
                    session::update_state_with_session(state, session_id, false);
                }
                let phase_state = state.phase_state_mut(Phase::CiFix);
                phase_state.last_error = None;
                phase_state.last_duration = Some(outcome.duration);
                // Stay in CI_FIX: the next `drive()` iteration re-polls CI
                // against the commit the Agent just pushed.
                state.current_phase = Phase::CiFix;
                Ok(())
            }
            Err(err) => self.record_failure(state, Phase::CiFix, attempts_so_far, self.config.ci_fix_max_attempts, err),
        }
    }

    async fn run_pr_split(&self, state: &mut WorkflowState) -> Result<(), WorkflowError> {
        let worktree_path = self.worktree_path_of(state);
        let pr: PrInfo = self.store.load_phase_output(&state.name, Phase::CreatePr).await?;
        let base = self.gh.pr_base_branch(&self.repo_path, pr.number).await?;
        let diff_stat = self.git.diff_stat(&worktree_path, &base, &pr.branch).await?;
        let log_entries = self.git.log_range(&worktree_path, &base, &pr.branch).await?;
        let commit_lines: Vec<String> = log_entries
            .iter()
            .map(|entry| format!("{} {}", short_sha(&entry.sha), entry.subject))
            .collect();

        let metrics = PrMetrics {
            commits: log_entries.len() as u64,
            files_changed: diff_stat.files_changed,
            lines_added: diff_stat.insertions,
            lines_removed: diff_stat.deletions,
        };

        let should_split = self.config.split_pr_enabled
            && (metrics.lines_added + metrics.lines_removed > self.config.split_threshold_lines
                || metrics.files_changed > self.config.split_threshold_files);

        if !should_split {
            state.current_phase = Phase::Completed;
            state.phase_state_mut(Phase::PrSplit).status = PhaseStatus::Completed;
            return Ok(());
        }

        let phase_state = state.phase_state_mut(Phase::PrSplit);
        phase_state.status = PhaseStatus::InProgress;
        phase_state.attempts += 1;
        let attempts_so_far = phase_state.attempts;

        let description = state.description.clone();
        let workflow_type = state.workflow_type;
        let metrics_for_prompt = metrics.clone();

        let outcome = self
            .run_phase(
                state,
                Phase::PrSplit,
                self.config.timeout_pr_split,
                Some(PrSplitPlan::JSON_SCHEMA),
                attempts_so_far,
                self.config.max_attempts,
                move |attempt, simplified| {
                    let ctx = PromptContext {
                        phase: Phase::PrSplit,
                        workflow_type,
                        description: &description,
                        plan: None,
                        metrics: Some(&metrics_for_prompt),
                        commits: &commit_lines,
                        ci_failures: &[],
                        attempt,
                        simplified,
                    };
                    build_prompt(&ctx)
                },
            )
            .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => return self.record_failure(state, Phase::PrSplit, attempts_so_far, self.config.max_attempts, err),
        };

        if let Some(session_id) = &outcome.session_id {
            session::update_state_with_session(state, session_id, false);
        }

        let plan: PrSplitPlan = match serde_json::from_value(outcome.parsed.clone().unwrap_or_default()) {
            Ok(plan) => plan,
            Err(e) => {
                return self.record_failure(
                    state,
                    Phase::PrSplit,
                    attempts_so_far,
                    self.config.max_attempts,
                    crate::error::helpers::exec_schema_invalid(e.to_string()),
                );
            }
        };

        let result = self.execute_pr_split(&worktree_path, &base, &pr, &plan).await?;
        self.store.save_phase_output(&state.name, Phase::PrSplit, &result).await?;

        let phase_state = state.phase_state_mut(Phase::PrSplit);
        phase_state.status = PhaseStatus::Completed;
        phase_state.completed_at = Some(chrono::Utc::now());
        phase_state.last_duration = Some(outcome.duration);
        state.current_phase = Phase::Completed;
        Ok(())
    }

    /// Executes a `PrSplitPlan` against git/gh: create the
    /// parent branch with an empty commit, then for each child create a
    /// branch from the parent, apply its commits/files, push, and have the
    /// Agent-authored title/description turned into a PR targeting the
    /// parent branch.
    async fn execute_pr_split(
        &self,
        worktree_path: &std::path::Path,
        base: &str,
        original_pr: &PrInfo,
        plan: &PrSplitPlan,
    ) -> Result<PrSplitResult, WorkflowError> {
        let parent_branch = format!("{}-split", original_pr.branch);
        self.git.branch_create(worktree_path, &parent_branch, base).await?;
        self.git.branch_checkout(worktree_path, &parent_branch).await?;
        self.git
            .commit(worktree_path, &plan.parent_title, true)
            .await?;
        self.git.push(worktree_path, &parent_branch).await?;

        let parent_pr = self
            .gh
            .create_pr(worktree_path, &plan.parent_title, &plan.parent_desc, base, &parent_branch)
            .await?;

        let mut child_prs = Vec::with_capacity(plan.child_prs.len());
        let mut branch_names = vec![parent_branch.clone()];

        for (i, child) in plan.child_prs.iter().enumerate() {
            let child_branch = format!("{parent_branch}-child-{}", i + 1);
            self.git
                .branch_create(worktree_path, &child_branch, &parent_branch)
                .await?;
            self.git.branch_checkout(worktree_path, &child_branch).await?;

            self.apply_child_plan(worktree_path, &parent_branch, child).await?;
            self.git.push(worktree_path, &child_branch).await?;

            let child_pr = self
                .gh
                .create_pr(worktree_path, &child.title, &child.description, &parent_branch, &child_branch)
                .await?;
            child_prs.push(child_pr);
            branch_names.push(child_branch);
        }

        Ok(PrSplitResult {
            parent_pr,
            child_prs,
            summary: plan.summary.clone(),
            branch_names,
        })
    }

    async fn apply_child_plan(
        &self,
        worktree_path: &std::path::Path,
        parent_branch: &str,
        child: &ChildPrPlan,
    ) -> Result<(), WorkflowError> {
        if !child.commits.is_empty() {
            for sha in &child.commits {
                self.git.cherry_pick(worktree_path, sha).await?;
            }
        } else if !child.files.is_empty() {
            self.git.checkout_files(worktree_path, parent_branch, &child.files).await?;
            self.git.commit(worktree_path, &child.title, false).await?;
        }
        Ok(())
    }

    /// Shared plumbing for invoking `PhaseRunner` from each phase handler.
    /// `attempt` is the caller's own persisted attempt counter for `phase`
    /// (bumped once per `drive()` pass, before this is called); `PhaseRunner`
    /// performs exactly one Agent invocation per call, so `attempt` and
    /// `max_attempts` are the real, single source of truth for how many
    /// invocations this phase gets in total, across any number of crashes
    /// and `resume()` calls.
    #[allow(clippy::too_many_arguments)]
    async fn run_phase(
        &self,
        state: &WorkflowState,
        phase: Phase,
        timeout: Duration,
        json_schema: Option<&'static str>,
        attempt: u32,
        max_attempts: u32,
        prompt: impl Fn(u32, bool) -> String + Send + Sync + 'static,
    ) -> Result<PhaseOutcome, WorkflowError> {
        let worktree_path = self.worktree_path_of(state);

        let force_new_session =
            state.current_phase == Phase::Planning && state.phase_state(Phase::Planning).attempts > 1;

        let on_progress = self
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(|_: ProgressEvent| {}));

        self.phase_runner
            .run(
                PhaseRequest {
                    workflow_name: &state.name,
                    phase,
                    working_directory: worktree_path,
                    env: Default::default(),
                    timeout,
                    attempt,
                    max_attempts,
                    json_schema: json_schema.map(str::to_string),
                    resume_session_id: session::get_session_from_state(state).map(str::to_string),
                    force_new_session,
                    prompt: &prompt,
                    cancellation: self.cancellation.clone(),
                },
                on_progress,
            )
            .await
    }
}

/// First 7 characters of a SHA, matching `git log --oneline`'s default.
fn short_sha(sha: &str) -> &str {
    let end = sha.char_indices().nth(7).map(|(i, _)| i).unwrap_or(sha.len());
    &sha[..end]
}
