//! The core data model: workflow state, plans, and diff/PR metadata shared
//! across the orchestrator, phase runner, and storage layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// `feature | fix | refactor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    Feature,
    Fix,
    Refactor,
}

impl std::fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowType::Feature => "feature",
            WorkflowType::Fix => "fix",
            WorkflowType::Refactor => "refactor",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for WorkflowType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "feature" => Ok(WorkflowType::Feature),
            "fix" => Ok(WorkflowType::Fix),
            "refactor" => Ok(WorkflowType::Refactor),
            other => Err(format!("unknown workflow type '{other}'")),
        }
    }
}

/// A named orchestrator step with its own timeout and retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Planning,
    Confirmation,
    Implementation,
    Refactoring,
    CreatePr,
    CiFix,
    PrSplit,
    Completed,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Planning => "PLANNING",
            Phase::Confirmation => "CONFIRMATION",
            Phase::Implementation => "IMPLEMENTATION",
            Phase::Refactoring => "REFACTORING",
            Phase::CreatePr => "CREATE_PR",
            Phase::CiFix => "CI_FIX",
            Phase::PrSplit => "PR_SPLIT",
            Phase::Completed => "COMPLETED",
            Phase::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Per-phase bookkeeping inside [`WorkflowState::phases`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseState {
    pub status: PhaseStatus,
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_exit_code: Option<i32>,
    #[serde(with = "humantime_serde::option")]
    pub last_duration: Option<Duration>,
}

impl Default for PhaseState {
    fn default() -> Self {
        Self {
            status: PhaseStatus::Pending,
            attempts: 0,
            started_at: None,
            completed_at: None,
            last_error: None,
            last_exit_code: None,
            last_duration: None,
        }
    }
}

/// Classifies why a workflow failed, used to decide whether `resume` may
/// re-enter the failing phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    Transient,
    Ci,
    Environment,
    Semantic,
    Cancellation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowErrorInfo {
    pub phase: Phase,
    pub message: String,
    pub failure_type: FailureType,
    pub recoverable: bool,
}

/// The thresholds/timeouts active when a workflow started, snapshotted so
/// a config-file edit mid-flight cannot silently change the
/// rules a resumed workflow is held to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfigSnapshot {
    pub split_threshold_lines: u64,
    pub split_threshold_files: u64,
    pub split_pr_enabled: bool,
    pub ci_fix_max_attempts: u32,
    pub max_attempts: u32,
}

/// The durable, resumable state of one workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub name: String,
    #[serde(rename = "type")]
    pub workflow_type: WorkflowType,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub current_phase: Phase,
    pub phases: BTreeMap<Phase, PhaseState>,
    pub worktree_path: Option<PathBuf>,
    pub session_id: Option<String>,
    pub session_created_at: Option<DateTime<Utc>>,
    pub session_reuse_count: u32,
    pub last_error: Option<WorkflowErrorInfo>,
    pub config_snapshot: WorkflowConfigSnapshot,
}

impl WorkflowState {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        workflow_type: WorkflowType,
        config_snapshot: WorkflowConfigSnapshot,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            workflow_type,
            description: description.into(),
            created_at: now,
            updated_at: now,
            current_phase: Phase::Planning,
            phases: BTreeMap::new(),
            worktree_path: None,
            session_id: None,
            session_created_at: None,
            session_reuse_count: 0,
            last_error: None,
            config_snapshot,
        }
    }

    pub fn phase_state(&self, phase: Phase) -> PhaseState {
        self.phases.get(&phase).cloned().unwrap_or_default()
    }

    pub fn phase_state_mut(&mut self, phase: Phase) -> &mut PhaseState {
        self.phases.entry(phase).or_default()
    }

    /// Invariant (ii): exactly one phase is `IN_PROGRESS`, or the current
    /// phase is terminal.
    pub fn invariant_single_in_progress(&self) -> bool {
        if self.current_phase.is_terminal() {
            return true;
        }
        let in_progress_count = self
            .phases
            .values()
            .filter(|p| p.status == PhaseStatus::InProgress)
            .count();
        in_progress_count <= 1
    }
}

/// A read projection over [`WorkflowState`] for `list()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInfo {
    pub name: String,
    pub workflow_type: WorkflowType,
    pub current_phase: Phase,
    pub status: PhaseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&WorkflowState> for WorkflowInfo {
    fn from(state: &WorkflowState) -> Self {
        Self {
            name: state.name.clone(),
            workflow_type: state.workflow_type,
            current_phase: state.current_phase,
            status: state.phase_state(state.current_phase).status,
            created_at: state.created_at,
            updated_at: state.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlanArchitecture {
    pub overview: String,
    pub components: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanPhase {
    pub name: String,
    pub description: String,
    pub estimated_files: u32,
    pub estimated_lines: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkStream {
    pub name: String,
    pub tasks: Vec<String>,
    pub depends_on: Vec<String>,
}

/// Produced in PLANNING; read in later phases for context injection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub summary: String,
    pub context_type: String,
    pub architecture: PlanArchitecture,
    pub phases: Vec<PlanPhase>,
    pub work_streams: Vec<WorkStream>,
    pub risks: Vec<String>,
    pub complexity: String,
    pub estimated_total_lines: u32,
    pub estimated_total_files: u32,
}

impl Plan {
    /// JSON Schema handed to the Agent via `--json-schema` during PLANNING.
    pub const JSON_SCHEMA: &'static str = r#"{
  "type": "object",
  "required": ["summary", "context_type", "architecture", "phases", "work_streams", "risks", "complexity", "estimated_total_lines", "estimated_total_files"],
  "properties": {
    "summary": { "type": "string" },
    "context_type": { "type": "string" },
    "architecture": {
      "type": "object",
      "required": ["overview", "components"],
      "properties": {
        "overview": { "type": "string" },
        "components": { "type": "array", "items": { "type": "string" } }
      }
    },
    "phases": {
      "type": "array",
      "items": {
        "type": "object",
        "required": ["name", "description", "estimated_files", "estimated_lines"],
        "properties": {
          "name": { "type": "string" },
          "description": { "type": "string" },
          "estimated_files": { "type": "integer" },
          "estimated_lines": { "type": "integer" }
        }
      }
    },
    "work_streams": {
      "type": "array",
      "items": {
        "type": "object",
        "required": ["name", "tasks", "depends_on"],
        "properties": {
          "name": { "type": "string" },
          "tasks": { "type": "array", "items": { "type": "string" } },
          "depends_on": { "type": "array", "items": { "type": "string" } }
        }
      }
    },
    "risks": { "type": "array", "items": { "type": "string" } },
    "complexity": { "type": "string" },
    "estimated_total_lines": { "type": "integer" },
    "estimated_total_files": { "type": "integer" }
  }
}"#;
}

/// Produced in IMPLEMENTATION and REFACTORING.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplementationSummary {
    pub files_changed: Vec<String>,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub tests_added: u32,
    pub summary: String,
    pub next_steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrInfo {
    pub number: u64,
    pub url: String,
    pub title: String,
    pub branch: String,
}

/// Computed from a Git diff vs. the base branch; input to the PR-split
/// decision.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PrMetrics {
    pub commits: u64,
    pub files_changed: u64,
    pub lines_added: u64,
    pub lines_removed: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    ByCommits,
    ByFiles,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildPrPlan {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub commits: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrSplitPlan {
    pub strategy: SplitStrategy,
    pub parent_title: String,
    pub parent_desc: String,
    pub child_prs: Vec<ChildPrPlan>,
    pub summary: String,
}

impl PrSplitPlan {
    /// JSON Schema handed to the Agent via `--json-schema` during PR_SPLIT.
    pub const JSON_SCHEMA: &'static str = r#"{
  "type": "object",
  "required": ["strategy", "parent_title", "parent_desc", "child_prs", "summary"],
  "properties": {
    "strategy": { "type": "string", "enum": ["by_commits", "by_files"] },
    "parent_title": { "type": "string" },
    "parent_desc": { "type": "string" },
    "child_prs": {
      "type": "array",
      "items": {
        "type": "object",
        "required": ["title", "description"],
        "properties": {
          "title": { "type": "string" },
          "description": { "type": "string" },
          "commits": { "type": "array", "items": { "type": "string" } },
          "files": { "type": "array", "items": { "type": "string" } }
        }
      }
    },
    "summary": { "type": "string" }
  }
}"#;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrSplitResult {
    pub parent_pr: PrInfo,
    pub child_prs: Vec<PrInfo>,
    pub summary: String,
    pub branch_names: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiStatus {
    Success,
    Failure,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiResult {
    pub passed: bool,
    pub status: CiStatus,
    pub failed_jobs: Vec<String>,
    pub output: String,
}

/// A tool-use / text / result event decoded from the Agent's NDJSON stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    ToolUse {
        tool_name: String,
        tool_input: String,
    },
    ToolResult {
        text: String,
        is_error: bool,
    },
    Text {
        text: String,
    },
    Thinking {
        text: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_type_round_trips_through_str() {
        for ty in [WorkflowType::Feature, WorkflowType::Fix, WorkflowType::Refactor] {
            let s = ty.to_string();
            let parsed: WorkflowType = s.parse().unwrap();
            assert_eq!(parsed, ty);
        }
    }

    #[test]
    fn single_in_progress_invariant_holds_on_fresh_state() {
        let snapshot = WorkflowConfigSnapshot {
            split_threshold_lines: 100,
            split_threshold_files: 10,
            split_pr_enabled: true,
            ci_fix_max_attempts: 3,
            max_attempts: 3,
        };
        let mut state = WorkflowState::new("demo", "desc", WorkflowType::Feature, snapshot);
        assert!(state.invariant_single_in_progress());
        state.phase_state_mut(Phase::Planning).status = PhaseStatus::InProgress;
        assert!(state.invariant_single_in_progress());
        state.phase_state_mut(Phase::Confirmation).status = PhaseStatus::InProgress;
        assert!(!state.invariant_single_in_progress());
    }

    #[test]
    fn terminal_phase_satisfies_invariant_regardless_of_phase_map() {
        let snapshot = WorkflowConfigSnapshot {
            split_threshold_lines: 100,
            split_threshold_files: 10,
            split_pr_enabled: true,
            ci_fix_max_attempts: 3,
            max_attempts: 3,
        };
        let mut state = WorkflowState::new("demo", "desc", WorkflowType::Feature, snapshot);
        state.current_phase = Phase::Completed;
        state.phase_state_mut(Phase::Planning).status = PhaseStatus::InProgress;
        state.phase_state_mut(Phase::Implementation).status = PhaseStatus::InProgress;
        assert!(state.invariant_single_in_progress());
    }
}
