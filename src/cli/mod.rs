//! CLI argument structures and command routing: a `Cli` derived with
//! `clap`, a `Commands` enum per subcommand, and a thin `execute_command`
//! dispatcher kept in this module rather than `main.rs` so `main.rs` stays
//! a pure composition layer.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::ci::CiMonitor;
use crate::claude::{AgentExecutorImpl, ProgressCallback};
use crate::config::Config;
use crate::error::WorkflowError;
use crate::gh::GhOpsImpl;
use crate::git::GitOpsImpl;
use crate::orchestrator::{ConfirmCallback, Orchestrator};
use crate::phase::PhaseRunner;
use crate::state::{Plan, ProgressEvent, WorkflowType};
use crate::storage::FileStateStore;
use crate::subprocess::TokioProcessRunner;
use crate::worktree::WorktreeManagerImpl;

#[derive(Parser)]
#[command(name = "claude-workflow")]
#[command(about = "Drive an AI coding agent through plan, implement, refactor, and PR", long_about = None)]
#[command(version)]
pub struct Cli {
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    pub max_lines: Option<u64>,

    #[arg(long, global = true)]
    pub max_files: Option<u64>,

    #[arg(long, global = true)]
    pub claude_path: Option<String>,

    #[arg(long, global = true)]
    pub dangerously_skip_permissions: bool,

    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    pub timeout_planning: Option<Duration>,

    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    pub timeout_implementation: Option<Duration>,

    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    pub timeout_refactoring: Option<Duration>,

    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    pub timeout_pr_split: Option<Duration>,

    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a new workflow
    Start {
        name: String,
        description: String,
        #[arg(long = "type", value_enum, default_value = "feature")]
        workflow_type: WorkflowTypeArg,
    },
    /// List all known workflows
    List,
    /// Show one workflow's current state
    Status { name: String },
    /// Resume an interrupted workflow from its last persisted phase
    Resume { name: String },
    /// Delete a workflow's state and worktree
    Delete {
        name: String,
        #[arg(long)]
        force: bool,
    },
    /// Delete every completed or failed workflow
    Clean {
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum WorkflowTypeArg {
    Feature,
    Fix,
    Refactor,
}

impl From<WorkflowTypeArg> for WorkflowType {
    fn from(v: WorkflowTypeArg) -> Self {
        match v {
            WorkflowTypeArg::Feature => WorkflowType::Feature,
            WorkflowTypeArg::Fix => WorkflowType::Fix,
            WorkflowTypeArg::Refactor => WorkflowType::Refactor,
        }
    }
}

impl Cli {
    /// Merge CLI flags on top of the loaded file/env config, completing
    /// the `defaults < config.toml < env < CLI flags` layering.
    pub fn apply_overrides(&self, mut config: Config) -> Config {
        if let Some(dir) = &self.base_dir {
            config.base_dir = dir.clone();
        }
        if let Some(lines) = self.max_lines {
            config.split_threshold_lines = lines;
        }
        if let Some(files) = self.max_files {
            config.split_threshold_files = files;
        }
        if let Some(path) = &self.claude_path {
            config.claude_path = path.clone();
        }
        if self.dangerously_skip_permissions {
            config.dangerously_skip_permissions = true;
        }
        if let Some(t) = self.timeout_planning {
            config.timeout_planning = t;
        }
        if let Some(t) = self.timeout_implementation {
            config.timeout_implementation = t;
        }
        if let Some(t) = self.timeout_refactoring {
            config.timeout_refactoring = t;
        }
        if let Some(t) = self.timeout_pr_split {
            config.timeout_pr_split = t;
        }
        config
    }
}

fn build_orchestrator(config: &Config, repo_path: PathBuf) -> Orchestrator {
    let runner = Arc::new(TokioProcessRunner);
    let store = Arc::new(FileStateStore::new(config.base_dir.clone()));
    let git: Arc<dyn crate::git::GitOps> =
        Arc::new(GitOpsImpl::new(runner.clone(), config.ci_per_command_timeout));
    let gh: Arc<dyn crate::gh::GhOps> =
        Arc::new(GhOpsImpl::new(runner.clone(), config.ci_per_command_timeout));
    let worktree: Arc<dyn crate::worktree::WorktreeManager> =
        Arc::new(WorktreeManagerImpl::new(repo_path.clone(), git.clone()));
    let executor = Arc::new(AgentExecutorImpl::new(
        runner,
        config.claude_path.clone(),
        config.dangerously_skip_permissions,
    ));
    let phase_runner = PhaseRunner::new(executor, store.clone());
    let ci = CiMonitor::new(gh.clone());

    let mut orchestrator = Orchestrator::new(store, worktree, git, gh, phase_runner, ci, config.clone(), repo_path);
    orchestrator.set_confirm_callback(terminal_confirm_callback());
    orchestrator.set_progress_callback(spinner_progress_callback());

    let cancellation = CancellationToken::new();
    orchestrator.set_cancellation_token(cancellation.clone());
    spawn_ctrl_c_listener(cancellation);

    orchestrator
}

/// Cancels `token` on Ctrl-C so the in-flight Agent subprocess, the CI poll
/// loop, and the confirmation prompt all notice and unwind to a resumable
/// `WORKFLOW_CANCELLED` state rather than leaving orphaned children behind.
fn spawn_ctrl_c_listener(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}

/// Drives a single `indicatif` spinner from the Agent's tool-use/text
/// stream: the spinner's message reflects the most recent event.
fn spinner_progress_callback() -> ProgressCallback {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}").unwrap());
    bar.enable_steady_tick(Duration::from_millis(100));

    Arc::new(move |event: ProgressEvent| {
        let message = match event {
            ProgressEvent::ToolUse { tool_name, tool_input } => {
                if tool_input.is_empty() {
                    tool_name
                } else {
                    format!("{tool_name}: {tool_input}")
                }
            }
            ProgressEvent::ToolResult { text, is_error } if is_error => format!("error: {text}"),
            ProgressEvent::ToolResult { text, .. } => text,
            ProgressEvent::Text { text } => text,
            ProgressEvent::Thinking { text } => format!("thinking: {text}"),
        };
        bar.set_message(message);
    })
}

/// Default confirmation gate: print the plan and read `y`/`n` (plus
/// optional feedback on rejection) from stdin.
fn terminal_confirm_callback() -> ConfirmCallback {
    Arc::new(|plan: &Plan, cancellation: &CancellationToken| {
        if cancellation.is_cancelled() {
            return (false, String::new(), Some(crate::error::helpers::workflow_cancelled("CONFIRMATION")));
        }

        println!("\n=== Proposed plan ===");
        println!("{}", plan.summary);
        println!("Complexity: {}, ~{} files, ~{} lines", plan.complexity, plan.estimated_total_files, plan.estimated_total_lines);
        print!("Approve this plan? [y/N/feedback]: ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return (false, String::new(), Some(crate::error::helpers::invalid_transition("failed to read confirmation from stdin")));
        }
        let line = line.trim();
        if line.eq_ignore_ascii_case("y") || line.eq_ignore_ascii_case("yes") {
            (true, String::new(), None)
        } else if line.is_empty() || line.eq_ignore_ascii_case("n") || line.eq_ignore_ascii_case("no") {
            (false, String::new(), None)
        } else {
            (false, line.to_string(), None)
        }
    })
}

pub async fn execute_command(cli: Cli) -> Result<i32, WorkflowError> {
    let config_path = cli.config.clone().or_else(Config::default_config_path);
    let config = Config::load(config_path.as_deref())?;
    let config = cli.apply_overrides(config);
    config.validate()?;

    let repo_path = std::env::current_dir().map_err(WorkflowError::from)?;
    let orchestrator = build_orchestrator(&config, repo_path);

    match cli.command {
        Commands::Start {
            name,
            description,
            workflow_type,
        } => {
            let state = orchestrator.start(&name, &description, workflow_type.into()).await?;
            print_state_summary(&state);
        }
        Commands::List => {
            let workflows = orchestrator.list().await?;
            if workflows.is_empty() {
                println!("No workflows found.");
            }
            for w in workflows {
                println!("{}\t{}\t{}\t{:?}", w.name, w.workflow_type, w.current_phase, w.status);
            }
        }
        Commands::Status { name } => {
            let state = orchestrator.status(&name).await?;
            print_state_summary(&state);
        }
        Commands::Resume { name } => {
            let state = orchestrator.resume(&name).await?;
            print_state_summary(&state);
        }
        Commands::Delete { name, force } => {
            if !force {
                print!("Delete workflow '{name}' and its worktree? [y/N]: ");
                let _ = std::io::stdout().flush();
                let mut line = String::new();
                std::io::stdin().read_line(&mut line).ok();
                if !line.trim().eq_ignore_ascii_case("y") {
                    println!("Aborted.");
                    return Ok(0);
                }
            }
            orchestrator.delete(&name).await?;
            println!("Deleted '{name}'.");
        }
        Commands::Clean { force } => {
            let workflows = orchestrator.list().await?;
            let removable: Vec<_> = workflows
                .into_iter()
                .filter(|w| w.current_phase.is_terminal())
                .collect();
            if !force && !removable.is_empty() {
                print!("Delete {} completed/failed workflow(s)? [y/N]: ", removable.len());
                let _ = std::io::stdout().flush();
                let mut line = String::new();
                std::io::stdin().read_line(&mut line).ok();
                if !line.trim().eq_ignore_ascii_case("y") {
                    println!("Aborted.");
                    return Ok(0);
                }
            }
            for w in &removable {
                orchestrator.delete(&w.name).await?;
            }
            println!("Removed {} workflow(s).", removable.len());
        }
    }

    Ok(0)
}

fn print_state_summary(state: &crate::state::WorkflowState) {
    println!("name:          {}", state.name);
    println!("type:          {}", state.workflow_type);
    println!("phase:         {}", state.current_phase);
    if let Some(err) = &state.last_error {
        println!("last error:    {} ({})", err.message, err.phase);
    }
}
