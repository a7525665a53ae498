//! `GhOps`: a typed facade over `gh`, the GitHub CLI.
//!
//! A small, fixed vocabulary of GitHub operations the orchestrator needs:
//! PR create/view/checks, get PR base, rerun workflow, list PRs for branch.
//! Failures propagate with stderr attached.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{helpers::gh_missing, WorkflowError};
use crate::state::PrInfo;
use crate::subprocess::{ExitStatus, ProcessCommandBuilder, ProcessError, ProcessRunner};

/// One line of `gh pr checks` output, before interpretation by the CI
/// monitor (see `crate::ci`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckLine {
    pub name: String,
    pub raw: String,
}

#[async_trait]
pub trait GhOps: Send + Sync {
    async fn create_pr(
        &self,
        repo: &Path,
        title: &str,
        body: &str,
        base: &str,
        head: &str,
    ) -> Result<PrInfo, WorkflowError>;

    async fn view_pr(&self, repo: &Path, number: u64) -> Result<PrInfo, WorkflowError>;

    /// Raw lines from `gh pr checks <n>`; classification happens in the CI
    /// monitor so this layer stays a dumb passthrough.
    async fn pr_checks(&self, repo: &Path, number: u64, timeout: Duration) -> Result<Vec<CheckLine>, WorkflowError>;

    async fn pr_base_branch(&self, repo: &Path, number: u64) -> Result<String, WorkflowError>;

    async fn list_prs_for_branch(&self, repo: &Path, branch: &str) -> Result<Vec<PrInfo>, WorkflowError>;

    async fn rerun_workflow(&self, repo: &Path, run_id: &str) -> Result<(), WorkflowError>;
}

pub struct GhOpsImpl {
    runner: Arc<dyn ProcessRunner>,
    command_timeout: Duration,
}

impl GhOpsImpl {
    pub fn new(runner: Arc<dyn ProcessRunner>, command_timeout: Duration) -> Self {
        Self {
            runner,
            command_timeout,
        }
    }

    async fn gh(&self, repo: &Path, args: &[&str], timeout: Duration) -> Result<String, WorkflowError> {
        let command = ProcessCommandBuilder::new("gh")
            .args(args.iter().map(|s| s.to_string()))
            .working_dir(repo.to_path_buf())
            .timeout(timeout)
            .build();
        let output = self.runner.run(command).await.map_err(|e| match e {
            ProcessError::CommandNotFound(_) => gh_missing(),
            other => WorkflowError::from(other),
        })?;
        if !output.status.success() {
            return Err(crate::error::helpers::git_error(
                format!("gh {}", args.join(" ")),
                output.stderr,
            ));
        }
        Ok(output.stdout)
    }
}

#[derive(Deserialize)]
struct GhPrView {
    number: u64,
    url: String,
    title: String,
    #[serde(rename = "headRefName")]
    head_ref_name: String,
}

impl From<GhPrView> for PrInfo {
    fn from(v: GhPrView) -> Self {
        PrInfo {
            number: v.number,
            url: v.url,
            title: v.title,
            branch: v.head_ref_name,
        }
    }
}

#[async_trait]
impl GhOps for GhOpsImpl {
    async fn create_pr(
        &self,
        repo: &Path,
        title: &str,
        body: &str,
        base: &str,
        head: &str,
    ) -> Result<PrInfo, WorkflowError> {
        self.gh(
            repo,
            &[
                "pr", "create", "--title", title, "--body", body, "--base", base, "--head", head,
            ],
            self.command_timeout,
        )
        .await?;
        self.list_prs_for_branch(repo, head)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                crate::error::helpers::git_error(
                    "gh pr create",
                    "PR created but could not be found via `gh pr list`",
                )
            })
    }

    async fn view_pr(&self, repo: &Path, number: u64) -> Result<PrInfo, WorkflowError> {
        let out = self
            .gh(
                repo,
                &[
                    "pr",
                    "view",
                    &number.to_string(),
                    "--json",
                    "number,url,title,headRefName",
                ],
                self.command_timeout,
            )
            .await?;
        let view: GhPrView = serde_json::from_str(&out)?;
        Ok(view.into())
    }

    async fn pr_checks(
        &self,
        repo: &Path,
        number: u64,
        timeout: Duration,
    ) -> Result<Vec<CheckLine>, WorkflowError> {
        // `gh pr checks` exits non-zero when any check failed or is pending,
        // so unlike other gh subcommands we must still read stdout on
        // failure rather than treating it as an error.
        let command = ProcessCommandBuilder::new("gh")
            .args(["pr", "checks", &number.to_string()])
            .working_dir(repo.to_path_buf())
            .timeout(timeout)
            .build();
        let output = self.runner.run(command).await.map_err(|e| match e {
            ProcessError::CommandNotFound(_) => gh_missing(),
            other => WorkflowError::from(other),
        })?;
        if matches!(output.status, ExitStatus::Signal(_)) {
            return Err(crate::error::helpers::ci_error(
                format!("gh pr checks terminated abnormally: {}", output.stderr),
                Some(number),
            ));
        }
        Ok(output
            .stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|line| CheckLine {
                name: line.split_whitespace().next().unwrap_or_default().to_string(),
                raw: line.to_string(),
            })
            .collect())
    }

    async fn pr_base_branch(&self, repo: &Path, number: u64) -> Result<String, WorkflowError> {
        let out = self
            .gh(
                repo,
                &["pr", "view", &number.to_string(), "--json", "baseRefName"],
                self.command_timeout,
            )
            .await?;
        #[derive(Deserialize)]
        struct Base {
            #[serde(rename = "baseRefName")]
            base_ref_name: String,
        }
        let base: Base = serde_json::from_str(&out)?;
        Ok(base.base_ref_name)
    }

    async fn list_prs_for_branch(&self, repo: &Path, branch: &str) -> Result<Vec<PrInfo>, WorkflowError> {
        let out = self
            .gh(
                repo,
                &[
                    "pr",
                    "list",
                    "--head",
                    branch,
                    "--json",
                    "number,url,title,headRefName",
                ],
                self.command_timeout,
            )
            .await?;
        let views: Vec<GhPrView> = serde_json::from_str(&out)?;
        Ok(views.into_iter().map(PrInfo::from).collect())
    }

    async fn rerun_workflow(&self, repo: &Path, run_id: &str) -> Result<(), WorkflowError> {
        self.gh(repo, &["run", "rerun", run_id], self.command_timeout)
            .await?;
        Ok(())
    }
}
