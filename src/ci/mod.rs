//! `CIMonitor`: polls `gh pr checks` until CI settles.
//!
//! A poll/backoff loop (`tokio::time::sleep` between attempts, bounded by
//! an overall time budget) over an external CI system's status.

use regex::Regex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::error::WorkflowError;
use crate::gh::{CheckLine, GhOps};
use crate::state::{CiResult, CiStatus};

#[derive(Debug, Clone, Default)]
pub struct CheckCiOptions {
    pub e2e_ignore_pattern: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WaitForCiOptions {
    pub initial_delay: Duration,
    pub check_interval: Duration,
    pub per_command_timeout: Duration,
    pub e2e_ignore_pattern: Option<String>,
}

impl Default for WaitForCiOptions {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(60),
            check_interval: Duration::from_secs(30),
            per_command_timeout: Duration::from_secs(120),
            e2e_ignore_pattern: None,
        }
    }
}

pub type CiProgressCallback = Arc<dyn Fn(&CiResult) + Send + Sync>;

pub struct CiMonitor {
    gh: Arc<dyn GhOps>,
}

impl CiMonitor {
    pub fn new(gh: Arc<dyn GhOps>) -> Self {
        Self { gh }
    }

    pub async fn check_ci(
        &self,
        repo: &std::path::Path,
        pr_number: u64,
        timeout: Duration,
        options: &CheckCiOptions,
    ) -> Result<CiResult, WorkflowError> {
        let lines = self.gh.pr_checks(repo, pr_number, timeout).await?;
        Ok(classify(&lines, options.e2e_ignore_pattern.as_deref()))
    }

    /// Sleeps `initial_delay`, then polls every `check_interval` until the
    /// overall `timeout` budget runs out or CI settles (pass or fail).
    pub async fn wait_for_ci(
        &self,
        repo: &std::path::Path,
        pr_number: u64,
        timeout: Duration,
        options: &WaitForCiOptions,
        cancellation: &CancellationToken,
    ) -> Result<CiResult, WorkflowError> {
        self.wait_for_ci_with_progress(repo, pr_number, timeout, options, None, cancellation)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn wait_for_ci_with_progress(
        &self,
        repo: &std::path::Path,
        pr_number: u64,
        timeout: Duration,
        options: &WaitForCiOptions,
        on_progress: Option<CiProgressCallback>,
        cancellation: &CancellationToken,
    ) -> Result<CiResult, WorkflowError> {
        let deadline = Instant::now() + timeout;

        tokio::select! {
            () = sleep(options.initial_delay.min(remaining(deadline))) => {}
            () = cancellation.cancelled() => return Err(crate::error::helpers::workflow_cancelled("CI_FIX")),
        }

        loop {
            if Instant::now() >= deadline {
                return Err(crate::error::helpers::ci_error(
                    format!("CI did not settle for PR #{pr_number} within {timeout:?}"),
                    Some(pr_number),
                ));
            }

            let per_poll_timeout = options.per_command_timeout.min(remaining(deadline));
            let result = self
                .check_ci(
                    repo,
                    pr_number,
                    per_poll_timeout,
                    &CheckCiOptions {
                        e2e_ignore_pattern: options.e2e_ignore_pattern.clone(),
                    },
                )
                .await?;

            if let Some(cb) = &on_progress {
                cb(&result);
            }

            if !matches!(result.status, CiStatus::Pending) {
                return Ok(result);
            }

            tokio::select! {
                () = sleep(options.check_interval.min(remaining(deadline))) => {}
                () = cancellation.cancelled() => return Err(crate::error::helpers::workflow_cancelled("CI_FIX")),
            }
        }
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineVerdict {
    Pass,
    Fail,
    Pending,
}

fn classify_line(line: &CheckLine) -> LineVerdict {
    let lower = line.raw.to_lowercase();
    if line.raw.contains('✓') || lower.contains("pass") || lower.contains("success") {
        LineVerdict::Pass
    } else if line.raw.contains('✗') || lower.contains("fail") || lower.contains("failure") {
        LineVerdict::Fail
    } else if line.raw.contains('○')
        || line.raw.contains('*')
        || lower.contains("pending")
        || lower.contains("queued")
        || lower.contains("in_progress")
    {
        LineVerdict::Pending
    } else {
        // An unrecognized line is treated like a pending check rather than
        // silently dropped, so novel `gh` output never reads as "all green".
        LineVerdict::Pending
    }
}

/// Classify `gh pr checks` output, then apply the E2E ignore
/// filter: jobs matching `e2e_ignore_pattern` are dropped from
/// `failed_jobs`; if that empties the list, `passed` flips to true while
/// `status` stays `Failure` so the caller still knows CI's real verdict.
fn classify(lines: &[CheckLine], e2e_ignore_pattern: Option<&str>) -> CiResult {
    if lines.is_empty() {
        return CiResult {
            passed: false,
            status: CiStatus::Pending,
            failed_jobs: Vec::new(),
            output: String::new(),
        };
    }

    let verdicts: Vec<(String, LineVerdict)> = lines
        .iter()
        .map(|l| (l.name.clone(), classify_line(l)))
        .collect();

    let any_pending = verdicts.iter().any(|(_, v)| *v == LineVerdict::Pending);
    let mut failed_jobs: Vec<String> = verdicts
        .iter()
        .filter(|(_, v)| *v == LineVerdict::Fail)
        .map(|(name, _)| name.clone())
        .collect();

    let status = if any_pending {
        CiStatus::Pending
    } else if !failed_jobs.is_empty() {
        CiStatus::Failure
    } else {
        CiStatus::Success
    };

    let mut passed = matches!(status, CiStatus::Success);

    if status == CiStatus::Failure {
        if let Some(pattern) = e2e_ignore_pattern {
            if let Ok(re) = Regex::new(pattern) {
                failed_jobs.retain(|name| !re.is_match(name));
                if failed_jobs.is_empty() {
                    passed = true;
                }
            }
            // Invalid regex: filter is a no-op, failed_jobs unchanged.
        }
    }

    let output = lines.iter().map(|l| l.raw.as_str()).collect::<Vec<_>>().join("\n");

    CiResult {
        passed,
        status,
        failed_jobs,
        output,
    }
}
