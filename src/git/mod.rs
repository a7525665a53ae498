//! `GitOps`: a typed facade over the fixed vocabulary of git operations the
//! orchestrator needs, implemented as thin wrappers over `git` invocations
//! through [`ProcessRunner`]. One trait rather than a general git
//! abstraction layer, since the vocabulary needed here is small and fixed.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{helpers::git_error, WorkflowError};
use crate::subprocess::{ProcessCommandBuilder, ProcessRunner};

/// Summary of `git diff --shortstat`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffStat {
    pub files_changed: u64,
    pub insertions: u64,
    pub deletions: u64,
}

/// A single `git log` entry in a revision range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub sha: String,
    pub subject: String,
}

#[async_trait]
pub trait GitOps: Send + Sync {
    async fn current_branch(&self, repo: &Path) -> Result<String, WorkflowError>;
    async fn worktree_add(
        &self,
        repo: &Path,
        path: &Path,
        branch: &str,
        create_branch: bool,
    ) -> Result<(), WorkflowError>;
    async fn worktree_remove(&self, repo: &Path, path: &Path) -> Result<(), WorkflowError>;
    async fn worktree_list_paths(&self, repo: &Path) -> Result<Vec<PathBuf>, WorkflowError>;
    async fn commit(&self, repo: &Path, message: &str, allow_empty: bool)
        -> Result<(), WorkflowError>;
    async fn branch_create(&self, repo: &Path, name: &str, from: &str) -> Result<(), WorkflowError>;
    async fn branch_checkout(&self, repo: &Path, name: &str) -> Result<(), WorkflowError>;
    async fn branch_delete(&self, repo: &Path, name: &str) -> Result<(), WorkflowError>;
    async fn cherry_pick(&self, repo: &Path, sha: &str) -> Result<(), WorkflowError>;
    async fn checkout_files(
        &self,
        repo: &Path,
        from_branch: &str,
        files: &[String],
    ) -> Result<(), WorkflowError>;
    async fn diff_stat(&self, repo: &Path, base: &str, head: &str) -> Result<DiffStat, WorkflowError>;
    async fn log_range(&self, repo: &Path, base: &str, head: &str) -> Result<Vec<LogEntry>, WorkflowError>;
    async fn push(&self, repo: &Path, branch: &str) -> Result<(), WorkflowError>;
}

pub struct GitOpsImpl {
    runner: Arc<dyn ProcessRunner>,
    command_timeout: Duration,
}

impl GitOpsImpl {
    pub fn new(runner: Arc<dyn ProcessRunner>, command_timeout: Duration) -> Self {
        Self {
            runner,
            command_timeout,
        }
    }

    async fn git(&self, repo: &Path, args: &[&str]) -> Result<String, WorkflowError> {
        let command = ProcessCommandBuilder::new("git")
            .args(args.iter().map(|s| s.to_string()))
            .working_dir(repo.to_path_buf())
            .timeout(self.command_timeout)
            .build();
        let output = self.runner.run(command).await.map_err(WorkflowError::from)?;
        if !output.status.success() {
            return Err(git_error(args.join(" "), output.stderr));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl GitOps for GitOpsImpl {
    async fn current_branch(&self, repo: &Path) -> Result<String, WorkflowError> {
        let out = self.git(repo, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        Ok(out.trim().to_string())
    }

    async fn worktree_add(
        &self,
        repo: &Path,
        path: &Path,
        branch: &str,
        create_branch: bool,
    ) -> Result<(), WorkflowError> {
        let path_str = path.to_string_lossy().to_string();
        if create_branch {
            self.git(repo, &["worktree", "add", "-b", branch, &path_str]).await?;
        } else {
            self.git(repo, &["worktree", "add", &path_str, branch]).await?;
        }
        Ok(())
    }

    async fn worktree_remove(&self, repo: &Path, path: &Path) -> Result<(), WorkflowError> {
        let path_str = path.to_string_lossy().to_string();
        self.git(repo, &["worktree", "remove", "--force", &path_str]).await?;
        Ok(())
    }

    async fn worktree_list_paths(&self, repo: &Path) -> Result<Vec<PathBuf>, WorkflowError> {
        let out = self.git(repo, &["worktree", "list", "--porcelain"]).await?;
        Ok(out
            .lines()
            .filter_map(|line| line.strip_prefix("worktree "))
            .map(PathBuf::from)
            .collect())
    }

    async fn commit(
        &self,
        repo: &Path,
        message: &str,
        allow_empty: bool,
    ) -> Result<(), WorkflowError> {
        if allow_empty {
            self.git(repo, &["commit", "--allow-empty", "-m", message]).await?;
        } else {
            self.git(repo, &["commit", "-m", message]).await?;
        }
        Ok(())
    }

    async fn branch_create(&self, repo: &Path, name: &str, from: &str) -> Result<(), WorkflowError> {
        self.git(repo, &["branch", name, from]).await?;
        Ok(())
    }

    async fn branch_checkout(&self, repo: &Path, name: &str) -> Result<(), WorkflowError> {
        self.git(repo, &["checkout", name]).await?;
        Ok(())
    }

    async fn branch_delete(&self, repo: &Path, name: &str) -> Result<(), WorkflowError> {
        self.git(repo, &["branch", "-D", name]).await?;
        Ok(())
    }

    async fn cherry_pick(&self, repo: &Path, sha: &str) -> Result<(), WorkflowError> {
        self.git(repo, &["cherry-pick", sha]).await?;
        Ok(())
    }

    async fn checkout_files(
        &self,
        repo: &Path,
        from_branch: &str,
        files: &[String],
    ) -> Result<(), WorkflowError> {
        let mut args = vec!["checkout".to_string(), from_branch.to_string(), "--".to_string()];
        args.extend(files.iter().cloned());
        let args_ref: Vec<&str> = args.iter().map(String::as_str).collect();
        self.git(repo, &args_ref).await?;
        Ok(())
    }

    async fn diff_stat(&self, repo: &Path, base: &str, head: &str) -> Result<DiffStat, WorkflowError> {
        let range = format!("{base}...{head}");
        let out = self.git(repo, &["diff", "--shortstat", &range]).await?;
        Ok(parse_shortstat(&out))
    }

    async fn log_range(&self, repo: &Path, base: &str, head: &str) -> Result<Vec<LogEntry>, WorkflowError> {
        let range = format!("{base}..{head}");
        let out = self
            .git(repo, &["log", "--pretty=format:%H\u{1f}%s", &range])
            .await?;
        Ok(out
            .lines()
            .filter(|l| !l.is_empty())
            .filter_map(|line| {
                let mut parts = line.splitn(2, '\u{1f}');
                let sha = parts.next()?.to_string();
                let subject = parts.next().unwrap_or_default().to_string();
                Some(LogEntry { sha, subject })
            })
            .collect())
    }

    async fn push(&self, repo: &Path, branch: &str) -> Result<(), WorkflowError> {
        self.git(repo, &["push", "-u", "origin", branch]).await?;
        Ok(())
    }
}

/// Parse `git diff --shortstat` output, e.g.
/// " 3 files changed, 42 insertions(+), 7 deletions(-)".
fn parse_shortstat(output: &str) -> DiffStat {
    let mut stat = DiffStat::default();
    for part in output.split(',') {
        let part = part.trim();
        let Some((number, _)) = part.split_once(' ') else {
            continue;
        };
        let Ok(n) = number.parse::<u64>() else {
            continue;
        };
        if part.contains("file") {
            stat.files_changed = n;
        } else if part.contains("insertion") {
            stat.insertions = n;
        } else if part.contains("deletion") {
            stat.deletions = n;
        }
    }
    stat
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_shortstat() {
        let stat = parse_shortstat(" 3 files changed, 42 insertions(+), 7 deletions(-)");
        assert_eq!(
            stat,
            DiffStat {
                files_changed: 3,
                insertions: 42,
                deletions: 7
            }
        );
    }

    #[test]
    fn parses_insertions_only() {
        let stat = parse_shortstat(" 1 file changed, 10 insertions(+)");
        assert_eq!(
            stat,
            DiffStat {
                files_changed: 1,
                insertions: 10,
                deletions: 0
            }
        );
    }

    #[test]
    fn parses_empty_diff() {
        let stat = parse_shortstat("");
        assert_eq!(stat, DiffStat::default());
    }
}
