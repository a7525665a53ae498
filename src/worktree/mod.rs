//! Deterministic per-workflow worktree paths: one worktree per workflow
//! name, created idempotently and torn down idempotently.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{helpers::invalid_name, WorkflowError};
use crate::git::GitOps;

#[async_trait]
pub trait WorktreeManager: Send + Sync {
    async fn create_worktree(&self, workflow_name: &str) -> Result<PathBuf, WorkflowError>;
    async fn delete_worktree(&self, path: &Path) -> Result<(), WorkflowError>;
    async fn worktree_exists(&self, path: &Path) -> bool;
    fn worktree_path(&self, workflow_name: &str) -> PathBuf;
}

pub struct WorktreeManagerImpl {
    repo_path: PathBuf,
    git: Arc<dyn GitOps>,
}

impl WorktreeManagerImpl {
    pub fn new(repo_path: PathBuf, git: Arc<dyn GitOps>) -> Self {
        Self { repo_path, git }
    }
}

#[async_trait]
impl WorktreeManager for WorktreeManagerImpl {
    /// Path is `../worktrees/<name>` relative to the main repo.
    fn worktree_path(&self, workflow_name: &str) -> PathBuf {
        self.repo_path
            .parent()
            .map(|p| p.join("worktrees").join(workflow_name))
            .unwrap_or_else(|| self.repo_path.join("..").join("worktrees").join(workflow_name))
    }

    async fn create_worktree(&self, workflow_name: &str) -> Result<PathBuf, WorkflowError> {
        if workflow_name.trim().is_empty() {
            return Err(invalid_name(workflow_name));
        }

        let path = self.worktree_path(workflow_name);

        let already_registered = self
            .git
            .worktree_list_paths(&self.repo_path)
            .await?
            .into_iter()
            .any(|p| p == path);
        if already_registered {
            return Ok(path);
        }

        self.git
            .worktree_add(&self.repo_path, &path, workflow_name, true)
            .await?;

        Ok(path)
    }

    async fn delete_worktree(&self, path: &Path) -> Result<(), WorkflowError> {
        if path.as_os_str().is_empty() {
            return Err(crate::error::helpers::git_error(
                "worktree remove",
                "empty worktree path",
            ));
        }

        let registered = self
            .git
            .worktree_list_paths(&self.repo_path)
            .await
            .unwrap_or_default()
            .into_iter()
            .any(|p| p == path);

        if !registered {
            // Idempotent cleanup: nothing to do is still success.
            return Ok(());
        }

        self.git.worktree_remove(&self.repo_path, path).await
    }

    async fn worktree_exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{DiffStat, LogEntry};
    use std::sync::Mutex;

    struct StubGit {
        worktrees: Mutex<Vec<PathBuf>>,
        add_calls: Mutex<u32>,
    }

    #[async_trait]
    impl GitOps for StubGit {
        async fn current_branch(&self, _repo: &Path) -> Result<String, WorkflowError> {
            Ok("main".to_string())
        }
        async fn worktree_add(
            &self,
            _repo: &Path,
            path: &Path,
            _branch: &str,
            _create_branch: bool,
        ) -> Result<(), WorkflowError> {
            *self.add_calls.lock().unwrap() += 1;
            self.worktrees.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
        async fn worktree_remove(&self, _repo: &Path, path: &Path) -> Result<(), WorkflowError> {
            self.worktrees.lock().unwrap().retain(|p| p != path);
            Ok(())
        }
        async fn worktree_list_paths(&self, _repo: &Path) -> Result<Vec<PathBuf>, WorkflowError> {
            Ok(self.worktrees.lock().unwrap().clone())
        }
        async fn commit(&self, _repo: &Path, _m: &str, _e: bool) -> Result<(), WorkflowError> {
            Ok(())
        }
        async fn branch_create(&self, _r: &Path, _n: &str, _f: &str) -> Result<(), WorkflowError> {
            Ok(())
        }
        async fn branch_checkout(&self, _r: &Path, _n: &str) -> Result<(), WorkflowError> {
            Ok(())
        }
        async fn branch_delete(&self, _r: &Path, _n: &str) -> Result<(), WorkflowError> {
            Ok(())
        }
        async fn cherry_pick(&self, _r: &Path, _s: &str) -> Result<(), WorkflowError> {
            Ok(())
        }
        async fn checkout_files(&self, _r: &Path, _b: &str, _f: &[String]) -> Result<(), WorkflowError> {
            Ok(())
        }
        async fn diff_stat(&self, _r: &Path, _b: &str, _h: &str) -> Result<DiffStat, WorkflowError> {
            Ok(DiffStat::default())
        }
        async fn log_range(&self, _r: &Path, _b: &str, _h: &str) -> Result<Vec<LogEntry>, WorkflowError> {
            Ok(Vec::new())
        }
        async fn push(&self, _r: &Path, _b: &str) -> Result<(), WorkflowError> {
            Ok(())
        }
    }

    fn manager() -> (WorktreeManagerImpl, Arc<StubGit>) {
        let git = Arc::new(StubGit {
            worktrees: Mutex::new(Vec::new()),
            add_calls: Mutex::new(0),
        });
        let manager = WorktreeManagerImpl::new(PathBuf::from("/repo"), git.clone());
        (manager, git)
    }

    #[tokio::test]
    async fn create_worktree_twice_returns_same_path_and_creates_once() {
        let (manager, git) = manager();
        let path1 = manager.create_worktree("demo").await.unwrap();
        let path2 = manager.create_worktree("demo").await.unwrap();
        assert_eq!(path1, path2);
        assert_eq!(*git.add_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_worktree_is_idempotent() {
        let (manager, _git) = manager();
        let path = manager.create_worktree("demo").await.unwrap();
        manager.delete_worktree(&path).await.unwrap();
        manager.delete_worktree(&path).await.unwrap();
    }

    #[tokio::test]
    async fn empty_workflow_name_errors() {
        let (manager, _git) = manager();
        assert!(manager.create_worktree("").await.is_err());
    }

    #[tokio::test]
    async fn delete_with_empty_path_errors() {
        let (manager, _git) = manager();
        assert!(manager.delete_worktree(Path::new("")).await.is_err());
    }

    #[test]
    fn worktree_path_is_deterministic_from_name() {
        let (manager, _git) = manager();
        assert_eq!(manager.worktree_path("demo"), manager.worktree_path("demo"));
        assert_eq!(manager.worktree_path("demo"), PathBuf::from("/worktrees/demo"));
    }
}
