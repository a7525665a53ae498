//! Layered configuration: built-in defaults < `config.toml` < environment
//! overrides < CLI flags (applied by the CLI layer on top of what this
//! module loads). Uses `directories` for platform-appropriate home-directory
//! resolution.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{helpers::config_error, WorkflowError};
use crate::state::WorkflowConfigSnapshot;

fn default_base_dir() -> PathBuf {
    PathBuf::from(".claude/workflow")
}

fn default_claude_path() -> String {
    "claude".to_string()
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_ci_fix_max_attempts() -> u32 {
    3
}

const fn default_split_threshold_lines() -> u64 {
    100
}

const fn default_split_threshold_files() -> u64 {
    10
}

fn default_timeout_planning() -> Duration {
    Duration::from_secs(3600)
}

fn default_timeout_implementation() -> Duration {
    Duration::from_secs(6 * 3600)
}

fn default_timeout_refactoring() -> Duration {
    Duration::from_secs(6 * 3600)
}

fn default_timeout_pr_split() -> Duration {
    Duration::from_secs(3600)
}

fn default_ci_total_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_ci_per_command_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_ci_initial_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_ci_check_interval() -> Duration {
    Duration::from_secs(30)
}

/// Resolved configuration for one `claude-workflow` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_dir: PathBuf,
    pub claude_path: String,
    pub dangerously_skip_permissions: bool,
    pub max_attempts: u32,
    pub ci_fix_max_attempts: u32,
    pub split_threshold_lines: u64,
    pub split_threshold_files: u64,
    pub split_pr_enabled: bool,
    pub e2e_ignore_pattern: Option<String>,

    #[serde(with = "humantime_serde")]
    pub timeout_planning: Duration,
    #[serde(with = "humantime_serde")]
    pub timeout_implementation: Duration,
    #[serde(with = "humantime_serde")]
    pub timeout_refactoring: Duration,
    #[serde(with = "humantime_serde")]
    pub timeout_pr_split: Duration,

    #[serde(with = "humantime_serde")]
    pub ci_total_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub ci_per_command_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub ci_initial_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub ci_check_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            claude_path: default_claude_path(),
            dangerously_skip_permissions: false,
            max_attempts: default_max_attempts(),
            ci_fix_max_attempts: default_ci_fix_max_attempts(),
            split_threshold_lines: default_split_threshold_lines(),
            split_threshold_files: default_split_threshold_files(),
            split_pr_enabled: true,
            e2e_ignore_pattern: None,
            timeout_planning: default_timeout_planning(),
            timeout_implementation: default_timeout_implementation(),
            timeout_refactoring: default_timeout_refactoring(),
            timeout_pr_split: default_timeout_pr_split(),
            ci_total_timeout: default_ci_total_timeout(),
            ci_per_command_timeout: default_ci_per_command_timeout(),
            ci_initial_delay: default_ci_initial_delay(),
            ci_check_interval: default_ci_check_interval(),
        }
    }
}

impl Config {
    /// Load defaults, then merge a `config.toml` at `path` if it exists,
    /// then apply environment-variable overrides (`CLAUDE_WORKFLOW_*`).
    pub fn load(path: Option<&Path>) -> Result<Self, WorkflowError> {
        let mut config = Config::default();

        if let Some(path) = path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                config = toml::from_str(&content)?;
            }
        }

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("CLAUDE_WORKFLOW_BASE_DIR") {
            self.base_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("CLAUDE_WORKFLOW_CLAUDE_PATH") {
            self.claude_path = path;
        }
        if let Ok(val) = std::env::var("CLAUDE_WORKFLOW_MAX_ATTEMPTS") {
            if let Ok(n) = val.parse() {
                self.max_attempts = n;
            }
        }
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.max_attempts == 0 {
            return Err(config_error("max_attempts must be at least 1"));
        }
        if self.ci_fix_max_attempts == 0 {
            return Err(config_error("ci_fix_max_attempts must be at least 1"));
        }
        Ok(())
    }

    pub fn snapshot(&self) -> WorkflowConfigSnapshot {
        WorkflowConfigSnapshot {
            split_threshold_lines: self.split_threshold_lines,
            split_threshold_files: self.split_threshold_files,
            split_pr_enabled: self.split_pr_enabled,
            ci_fix_max_attempts: self.ci_fix_max_attempts,
            max_attempts: self.max_attempts,
        }
    }

    /// The user's config directory (e.g. `~/.config/claude-workflow` on
    /// Linux) joined with `config.toml`, or `None` if the platform has no
    /// resolvable home directory.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "claude-workflow").map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.split_threshold_lines, 100);
        assert_eq!(config.split_threshold_files, 10);
    }

    #[test]
    fn loading_missing_path_falls_back_to_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config.base_dir, default_base_dir());
    }

    #[test]
    fn loads_overrides_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_attempts = 5\nsplit_threshold_files = 20\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.split_threshold_files, 20);
        assert_eq!(config.claude_path, default_claude_path());
    }

    #[test]
    fn rejects_zero_max_attempts() {
        let mut config = Config::default();
        config.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
