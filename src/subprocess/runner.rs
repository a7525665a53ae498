//! `CommandRunner`: a dependency-injected subprocess runner.
//!
//! Every other component that shells out (GitOps, GhOps, AgentExecutor) goes
//! through `Arc<dyn ProcessRunner>` rather than calling `tokio::process`
//! directly, so tests can substitute [`super::mock::MockProcessRunner`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use super::error::ProcessError;

#[derive(Debug, Clone, Default)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub stdin: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Error(i32),
    Signal(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Success => Some(0),
            ExitStatus::Error(code) => Some(*code),
            ExitStatus::Signal(_) => None,
        }
    }
}

/// Trait object implemented by [`TokioProcessRunner`] in production and by
/// `MockProcessRunner` in tests.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError>;
}

pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        let start = std::time::Instant::now();

        tracing::debug!(
            "executing subprocess: {} {}",
            command.program,
            command.args.join(" ")
        );

        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.kill_on_drop(true);
        cmd.args(&command.args);
        for (key, value) in &command.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }
        if command.stdin.is_some() {
            cmd.stdin(std::process::Stdio::piped());
        }
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::CommandNotFound(command.program.clone())
            } else {
                ProcessError::Io(e)
            }
        })?;

        if let Some(stdin_data) = &command.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                use tokio::io::AsyncWriteExt;
                stdin.write_all(stdin_data.as_bytes()).await?;
                stdin.shutdown().await?;
            }
        }

        let output = if let Some(timeout_duration) = command.timeout {
            match tokio::time::timeout(timeout_duration, child.wait_with_output()).await {
                Ok(result) => result?,
                Err(_) => return Err(ProcessError::Timeout(timeout_duration)),
            }
        } else {
            child.wait_with_output().await?
        };

        let duration = start.elapsed();
        let status = if output.status.success() {
            ExitStatus::Success
        } else if let Some(code) = output.status.code() {
            ExitStatus::Error(code)
        } else {
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                match output.status.signal() {
                    Some(signal) => ExitStatus::Signal(signal),
                    None => ExitStatus::Error(1),
                }
            }
            #[cfg(not(unix))]
            {
                ExitStatus::Error(1)
            }
        };

        let result = ProcessOutput {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration,
        };

        match status {
            ExitStatus::Success => tracing::debug!(
                "subprocess completed in {:?}: {} {}",
                duration,
                command.program,
                command.args.join(" ")
            ),
            ExitStatus::Error(code) => tracing::warn!(
                "subprocess failed with exit code {} in {:?}: {} {}",
                code,
                duration,
                command.program,
                command.args.join(" ")
            ),
            ExitStatus::Signal(signal) => tracing::warn!(
                "subprocess terminated by signal {} in {:?}: {} {}",
                signal,
                duration,
                command.program,
                command.args.join(" ")
            ),
        }

        Ok(result)
    }
}
