//! # Workflow Error System
//!
//! A unified error type for `claude-workflow` with context chaining, stable
//! error codes, and an explicit recoverability flag that the orchestrator's
//! failure taxonomy (transient vs fatal) reads directly instead of
//! re-deriving it from a string match.
//!
//! ## Context chaining
//!
//! Add `.context("...")` at effect boundaries (I/O, subprocess, layer
//! transitions) the same way you would with `anyhow`:
//!
//! ```ignore
//! std::fs::read_to_string(path)
//!     .map_err(WorkflowError::from)
//!     .context("failed to read workflow state")?;
//! ```

pub mod codes;
pub use codes::ErrorCode;

use std::fmt;

/// One link in a context chain attached to a [`WorkflowError`].
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub message: String,
}

/// The crate-wide error type.
///
/// Each variant carries a stable numeric `code` (see [`ErrorCode`]), an
/// optional boxed source, a context chain built up via [`ErrorExt::context`],
/// and a `recoverable` flag: `true` means the orchestrator may retry the
/// phase or allow `resume`; `false` means operator intervention is
/// required (a missing binary, invalid config, or similar environment
/// problem a retry cannot fix).
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("[E{code:04}] configuration error: {message}")]
    Config {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: Vec<ErrorContext>,
        recoverable: bool,
    },

    #[error("[E{code:04}] state error: {message}")]
    State {
        code: u16,
        message: String,
        workflow_name: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: Vec<ErrorContext>,
        recoverable: bool,
    },

    #[error("[E{code:04}] git operation failed: {message}")]
    Git {
        code: u16,
        message: String,
        operation: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: Vec<ErrorContext>,
        recoverable: bool,
    },

    #[error("[E{code:04}] agent execution error: {message}")]
    Execution {
        code: u16,
        message: String,
        command: Option<String>,
        exit_code: Option<i32>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: Vec<ErrorContext>,
        recoverable: bool,
    },

    #[error("[E{code:04}] CI error: {message}")]
    Ci {
        code: u16,
        message: String,
        pr_number: Option<u64>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: Vec<ErrorContext>,
        recoverable: bool,
    },

    #[error("[E{code:04}] workflow error: {message}")]
    Workflow {
        code: u16,
        message: String,
        phase: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: Vec<ErrorContext>,
        recoverable: bool,
    },

    #[error("[E{code:04}] validation error: {message}")]
    Validation {
        code: u16,
        message: String,
        field: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: Vec<ErrorContext>,
        recoverable: bool,
    },

    #[error("[E{code:04}] {message}")]
    Other {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: Vec<ErrorContext>,
        recoverable: bool,
    },
}

impl WorkflowError {
    /// Whether this failure permits retry within a phase's attempt budget,
    /// or resume after surfacing as `FAILED`.
    pub fn recoverable(&self) -> bool {
        match self {
            WorkflowError::Config { recoverable, .. }
            | WorkflowError::State { recoverable, .. }
            | WorkflowError::Git { recoverable, .. }
            | WorkflowError::Execution { recoverable, .. }
            | WorkflowError::Ci { recoverable, .. }
            | WorkflowError::Workflow { recoverable, .. }
            | WorkflowError::Validation { recoverable, .. }
            | WorkflowError::Other { recoverable, .. } => *recoverable,
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            WorkflowError::Config { code, .. }
            | WorkflowError::State { code, .. }
            | WorkflowError::Git { code, .. }
            | WorkflowError::Execution { code, .. }
            | WorkflowError::Ci { code, .. }
            | WorkflowError::Workflow { code, .. }
            | WorkflowError::Validation { code, .. }
            | WorkflowError::Other { code, .. } => *code,
        }
    }

    /// Developer-facing message including the full context chain, most
    /// recently added first.
    pub fn developer_message(&self) -> String {
        let context = match self {
            WorkflowError::Config { context, .. }
            | WorkflowError::State { context, .. }
            | WorkflowError::Git { context, .. }
            | WorkflowError::Execution { context, .. }
            | WorkflowError::Ci { context, .. }
            | WorkflowError::Workflow { context, .. }
            | WorkflowError::Validation { context, .. }
            | WorkflowError::Other { context, .. } => context,
        };
        let mut out = self.to_string();
        for c in context.iter().rev() {
            out = format!("{out}\n  \u{2192} {}", c.message);
        }
        out
    }

    fn push_context(&mut self, message: String) {
        let context = match self {
            WorkflowError::Config { context, .. }
            | WorkflowError::State { context, .. }
            | WorkflowError::Git { context, .. }
            | WorkflowError::Execution { context, .. }
            | WorkflowError::Ci { context, .. }
            | WorkflowError::Workflow { context, .. }
            | WorkflowError::Validation { context, .. }
            | WorkflowError::Other { context, .. } => context,
        };
        context.push(ErrorContext { message });
    }
}

/// Adds `.context(...)` chaining to any `Result<T, E>` where `E: Into<WorkflowError>`.
pub trait ErrorExt<T> {
    fn context(self, message: impl Into<String>) -> Result<T, WorkflowError>;
    fn with_context<F, S>(self, f: F) -> Result<T, WorkflowError>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ErrorExt<T> for Result<T, E>
where
    E: Into<WorkflowError>,
{
    fn context(self, message: impl Into<String>) -> Result<T, WorkflowError> {
        self.map_err(|e| {
            let mut err = e.into();
            err.push_context(message.into());
            err
        })
    }

    fn with_context<F, S>(self, f: F) -> Result<T, WorkflowError>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| {
            let mut err = e.into();
            err.push_context(f().into());
            err
        })
    }
}

impl From<std::io::Error> for WorkflowError {
    fn from(err: std::io::Error) -> Self {
        WorkflowError::State {
            code: ErrorCode::STATE_IO_ERROR,
            message: err.to_string(),
            workflow_name: None,
            source: Some(Box::new(err)),
            context: Vec::new(),
            recoverable: false,
        }
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        WorkflowError::State {
            code: ErrorCode::STATE_CORRUPTED,
            message: format!("invalid JSON: {err}"),
            workflow_name: None,
            source: Some(Box::new(err)),
            context: Vec::new(),
            recoverable: false,
        }
    }
}

impl From<toml::de::Error> for WorkflowError {
    fn from(err: toml::de::Error) -> Self {
        WorkflowError::Config {
            code: ErrorCode::CONFIG_INVALID_TOML,
            message: err.to_string(),
            source: Some(Box::new(err)),
            context: Vec::new(),
            recoverable: false,
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Constructors grouped by category: transient, CI failure, environment,
/// semantic, and cancellation.
pub mod helpers {
    use super::*;

    pub fn config_error(message: impl Into<String>) -> WorkflowError {
        WorkflowError::Config {
            code: ErrorCode::CONFIG_GENERIC,
            message: message.into(),
            source: None,
            context: Vec::new(),
            recoverable: false,
        }
    }

    pub fn state_not_found(name: &str) -> WorkflowError {
        WorkflowError::State {
            code: ErrorCode::STATE_NOT_FOUND,
            message: format!("workflow '{name}' not found"),
            workflow_name: Some(name.to_string()),
            source: None,
            context: Vec::new(),
            recoverable: false,
        }
    }

    pub fn state_already_exists(name: &str) -> WorkflowError {
        WorkflowError::State {
            code: ErrorCode::STATE_ALREADY_EXISTS,
            message: format!("workflow '{name}' already exists"),
            workflow_name: Some(name.to_string()),
            source: None,
            context: Vec::new(),
            recoverable: false,
        }
    }

    pub fn invalid_name(name: &str) -> WorkflowError {
        WorkflowError::Validation {
            code: ErrorCode::STATE_INVALID_NAME,
            message: format!(
                "workflow name '{name}' must match ^[A-Za-z0-9._-]+$ and stay within the state directory"
            ),
            field: Some("name".to_string()),
            source: None,
            context: Vec::new(),
            recoverable: false,
        }
    }

    pub fn git_error(operation: impl Into<String>, message: impl Into<String>) -> WorkflowError {
        WorkflowError::Git {
            code: ErrorCode::GIT_COMMAND_FAILED,
            message: message.into(),
            operation: operation.into(),
            source: None,
            context: Vec::new(),
            recoverable: false,
        }
    }

    pub fn gh_missing() -> WorkflowError {
        WorkflowError::Git {
            code: ErrorCode::GH_NOT_FOUND,
            message: "the `gh` CLI was not found on PATH".to_string(),
            operation: "gh".to_string(),
            source: None,
            context: Vec::new(),
            recoverable: false,
        }
    }

    pub fn exec_timeout(command: impl Into<String>) -> WorkflowError {
        WorkflowError::Execution {
            code: ErrorCode::EXEC_TIMEOUT,
            message: "agent invocation timed out".to_string(),
            command: Some(command.into()),
            exit_code: None,
            source: None,
            context: Vec::new(),
            recoverable: true,
        }
    }

    pub fn exec_nonzero_exit(command: impl Into<String>, exit_code: i32) -> WorkflowError {
        WorkflowError::Execution {
            code: ErrorCode::EXEC_NONZERO_EXIT,
            message: format!("agent exited with code {exit_code}"),
            command: Some(command.into()),
            exit_code: Some(exit_code),
            source: None,
            context: Vec::new(),
            recoverable: true,
        }
    }

    pub fn exec_command_not_found(command: impl Into<String>) -> WorkflowError {
        WorkflowError::Execution {
            code: ErrorCode::EXEC_COMMAND_NOT_FOUND,
            message: "agent binary not found".to_string(),
            command: Some(command.into()),
            exit_code: None,
            source: None,
            context: Vec::new(),
            recoverable: false,
        }
    }

    pub fn exec_schema_invalid(message: impl Into<String>) -> WorkflowError {
        WorkflowError::Execution {
            code: ErrorCode::EXEC_SCHEMA_INVALID,
            message: message.into(),
            command: None,
            exit_code: None,
            source: None,
            context: Vec::new(),
            recoverable: true,
        }
    }

    pub fn ci_error(message: impl Into<String>, pr_number: Option<u64>) -> WorkflowError {
        WorkflowError::Ci {
            code: ErrorCode::CI_POLL_FAILED,
            message: message.into(),
            pr_number,
            source: None,
            context: Vec::new(),
            recoverable: true,
        }
    }

    pub fn workflow_cancelled(phase: impl Into<String>) -> WorkflowError {
        WorkflowError::Workflow {
            code: ErrorCode::WORKFLOW_CANCELLED,
            message: "workflow cancelled".to_string(),
            phase: Some(phase.into()),
            source: None,
            context: Vec::new(),
            recoverable: true,
        }
    }

    pub fn attempts_exhausted(phase: impl Into<String>, attempts: u32) -> WorkflowError {
        WorkflowError::Workflow {
            code: ErrorCode::WORKFLOW_ATTEMPTS_EXHAUSTED,
            message: format!("exhausted {attempts} attempt(s)"),
            phase: Some(phase.into()),
            source: None,
            context: Vec::new(),
            recoverable: false,
        }
    }

    pub fn confirmation_denied() -> WorkflowError {
        WorkflowError::Workflow {
            code: ErrorCode::WORKFLOW_CONFIRMATION_DENIED,
            message: "confirmation denied with no feedback".to_string(),
            phase: Some("CONFIRMATION".to_string()),
            source: None,
            context: Vec::new(),
            recoverable: false,
        }
    }

    pub fn invalid_transition(message: impl Into<String>) -> WorkflowError {
        WorkflowError::Workflow {
            code: ErrorCode::WORKFLOW_INVALID_TRANSITION,
            message: message.into(),
            phase: None,
            source: None,
            context: Vec::new(),
            recoverable: false,
        }
    }
}
