use crate::error::{codes::ErrorCode, WorkflowError};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("process timed out after {0:?}")]
    Timeout(Duration),

    #[error("process exited with code {0}")]
    ExitCode(i32),

    #[error("process terminated by signal {0}")]
    Signal(i32),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProcessError> for WorkflowError {
    fn from(err: ProcessError) -> Self {
        let (code, exit_code, recoverable) = match &err {
            ProcessError::CommandNotFound(_) => (ErrorCode::EXEC_COMMAND_NOT_FOUND, None, false),
            ProcessError::Timeout(_) => (ErrorCode::EXEC_TIMEOUT, None, true),
            ProcessError::ExitCode(code) => (ErrorCode::EXEC_NONZERO_EXIT, Some(*code), true),
            ProcessError::Signal(_) => (ErrorCode::EXEC_NONZERO_EXIT, None, true),
            ProcessError::Io(_) => (ErrorCode::EXEC_GENERIC, None, false),
        };
        WorkflowError::Execution {
            code,
            message: err.to_string(),
            command: None,
            exit_code,
            source: Some(Box::new(err)),
            context: Vec::new(),
            recoverable,
        }
    }
}
