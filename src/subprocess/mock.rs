//! A scripted [`ProcessRunner`] for unit tests: queue expected commands and
//! their canned outputs, then assert every expectation was consumed.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::error::ProcessError;
use super::runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner};

pub struct MockProcessRunner {
    responses: Mutex<VecDeque<Result<ProcessOutput, ProcessError>>>,
    call_history: Mutex<Vec<ProcessCommand>>,
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            call_history: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful response with the given stdout.
    pub fn push_success(&self, stdout: impl Into<String>) -> &Self {
        self.responses.lock().unwrap().push_back(Ok(ProcessOutput {
            status: ExitStatus::Success,
            stdout: stdout.into(),
            stderr: String::new(),
            duration: Duration::from_millis(1),
        }));
        self
    }

    /// Queue a non-zero exit with the given stderr.
    pub fn push_failure(&self, code: i32, stderr: impl Into<String>) -> &Self {
        self.responses.lock().unwrap().push_back(Ok(ProcessOutput {
            status: ExitStatus::Error(code),
            stdout: String::new(),
            stderr: stderr.into(),
            duration: Duration::from_millis(1),
        }));
        self
    }

    /// Queue a non-zero exit that still produced stdout, e.g. a partial
    /// Agent transcript before the process died.
    pub fn push_failure_with_stdout(
        &self,
        code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> &Self {
        self.responses.lock().unwrap().push_back(Ok(ProcessOutput {
            status: ExitStatus::Error(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
            duration: Duration::from_millis(1),
        }));
        self
    }

    pub fn push_error(&self, err: ProcessError) -> &Self {
        self.responses.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn call_history(&self) -> Vec<ProcessCommand> {
        self.call_history.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.call_history.lock().unwrap().len()
    }
}

impl Default for MockProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        self.call_history.lock().unwrap().push(command.clone());
        let mut responses = self.responses.lock().unwrap();
        match responses.pop_front() {
            Some(response) => response,
            None => Err(ProcessError::CommandNotFound(format!(
                "no mock response queued for {}",
                command.program
            ))),
        }
    }
}
