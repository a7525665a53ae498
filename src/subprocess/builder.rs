//! Fluent builder for [`ProcessCommand`].

use super::runner::ProcessCommand;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub struct ProcessCommandBuilder {
    command: ProcessCommand,
}

impl ProcessCommandBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            command: ProcessCommand {
                program: program.into(),
                args: Vec::new(),
                env: HashMap::new(),
                working_dir: None,
                timeout: None,
                stdin: None,
            },
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.command.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.command.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, envs: HashMap<String, String>) -> Self {
        self.command.env.extend(envs);
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.command.working_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.command.timeout = Some(timeout);
        self
    }

    pub fn stdin(mut self, stdin: impl Into<String>) -> Self {
        self.command.stdin = Some(stdin.into());
        self
    }

    pub fn build(self) -> ProcessCommand {
        self.command
    }
}
