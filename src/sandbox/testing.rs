//! Recording sandbox for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{SandboxExecutor, SandboxOutput};

/// Answers commands from substring rules and records every command it sees.
///
/// Rules are checked in registration order; a command matching none of them
/// succeeds with empty output.
#[derive(Default)]
pub(crate) struct RecordingExecutor {
    rules: Vec<(String, SandboxOutput)>,
    commands: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(mut self, needle: &str, exit_code: i32, stdout: &str, stderr: &str) -> Self {
        self.rules.push((
            needle.to_string(),
            SandboxOutput {
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                exit_code,
            },
        ));
        self
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl SandboxExecutor for RecordingExecutor {
    async fn exec(&self, cmd: &str) -> SandboxOutput {
        self.commands.lock().unwrap().push(cmd.to_string());
        self.rules
            .iter()
            .find(|(needle, _)| cmd.contains(needle.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default()
    }
}
