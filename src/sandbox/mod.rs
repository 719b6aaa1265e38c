//! Sandboxed command execution.
//!
//! Every command runs in a fresh, auto-removed container with a single host
//! directory bind-mounted as its working directory. Artifacts therefore
//! persist between calls of one run (the cloned project, installed files)
//! while nothing else leaks out of the container.
//!
//! # Example
//!
//! ```ignore
//! use swe_validate::sandbox::{DockerSandbox, SandboxConfig, SandboxExecutor};
//!
//! let sandbox = DockerSandbox::new(SandboxConfig::default())?;
//! sandbox.preflight().await?;
//! let out = sandbox.exec("python --version").await;
//! println!("exit {} -> {}", out.exit_code, out.stdout);
//! ```

pub mod docker;
pub mod quote;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

pub use docker::{DockerSandbox, SandboxConfig, DEFAULT_IMAGE};
pub use quote::{shell_quote, validate_git_arg};

/// Shell command output from inside the container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl SandboxOutput {
    /// Output for a command that never ran (spawn failure, timeout).
    pub fn not_run(reason: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: reason.into(),
            exit_code: -1,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs composed shell commands in an isolated environment.
///
/// Execution is synchronous from the caller's point of view: the future
/// resolves once the command has exited and both output streams are fully
/// captured.
#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    async fn exec(&self, cmd: &str) -> SandboxOutput;
}

/// Last non-blank line of `s`, or `""`.
pub fn last_nonblank_line(s: &str) -> &str {
    s.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
}

/// Last `n` lines of `s` joined with newlines.
pub fn tail_lines(s: &str, n: usize) -> String {
    let lines: Vec<&str> = s.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
