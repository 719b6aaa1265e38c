//! Model-free validation: clone, install and test with a fixed script.
//!
//! Installation and the test run share one container so the editable install
//! is still present when pytest starts.

use std::path::{Path, PathBuf};

use crate::sandbox::{last_nonblank_line, shell_quote, SandboxExecutor, SandboxOutput};
use crate::tools::{clone_repo, RunContext, PROJECT_DIR};

/// Stdout log written when the test script fails.
pub const STDOUT_LOG: &str = "last_run_stdout.log";
/// Stderr log written when the test script fails.
pub const STDERR_LOG: &str = "last_run_stderr.log";
/// Lines of each stream shown after a failure.
pub const FAILURE_TAIL_LINES: usize = 80;

/// Install-and-test script for the cloned project.
pub fn install_and_test_script(k_expr: &str) -> String {
    let k_expr = k_expr.trim();
    let k_flag = if k_expr.is_empty() {
        String::new()
    } else {
        format!(" -k {}", shell_quote(k_expr))
    };

    format!(
        "set -e
python -m pip install -q -U pip
cd {project}
python -m pip install -q hatchling hatch-vcs
python -m pip install -q -e .
python - <<'PY'
import subprocess
subprocess.run('python -m pip install -q -e .[dev]', shell=True, check=False)
PY
if [ -f testing/requirements.txt ]; then python -m pip install -q -r testing/requirements.txt; fi
python -m pip install -q -U pytest
python -m pytest -q{k_flag}
",
        project = PROJECT_DIR,
    )
}

/// Result of a direct validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectOutcome {
    /// Clone failed; carries the diagnostic line.
    CloneFailed(String),
    /// Script ran; `tail` is its last non-blank line.
    Finished { tail: String, output: SandboxOutput },
}

impl DirectOutcome {
    pub fn success(&self) -> bool {
        matches!(self, DirectOutcome::Finished { output, .. } if output.success())
    }
}

/// Clone `repo_url` and run the install-and-test script.
pub async fn validate_direct(
    sandbox: std::sync::Arc<dyn SandboxExecutor>,
    repo_url: &str,
    k_expr: &str,
) -> DirectOutcome {
    let ctx = RunContext::new(sandbox);

    let cloned = clone_repo(&ctx, repo_url, None).await;
    if !cloned.success {
        tracing::warn!(repo = %repo_url, "Clone failed");
        return DirectOutcome::CloneFailed(cloned.content().to_string());
    }

    let output = ctx.sandbox().exec(&install_and_test_script(k_expr)).await;
    let tail = match last_nonblank_line(&output.stdout) {
        "" => last_nonblank_line(&output.stderr),
        line => line,
    };
    let tail = if tail.is_empty() { "(no output)" } else { tail }.to_string();

    tracing::info!(repo = %repo_url, exit_code = output.exit_code, tail = %tail, "Direct validation finished");
    DirectOutcome::Finished { tail, output }
}

/// Write both streams of a failed run into `dir`.
pub fn save_failure_logs(dir: &Path, output: &SandboxOutput) -> std::io::Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)?;
    let stdout_path = dir.join(STDOUT_LOG);
    let stderr_path = dir.join(STDERR_LOG);
    std::fs::write(&stdout_path, &output.stdout)?;
    std::fs::write(&stderr_path, &output.stderr)?;
    Ok((stdout_path, stderr_path))
}
