//! Dependency installation from a requirements manifest.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{failure_line, parse_args, RunContext, Tool, ToolError, ToolResult, INSTALL_TOOL, PROJECT_DIR};
use crate::sandbox::{last_nonblank_line, shell_quote};

pub const DEFAULT_REQUIREMENTS_FILE: &str = "requirements.txt";

/// Install `req_file` with pip if it exists in the project.
///
/// A missing manifest is not an error: the result is `no <file>`.
pub async fn install_requirements(ctx: &RunContext, req_file: &str) -> ToolResult {
    let req_file = match req_file.trim() {
        "" => DEFAULT_REQUIREMENTS_FILE,
        f => f,
    };
    let quoted = shell_quote(req_file);
    let cmd = format!(
        "cd {dir} && if [ -f {file} ]; then python -m pip install -q -r {file}; else echo {missing}; fi",
        dir = PROJECT_DIR,
        file = quoted,
        missing = shell_quote(&format!("no {}", req_file)),
    );

    let out = ctx.sandbox().exec(&cmd).await;
    if !out.success() {
        tracing::warn!(req_file = %req_file, exit_code = out.exit_code, "Dependency install failed");
        return ToolResult::partial(failure_line(&out), format!("exit {}", out.exit_code));
    }

    match last_nonblank_line(&out.stdout).trim() {
        "" => ToolResult::success("ok"),
        line => ToolResult::success(line),
    }
}

#[derive(Debug, Deserialize)]
struct InstallParams {
    #[serde(default)]
    req_file: Option<String>,
}

/// Tool wrapper around [`install_requirements`].
pub struct InstallTool;

#[async_trait]
impl Tool for InstallTool {
    fn name(&self) -> &str {
        INSTALL_TOOL
    }

    fn description(&self) -> &str {
        "Install Python dependencies from a requirements file in the cloned project if it exists."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "req_file": {
                    "type": "string",
                    "description": "Requirements file relative to the project root",
                    "default": DEFAULT_REQUIREMENTS_FILE
                }
            }
        })
    }

    async fn execute(&self, args: Value, ctx: &mut RunContext) -> Result<ToolResult, ToolError> {
        let params: InstallParams = parse_args(args)?;
        let req_file = params.req_file.as_deref().unwrap_or(DEFAULT_REQUIREMENTS_FILE);
        Ok(install_requirements(ctx, req_file).await)
    }
}
