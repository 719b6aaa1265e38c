//! Repository clone with staged ref checkout.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{failure_line, parse_args, RunContext, Tool, ToolError, ToolResult, CLONE_TOOL, PROJECT_DIR};
use crate::sandbox::{shell_quote, validate_git_arg, SandboxOutput};

/// Fetch strategies tried in order when a ref is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    Depth(u32),
    Unshallow,
}

/// Escalation order for checking out a ref in a shallow clone.
pub const FETCH_STAGES: [FetchStage; 3] = [
    FetchStage::Depth(1),
    FetchStage::Depth(50),
    FetchStage::Unshallow,
];

impl FetchStage {
    fn command(self, quoted_ref: &str) -> String {
        let fetch = match self {
            FetchStage::Depth(depth) => {
                format!("git fetch --depth {} origin {}", depth, quoted_ref)
            }
            FetchStage::Unshallow => {
                "(git fetch --unshallow origin || git fetch --unshallow || true)".to_string()
            }
        };
        format!("cd {} && {} && git checkout -q {}", PROJECT_DIR, fetch, quoted_ref)
    }
}

/// Clone `repo_url` into the project directory, replacing any stale copy.
///
/// Without a ref this issues exactly one shallow clone. With a ref, checkout
/// is attempted with depth 1, then depth 50, then a full unshallow; a stage
/// only runs if the previous one failed. Returns `"(cloned)"` or a one-line
/// failure diagnostic.
pub async fn clone_repo(ctx: &RunContext, repo_url: &str, git_ref: Option<&str>) -> ToolResult {
    let repo_url = repo_url.trim();
    let git_ref = git_ref.map(str::trim).filter(|r| !r.is_empty());

    if let Err(e) = validate_git_arg("repo url", repo_url) {
        return ToolResult::failure(format!("(rejected) {}", e));
    }
    if let Some(r) = git_ref {
        if let Err(e) = validate_git_arg("ref", r) {
            return ToolResult::failure(format!("(rejected) {}", e));
        }
    }

    let clone_cmd = format!(
        "rm -rf {dir} && git clone --depth 1 {url} {dir}",
        dir = PROJECT_DIR,
        url = shell_quote(repo_url)
    );
    let out = ctx.sandbox().exec(&clone_cmd).await;
    if !out.success() {
        tracing::warn!(repo = %repo_url, exit_code = out.exit_code, "Clone failed");
        return failed(&out);
    }

    let Some(git_ref) = git_ref else {
        return ToolResult::success("(cloned)");
    };

    let quoted_ref = shell_quote(git_ref);
    let mut last = out;
    for stage in FETCH_STAGES {
        last = ctx.sandbox().exec(&stage.command(&quoted_ref)).await;
        if last.success() {
            tracing::debug!(git_ref = %git_ref, ?stage, "Ref checked out");
            return ToolResult::success("(cloned)");
        }
        tracing::debug!(git_ref = %git_ref, ?stage, exit_code = last.exit_code, "Checkout stage failed, escalating");
    }

    tracing::warn!(repo = %repo_url, git_ref = %git_ref, "Could not check out ref");
    failed(&last)
}

fn failed(out: &SandboxOutput) -> ToolResult {
    ToolResult::partial(failure_line(out), format!("exit {}", out.exit_code))
}

#[derive(Debug, Deserialize)]
struct CloneParams {
    repo_url: String,
    #[serde(default, rename = "ref")]
    git_ref: Option<String>,
}

/// Tool wrapper around [`clone_repo`].
pub struct CloneTool;

#[async_trait]
impl Tool for CloneTool {
    fn name(&self) -> &str {
        CLONE_TOOL
    }

    fn description(&self) -> &str {
        "Clone a git repository into /workspace/project, optionally checking out a ref. Returns '(cloned)' or a one-line error."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "repo_url": {
                    "type": "string",
                    "description": "Repository URL to clone"
                },
                "ref": {
                    "type": "string",
                    "description": "Branch, tag or commit to check out; omit for the default branch"
                }
            },
            "required": ["repo_url"]
        })
    }

    async fn execute(&self, args: Value, ctx: &mut RunContext) -> Result<ToolResult, ToolError> {
        let params: CloneParams = parse_args(args)?;
        Ok(clone_repo(ctx, &params.repo_url, params.git_ref.as_deref()).await)
    }
}
