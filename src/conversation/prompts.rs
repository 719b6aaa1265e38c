//! Prompts for the validation agents.

use crate::config::SweInstance;

/// System prompt for the single runner agent.
pub const RUNNER_SYSTEM_PROMPT: &str = "You are Runner, a tool-using assistant that validates Python repositories inside Docker. \
Call exactly one tool per reply. Do not write explanations, markup or tool call syntax as prose.";

/// System prompt for the planner (no tools).
pub const PLANNER_SYSTEM_PROMPT: &str = "You are Planner. You cannot call tools. \
Tell the team the next concrete step in one or two sentences. \
When a test run reports failures, suggest re-running with a narrower -k filter. Never propose code edits.";

/// System prompt for the executor (all tools).
pub const EXECUTOR_SYSTEM_PROMPT: &str = "You are Coder. You clone, install and test the repository using the tools. \
Call exactly one tool per reply and paste only tool output, never paraphrase it.";

/// System prompt for the verifier (test tool only).
pub const VERIFIER_SYSTEM_PROMPT: &str = "You are Tester. You may only run tests. \
After each test run, reply with the exact line the test tool returned and nothing else.";

/// Fallback tool-use instructions appended to the system prompt.
pub const TEXT_TOOL_PROTOCOL: &str = "To call a tool, reply with a single JSON object of the form \
{\"tool\": \"<name>\", \"arguments\": {...}}. Available tools:";

/// What a run validates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationTarget {
    pub instance_id: Option<String>,
    pub repo_url: String,
    pub git_ref: String,
    pub pytest_k: String,
}

impl ValidationTarget {
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            ..Default::default()
        }
    }

    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = git_ref.into();
        self
    }

    pub fn with_filter(mut self, pytest_k: impl Into<String>) -> Self {
        self.pytest_k = pytest_k.into();
        self
    }
}

impl From<&SweInstance> for ValidationTarget {
    fn from(instance: &SweInstance) -> Self {
        Self {
            instance_id: Some(instance.id.clone()),
            repo_url: instance.repo_url.clone(),
            git_ref: instance.git_ref.clone().unwrap_or_default(),
            pytest_k: instance.pytest_k.clone(),
        }
    }
}

fn clone_args(target: &ValidationTarget) -> String {
    if target.git_ref.is_empty() {
        format!("repo_url=\"{}\"", target.repo_url)
    } else {
        format!("repo_url=\"{}\", ref=\"{}\"", target.repo_url, target.git_ref)
    }
}

/// Task for the single runner: exactly three calls, then echo the tail.
pub fn one_agent_task(target: &ValidationTarget) -> String {
    let instance_hint = target
        .instance_id
        .as_ref()
        .map(|id| format!("Instance: {}\n", id))
        .unwrap_or_default();

    format!(
        "{instance_hint}Validate a Python repo in Docker. Execute EXACTLY these three tool calls, then STOP.\n\
Do NOT print tool call syntax, XML/angle-bracket markup, or explanations.\n\
\n\
1) swe_clone({clone})\n\
2) swe_install()\n\
3) swe_pytest(filter=\"{k}\")\n\
\n\
CRITICAL OUTPUT RULE:\n\
After step 3, print ONLY the exact string returned by swe_pytest (the last non-empty pytest output line). No extra words.\n",
        clone = clone_args(target),
        k = target.pytest_k,
    )
}

/// Task for the planner/executor/verifier team.
pub fn team_task(target: &ValidationTarget) -> String {
    let k_line = if target.pytest_k.is_empty() {
        "all tests".to_string()
    } else {
        format!("filter \"{}\"", target.pytest_k)
    };
    let git_ref = if target.git_ref.is_empty() {
        "(default branch, omit ref)"
    } else {
        target.git_ref.as_str()
    };

    format!(
        "You are a team validating a Python repo inside Docker.\n\
Tools (call them and paste ONLY tool output; do not paraphrase):\n\
- swe_clone(repo_url, ref) -> clones into /workspace/project\n\
- swe_install(req_file=\"requirements.txt\") -> installs deps if the file exists\n\
- swe_pytest(filter) -> runs pytest -q and returns ONLY the last non-empty output line\n\
\n\
Goal:\n\
1) Clone:\n   repo_url = {repo}\n   ref      = {git_ref}\n\
2) Install dependencies.\n\
3) Run tests with {k_line}.\n\
4) If tests fail, re-run with a narrower filter or briefly suggest next steps (do not edit code).\n\
After each test run, paste ONLY the exact line returned by swe_pytest (no extra words).\n",
        repo = target.repo_url,
    )
}

/// System prompt plus the text tool protocol when the agent has tools.
pub fn build_system_prompt(base: &str, tool_names: &[&str]) -> String {
    if tool_names.is_empty() {
        base.to_string()
    } else {
        format!("{}\n\n{} {}.", base, TEXT_TOOL_PROTOCOL, tool_names.join(", "))
    }
}
