//! Tool definitions and registry for the validation agents.
//!
//! The three domain operations (clone, install, run tests) are exposed to the
//! model as tools. Each one composes a shell command from quoted arguments,
//! runs it through the run's [`SandboxExecutor`] and condenses the outcome to a
//! single diagnostic line so that conversation context stays small.

pub mod clone;
pub mod install;

pub use clone::{clone_repo, CloneTool};
pub use install::{install_requirements, InstallTool, DEFAULT_REQUIREMENTS_FILE};
pub use run_tests::{run_tests, RunTestsTool, NO_TESTS_RAN};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::sandbox::{SandboxExecutor, SandboxOutput};

/// Name of the clone tool.
pub const CLONE_TOOL: &str = "swe_clone";
/// Name of the install tool.
pub const INSTALL_TOOL: &str = "swe_install";
/// Name of the test tool.
pub const TEST_TOOL: &str = "swe_pytest";

/// Directory (relative to the sandbox mount) the repository is cloned into.
pub const PROJECT_DIR: &str = "project";

/// Upper bound for each output stream inside a failure diagnostic.
const MAX_DIAGNOSTIC_STREAM: usize = 300;

/// Errors that can occur during tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Invalid parameters provided to the tool.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Tool is not registered for this agent.
    #[error("Tool not available: {0}")]
    NotAvailable(String),
}

/// Result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the underlying command exited successfully.
    pub success: bool,
    /// One-line diagnostic returned to the model.
    pub output: String,
    /// Error message if execution failed.
    pub error: Option<String>,
}

impl ToolResult {
    /// Create a successful tool result.
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    /// Create a failed tool result.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }

    /// Create a result with both output and error (command ran but failed).
    pub fn partial(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            error: Some(error.into()),
        }
    }

    /// Text injected into the conversation after the call.
    pub fn content(&self) -> &str {
        if self.output.is_empty() {
            self.error.as_deref().unwrap_or("")
        } else {
            &self.output
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Run-scoped state threaded through the tools and read by the recorder.
pub struct RunContext {
    sandbox: Arc<dyn SandboxExecutor>,
    last_test_tail: Option<String>,
}

impl RunContext {
    pub fn new(sandbox: Arc<dyn SandboxExecutor>) -> Self {
        Self {
            sandbox,
            last_test_tail: None,
        }
    }

    pub fn sandbox(&self) -> &dyn SandboxExecutor {
        self.sandbox.as_ref()
    }

    /// Tail line of the most recent test run that produced output.
    pub fn last_test_tail(&self) -> Option<&str> {
        self.last_test_tail.as_deref()
    }

    /// Store a test tail. Blank tails are ignored.
    pub fn record_test_tail(&mut self, tail: &str) {
        let tail = tail.trim();
        if !tail.is_empty() {
            self.last_test_tail = Some(tail.to_string());
        }
    }
}

/// Trait for tools that can be executed by the agent.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the unique name of the tool.
    fn name(&self) -> &str;

    /// Returns a description of what the tool does.
    fn description(&self) -> &str;

    /// Returns the JSON schema for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments against the run context.
    async fn execute(&self, args: Value, ctx: &mut RunContext) -> Result<ToolResult, ToolError>;
}

/// Registry for managing available tools.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with clone, install and test tools.
    pub fn with_validation_tools() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CloneTool));
        registry.register(Arc::new(InstallTool));
        registry.register(Arc::new(RunTestsTool));
        registry
    }

    /// Register a new tool in the registry.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Registry holding only the named tools that exist here.
    pub fn subset(&self, names: &[&str]) -> Self {
        Self {
            tools: self
                .tools
                .iter()
                .filter(|(name, _)| names.contains(&name.as_str()))
                .map(|(name, tool)| (name.clone(), tool.clone()))
                .collect(),
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List all registered tool names, sorted.
    pub fn list_tools(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Function definitions for native tool calling.
    pub fn to_json_schema(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|tool| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": tool.name(),
                        "description": tool.description(),
                        "parameters": tool.parameters_schema()
                    }
                })
            })
            .collect()
    }

    /// Run a call, turning every error into a failure result.
    pub async fn execute(&self, call: &ToolCall, ctx: &mut RunContext) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            let err = ToolError::NotAvailable(format!(
                "{} (available: {})",
                call.name,
                self.list_tools().join(", ")
            ));
            tracing::warn!(tool = %call.name, "Model requested an unavailable tool");
            return ToolResult::failure(err.to_string());
        };

        match tool.execute(call.arguments.clone(), ctx).await {
            Ok(result) => {
                tracing::info!(tool = %call.name, success = result.success, output = %result.content(), "Tool finished");
                result
            }
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "Tool rejected call");
                ToolResult::failure(e.to_string())
            }
        }
    }
}

/// Decode tool arguments, treating `null` as an empty object.
pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidParameters(e.to_string()))
}

/// One-line failure summary: `(exit N) stdout: ... stderr: ...`.
pub fn failure_line(out: &SandboxOutput) -> String {
    format!(
        "(exit {}) stdout: {} stderr: {}",
        out.exit_code,
        flatten_tail(&out.stdout, MAX_DIAGNOSTIC_STREAM),
        flatten_tail(&out.stderr, MAX_DIAGNOSTIC_STREAM)
    )
}

/// Collapse whitespace and keep at most the last `max` bytes.
fn flatten_tail(s: &str, max: usize) -> String {
    let flat = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.len() <= max {
        return flat;
    }
    let mut start = flat.len() - max;
    while !flat.is_char_boundary(start) && start < flat.len() {
        start += 1;
    }
    format!("...{}", &flat[start..])
}
