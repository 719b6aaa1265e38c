//! Conversation participants.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::prompts::{
    build_system_prompt, EXECUTOR_SYSTEM_PROMPT, PLANNER_SYSTEM_PROMPT, RUNNER_SYSTEM_PROMPT,
    VERIFIER_SYSTEM_PROMPT,
};
use crate::tools::{ToolRegistry, CLONE_TOOL, INSTALL_TOOL, TEST_TOOL};

/// Fixed role of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Sole agent of a one-agent run; all tools.
    Runner,
    /// No tools.
    Planner,
    /// All tools.
    Executor,
    /// Test tool only.
    Verifier,
}

impl AgentRole {
    /// Speaker name used in the transcript.
    pub fn default_name(&self) -> &'static str {
        match self {
            AgentRole::Runner => "Runner",
            AgentRole::Planner => "Planner",
            AgentRole::Executor => "Coder",
            AgentRole::Verifier => "Tester",
        }
    }

    /// Tools this role may call.
    pub fn tool_names(&self) -> &'static [&'static str] {
        match self {
            AgentRole::Runner | AgentRole::Executor => &[CLONE_TOOL, INSTALL_TOOL, TEST_TOOL],
            AgentRole::Planner => &[],
            AgentRole::Verifier => &[TEST_TOOL],
        }
    }

    fn base_prompt(&self) -> &'static str {
        match self {
            AgentRole::Runner => RUNNER_SYSTEM_PROMPT,
            AgentRole::Planner => PLANNER_SYSTEM_PROMPT,
            AgentRole::Executor => EXECUTOR_SYSTEM_PROMPT,
            AgentRole::Verifier => VERIFIER_SYSTEM_PROMPT,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentRole::Runner => write!(f, "runner"),
            AgentRole::Planner => write!(f, "planner"),
            AgentRole::Executor => write!(f, "executor"),
            AgentRole::Verifier => write!(f, "verifier"),
        }
    }
}

/// A named participant with a system prompt and its own tool set.
#[derive(Clone)]
pub struct Agent {
    name: String,
    role: AgentRole,
    system_prompt: String,
    tools: ToolRegistry,
}

impl Agent {
    /// Agent for `role`, restricted to the role's tools from `registry`.
    pub fn for_role(role: AgentRole, registry: &ToolRegistry) -> Self {
        let tools = registry.subset(role.tool_names());
        let system_prompt = build_system_prompt(role.base_prompt(), &tools.list_tools());
        Self {
            name: role.default_name().to_string(),
            role,
            system_prompt,
            tools,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }
}

/// The single runner agent.
pub fn one_agent_roster(registry: &ToolRegistry) -> Vec<Agent> {
    vec![Agent::for_role(AgentRole::Runner, registry)]
}

/// Planner, executor and verifier, in speaking order.
pub fn team_roster(registry: &ToolRegistry) -> Vec<Agent> {
    [AgentRole::Planner, AgentRole::Executor, AgentRole::Verifier]
        .into_iter()
        .map(|role| Agent::for_role(role, registry))
        .collect()
}
