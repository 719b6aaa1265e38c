//! Configuration for validation runs.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::conversation::{ONE_AGENT_MAX_TURNS, TEAM_MAX_TURNS};
use crate::recorder::DEFAULT_RESULTS_PATH;

/// Team label recorded for planner/executor/verifier runs.
pub const TEAM_LABEL: &str = "planner-coder-tester";

/// Which roster runs the validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    /// A single runner agent.
    One,
    /// Planner, executor and verifier in round-robin.
    Team,
}

impl AgentMode {
    /// Default turn cap for the mode.
    pub fn default_max_turns(&self) -> usize {
        match self {
            AgentMode::One => ONE_AGENT_MAX_TURNS,
            AgentMode::Team => TEAM_MAX_TURNS,
        }
    }

    /// Value of the outcome's `team` field; one-agent runs carry none.
    pub fn team_label(&self) -> Option<&'static str> {
        match self {
            AgentMode::One => None,
            AgentMode::Team => Some(TEAM_LABEL),
        }
    }
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentMode::One => write!(f, "one"),
            AgentMode::Team => write!(f, "team"),
        }
    }
}

impl FromStr for AgentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "one" => Ok(AgentMode::One),
            "team" => Ok(AgentMode::Team),
            other => Err(format!("unknown agent mode '{}' (expected one|team)", other)),
        }
    }
}

/// Settings for a [`ValidationRunner`](super::ValidationRunner).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Roster to run.
    pub mode: AgentMode,
    /// Turn cap override; `None` uses the mode default.
    pub max_turns: Option<usize>,
    /// Outcome log location.
    pub results_path: PathBuf,
    /// Offer tools through native function calling when the model supports it.
    pub native_tools: bool,
}

impl RunnerConfig {
    pub fn new(mode: AgentMode) -> Self {
        Self {
            mode,
            max_turns: None,
            results_path: PathBuf::from(DEFAULT_RESULTS_PATH),
            native_tools: true,
        }
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    pub fn with_results_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.results_path = path.into();
        self
    }

    /// Parse tool calls from reply text only.
    pub fn without_native_tools(mut self) -> Self {
        self.native_tools = false;
        self
    }

    /// Effective turn cap.
    pub fn turn_cap(&self) -> usize {
        self.max_turns.unwrap_or_else(|| self.mode.default_max_turns())
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new(AgentMode::One)
    }
}
