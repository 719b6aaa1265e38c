//! Turn-bounded agent conversations.
//!
//! A [`ConversationController`] runs one agent (the runner) or a fixed team
//! (planner, executor, verifier) in round-robin order over a shared
//! [`Transcript`]. A [`TerminationCondition`] decides when to stop.

pub mod agent;
pub mod controller;
pub mod parser;
pub mod prompts;
pub mod termination;
pub mod transcript;

pub use agent::{one_agent_roster, team_roster, Agent, AgentRole};
pub use controller::{build_messages, ConversationController, ConversationError, ConversationResult};
pub use parser::{JsonToolCallParser, ToolCallParser};
pub use prompts::{one_agent_task, team_task, ValidationTarget};
pub use termination::{
    StopReason, TerminationCondition, TerminationPredicate, ONE_AGENT_MAX_TURNS, TEAM_MAX_TURNS,
};
pub use transcript::{ConversationTurn, Transcript};
