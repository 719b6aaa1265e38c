//! swe-validate: validate Python repositories inside Docker with LLM agents.
//!
//! A run selects the first responsive model from a candidate list, lets one
//! agent (or a planner/executor/verifier team) clone, install and test a
//! repository through sandboxed tools, and appends one structured outcome to
//! a JSONL results log.

// Core modules
pub mod cli;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod recorder;
pub mod runner;
pub mod sandbox;
pub mod tools;

// Re-export commonly used error types
pub use error::{LlmError, SandboxError, ValidateError};
