//! LLM integration for swe-validate.
//!
//! This module provides the streaming chat client used by the validation
//! agents, the preflight model selector, and per-connection token accounting.
//!
//! # Model selection
//!
//! ```ignore
//! use swe_validate::llm::{default_candidates, ModelSelector, OpenAiProvider};
//! use std::sync::Arc;
//!
//! let provider = Arc::new(OpenAiProvider::new("https://llm.chutes.ai/v1", Some(key)));
//! let connection = ModelSelector::new(provider).select(&default_candidates()).await?;
//! println!("using {} ({} tokens so far)", connection.model_id(), connection.usage().total);
//! ```

pub mod client;
pub mod selector;
pub mod usage;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{
    collect_reply, parse_sse_line, ChatModel, ChatReply, ChatRequest, FragmentStream,
    FunctionCall, Message, OpenAiChatClient, StreamFragment, ToolCallDelta,
};
pub use selector::{
    candidates_from_ids, default_candidates, parse_model_list, ModelCandidate,
    ModelCapabilities, ModelConnection, ModelProvider, ModelSelector, OpenAiProvider,
    ProbeConfig, DEFAULT_MODEL_CANDIDATES, DEFAULT_TEMPERATURE,
};
pub use usage::{InstrumentedModel, UsageAccumulator, UsageStream, UsageTotals};
