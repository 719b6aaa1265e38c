//! Append-only conversation transcript.

use serde::{Deserialize, Serialize};

use crate::tools::{ToolCall, ToolResult};

/// Speaker id of turn 0.
pub const TASK_SPEAKER: &str = "user";

/// One agent step, or the task that opened the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: String,
    /// Text emitted by the model (may be empty when it only called a tool).
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
}

impl ConversationTurn {
    pub fn task(content: impl Into<String>) -> Self {
        Self::message(TASK_SPEAKER, content)
    }

    pub fn message(speaker: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            content: content.into(),
            tool_call: None,
            tool_result: None,
        }
    }

    pub fn tool(
        speaker: impl Into<String>,
        content: impl Into<String>,
        call: ToolCall,
        result: ToolResult,
    ) -> Self {
        Self {
            speaker: speaker.into(),
            content: content.into(),
            tool_call: Some(call),
            tool_result: Some(result),
        }
    }

    pub fn is_task(&self) -> bool {
        self.speaker == TASK_SPEAKER
    }

    /// Whether the content or the tool result contains `phrase`.
    pub fn mentions(&self, phrase: &str) -> bool {
        self.content.contains(phrase)
            || self
                .tool_result
                .as_ref()
                .is_some_and(|r| r.content().contains(phrase))
    }

    /// What other participants see of this turn.
    pub fn visible_text(&self) -> String {
        match &self.tool_result {
            Some(result) if self.content.trim().is_empty() => result.content().to_string(),
            Some(result) => format!("{}\n{}", self.content.trim_end(), result.content()),
            None => self.content.clone(),
        }
    }
}

/// Ordered turns; entries are never modified once pushed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<ConversationTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }
}
