//! Round-robin turn loop.
//!
//! Each turn the active agent sees the transcript, the model answers once,
//! and at most one tool call from that answer is executed. After every turn
//! the termination condition is evaluated; the turn cap bounds the loop no
//! matter what the model or the tools do.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use super::agent::Agent;
use super::parser::{JsonToolCallParser, ToolCallParser};
use super::termination::{StopReason, TerminationCondition};
use super::transcript::{ConversationTurn, Transcript};
use crate::error::LlmError;
use crate::llm::{collect_reply, ChatModel, ChatReply, ChatRequest, Message};
use crate::tools::{RunContext, ToolCall};

/// Errors that prevent a conversation from starting.
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("Conversation needs at least one agent")]
    NoAgents,

    #[error("Termination condition has no turn cap")]
    Unbounded,
}

/// Outcome of a finished conversation.
#[derive(Debug, Clone)]
pub struct ConversationResult {
    pub transcript: Transcript,
    pub stop_reason: StopReason,
}

impl ConversationResult {
    /// Message count, task included.
    pub fn messages(&self) -> usize {
        self.transcript.len()
    }
}

/// Drives agents in fixed order until a termination predicate fires.
pub struct ConversationController {
    agents: Vec<Agent>,
    termination: TerminationCondition,
    model: Arc<dyn ChatModel>,
    native_tools: bool,
    parser: Box<dyn ToolCallParser>,
}

impl ConversationController {
    /// Create a controller.
    ///
    /// # Errors
    ///
    /// Fails when `agents` is empty or `termination` has no turn cap.
    pub fn new(
        agents: Vec<Agent>,
        termination: TerminationCondition,
        model: Arc<dyn ChatModel>,
    ) -> Result<Self, ConversationError> {
        if agents.is_empty() {
            return Err(ConversationError::NoAgents);
        }
        if termination.turn_cap().is_none() {
            return Err(ConversationError::Unbounded);
        }
        Ok(Self {
            agents,
            termination,
            model,
            native_tools: true,
            parser: Box::new(JsonToolCallParser),
        })
    }

    /// Offer tools through native function calling (default on).
    pub fn with_native_tools(mut self, enabled: bool) -> Self {
        self.native_tools = enabled;
        self
    }

    /// Set a custom tool call parser.
    pub fn with_parser(mut self, parser: Box<dyn ToolCallParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Run the conversation for `task`.
    ///
    /// Model failures end the conversation with [`StopReason::ModelError`];
    /// tool failures are ordinary turn content.
    pub async fn run(&self, task: &str, ctx: &mut RunContext) -> ConversationResult {
        let mut transcript = Transcript::new();
        transcript.push(ConversationTurn::task(task));

        if let Some(stop_reason) = self.termination.check_cap(&transcript) {
            return ConversationResult {
                transcript,
                stop_reason,
            };
        }

        let mut turn_index = 0usize;
        let stop_reason = loop {
            let agent = &self.agents[turn_index % self.agents.len()];
            turn_index += 1;

            match self.step(agent, &transcript, ctx).await {
                Ok(turn) => transcript.push(turn),
                Err(e) => {
                    tracing::warn!(agent = %agent.name(), error = %e, "Model call failed, ending conversation");
                    break StopReason::ModelError(e.to_string());
                }
            }

            if let Some(reason) = self.termination.check(&transcript) {
                break reason;
            }
        };

        tracing::info!(turns = transcript.len(), stop_reason = %stop_reason, "Conversation finished");
        ConversationResult {
            transcript,
            stop_reason,
        }
    }

    async fn step(
        &self,
        agent: &Agent,
        transcript: &Transcript,
        ctx: &mut RunContext,
    ) -> Result<ConversationTurn, LlmError> {
        let mut request = ChatRequest::new(self.model.model_id(), build_messages(agent, transcript));
        if self.native_tools && !agent.tools().is_empty() {
            request = request.with_tools(agent.tools().to_json_schema());
        }

        let stream = self.model.stream(request).await?;
        let reply = collect_reply(stream).await?;

        let Some(call) = self.extract_call(agent, &reply) else {
            tracing::debug!(agent = %agent.name(), chars = reply.content.len(), "Agent replied without a tool call");
            return Ok(ConversationTurn::message(agent.name(), reply.content));
        };

        tracing::info!(agent = %agent.name(), tool = %call.name, "Agent called tool");
        let result = agent.tools().execute(&call, ctx).await;
        Ok(ConversationTurn::tool(agent.name(), reply.content, call, result))
    }

    /// First native call, else the first call found in the text.
    fn extract_call(&self, agent: &Agent, reply: &ChatReply) -> Option<ToolCall> {
        if let Some(native) = reply.function_calls.first() {
            if reply.function_calls.len() > 1 {
                tracing::debug!(
                    agent = %agent.name(),
                    ignored = reply.function_calls.len() - 1,
                    "Only the first tool call is honored"
                );
            }
            let arguments = if native.arguments.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&native.arguments)
                    .unwrap_or_else(|_| Value::String(native.arguments.clone()))
            };
            return Some(ToolCall::new(native.name.clone(), arguments));
        }

        if agent.tools().is_empty() {
            return None;
        }
        self.parser.parse(&reply.content, &agent.tools().list_tools())
    }
}

/// Messages as seen by `agent`: its own turns are assistant messages, tool
/// results and everyone else's turns are named user messages.
pub fn build_messages(agent: &Agent, transcript: &Transcript) -> Vec<Message> {
    let mut messages = vec![Message::system(agent.system_prompt())];

    for turn in transcript.iter() {
        if turn.is_task() {
            messages.push(Message::user(&turn.content).with_name(&turn.speaker));
            continue;
        }

        if turn.speaker == agent.name() {
            let content = match (&turn.tool_call, turn.content.trim().is_empty()) {
                (Some(call), true) => serde_json::json!({
                    "tool": call.name,
                    "arguments": call.arguments,
                })
                .to_string(),
                _ => turn.content.clone(),
            };
            messages.push(Message::assistant(content).with_name(&turn.speaker));
            if let (Some(call), Some(result)) = (&turn.tool_call, &turn.tool_result) {
                messages.push(
                    Message::user(format!("[{} result] {}", call.name, result.content()))
                        .with_name("tool"),
                );
            }
        } else {
            messages.push(Message::user(turn.visible_text()).with_name(&turn.speaker));
        }
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::agent::{one_agent_roster, team_roster};
    use crate::conversation::termination::TerminationPredicate;
    use crate::llm::testing::ScriptedModel;
    use crate::llm::{StreamFragment, ToolCallDelta};
    use crate::sandbox::testing::RecordingExecutor;
    use crate::tools::ToolRegistry;

    fn native_call(name: &str, arguments: &str) -> Vec<StreamFragment> {
        vec![StreamFragment {
            tool_calls: vec![ToolCallDelta {
                index: 0,
                name: Some(name.to_string()),
                arguments: arguments.to_string(),
            }],
            ..Default::default()
        }]
    }

    fn pytest_sandbox(tail: &str) -> Arc<RecordingExecutor> {
        Arc::new(RecordingExecutor::new().on("pytest -q", 0, tail, ""))
    }

    #[tokio::test]
    async fn test_halts_at_cap_without_mentions() {
        let model = Arc::new(ScriptedModel::new("m").repeat(vec![StreamFragment::text("thinking")]));
        let controller = ConversationController::new(
            one_agent_roster(&ToolRegistry::with_validation_tools()),
            TerminationCondition::one_agent(4),
            model.clone(),
        )
        .unwrap();
        let mut ctx = RunContext::new(Arc::new(RecordingExecutor::new()));

        let result = controller.run("task", &mut ctx).await;
        assert_eq!(result.stop_reason, StopReason::MaxTurns(4));
        assert_eq!(result.messages(), 4);
        assert_eq!(model.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_cap_of_one_makes_no_model_calls() {
        let model = Arc::new(ScriptedModel::new("m"));
        let controller = ConversationController::new(
            one_agent_roster(&ToolRegistry::with_validation_tools()),
            TerminationCondition::one_agent(1),
            model.clone(),
        )
        .unwrap();
        let mut ctx = RunContext::new(Arc::new(RecordingExecutor::new()));

        let result = controller.run("task", &mut ctx).await;
        assert_eq!(result.stop_reason, StopReason::MaxTurns(1));
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn test_one_agent_happy_path_stops_on_test_tail() {
        let model = Arc::new(
            ScriptedModel::new("m")
                .reply(native_call("swe_clone", r#"{"repo_url":"https://x/r"}"#))
                .reply(native_call("swe_install", ""))
                .reply(native_call("swe_pytest", r#"{"filter":"collection"}"#)),
        );
        let sandbox = pytest_sandbox("12 passed in 0.34s\n");
        let controller = ConversationController::new(
            one_agent_roster(&ToolRegistry::with_validation_tools()),
            TerminationCondition::one_agent(10),
            model.clone(),
        )
        .unwrap();
        let mut ctx = RunContext::new(sandbox.clone());

        let result = controller.run("task", &mut ctx).await;
        assert_eq!(
            result.stop_reason,
            StopReason::TextMention {
                phrase: " passed in ".into(),
                speaker: "Runner".into()
            }
        );
        assert_eq!(result.messages(), 4);
        assert_eq!(ctx.last_test_tail(), Some("12 passed in 0.34s"));
        assert_eq!(sandbox.commands().len(), 3);

        let requests = model.requests();
        assert_eq!(requests[0].tools.len(), 3);
        // Second request carries the clone result back to the model.
        assert!(requests[1]
            .messages
            .iter()
            .any(|m| m.content == "[swe_clone result] (cloned)"));
    }

    #[tokio::test]
    async fn test_text_tool_calls_without_native_tools() {
        let model = Arc::new(
            ScriptedModel::new("m")
                .reply_text(r#"{"tool": "swe_pytest", "arguments": {"filter": "x"}}"#),
        );
        let controller = ConversationController::new(
            one_agent_roster(&ToolRegistry::with_validation_tools()),
            TerminationCondition::one_agent(4),
            model.clone(),
        )
        .unwrap()
        .with_native_tools(false);
        let mut ctx = RunContext::new(pytest_sandbox("1 failed, 2 passed in 1.2s"));

        let result = controller.run("task", &mut ctx).await;
        assert!(matches!(result.stop_reason, StopReason::TextMention { .. }));
        assert!(model.requests()[0].tools.is_empty());
        let turn = result.transcript.last().unwrap();
        assert_eq!(turn.tool_call.as_ref().map(|c| c.name.as_str()), Some("swe_pytest"));
    }

    #[tokio::test]
    async fn test_model_error_ends_conversation() {
        let model = Arc::new(
            ScriptedModel::new("m")
                .reply(native_call("swe_clone", r#"{"repo_url":"https://x/r"}"#))
                .failing("connection reset"),
        );
        let controller = ConversationController::new(
            one_agent_roster(&ToolRegistry::with_validation_tools()),
            TerminationCondition::one_agent(10),
            model,
        )
        .unwrap();
        let mut ctx = RunContext::new(Arc::new(RecordingExecutor::new()));

        let result = controller.run("task", &mut ctx).await;
        assert!(matches!(result.stop_reason, StopReason::ModelError(ref e) if e.contains("connection reset")));
        assert_eq!(result.messages(), 2);
    }

    #[tokio::test]
    async fn test_team_round_robin_and_tool_restrictions() {
        let model = Arc::new(
            ScriptedModel::new("m")
                // Planner: text only, its JSON is not executed.
                .reply_text(r#"Coder should run {"tool": "swe_clone", "arguments": {"repo_url": "x"}}"#)
                // Coder
                .reply(native_call("swe_clone", r#"{"repo_url":"https://x/r"}"#))
                // Tester tries a tool it does not have.
                .reply(native_call("swe_install", "{}"))
                // Planner
                .reply_text("Now run the tests.")
                // Coder
                .reply(native_call("swe_pytest", "{}")),
        );
        let sandbox = pytest_sandbox("5 passed in 3.00s");
        let controller = ConversationController::new(
            team_roster(&ToolRegistry::with_validation_tools()),
            TerminationCondition::team(10),
            model.clone(),
        )
        .unwrap();
        let mut ctx = RunContext::new(sandbox.clone());

        let result = controller.run("team task", &mut ctx).await;
        let speakers: Vec<_> = result.transcript.iter().map(|t| t.speaker.as_str()).collect();
        assert_eq!(speakers, vec!["user", "Planner", "Coder", "Tester", "Planner", "Coder"]);

        // Planner got no tool definitions.
        assert!(model.requests()[0].tools.is_empty());
        assert_eq!(model.requests()[2].tools.len(), 1);

        let tester_turn = &result.transcript.turns()[3];
        assert!(tester_turn
            .tool_result
            .as_ref()
            .is_some_and(|r| !r.success && r.content().contains("Tool not available")));

        // Only the Coder's clone and pytest reached the sandbox.
        assert_eq!(sandbox.commands().len(), 2);
        assert!(matches!(result.stop_reason, StopReason::TextMention { ref speaker, .. } if speaker == "Coder"));
    }

    #[tokio::test]
    async fn test_team_failure_does_not_stop_before_cap() {
        let model = Arc::new(ScriptedModel::new("m").repeat(native_call("swe_pytest", "{}")));
        let controller = ConversationController::new(
            team_roster(&ToolRegistry::with_validation_tools()),
            TerminationCondition::team(6),
            model,
        )
        .unwrap();
        let mut ctx = RunContext::new(pytest_sandbox("2 failed in 1.00s"));

        let result = controller.run("team task", &mut ctx).await;
        assert_eq!(result.stop_reason, StopReason::MaxTurns(6));
        assert_eq!(ctx.last_test_tail(), Some("2 failed in 1.00s"));
    }

    #[test]
    fn test_rejects_unbounded_or_empty() {
        let model: Arc<dyn ChatModel> = Arc::new(ScriptedModel::new("m"));
        let agents = one_agent_roster(&ToolRegistry::with_validation_tools());

        let unbounded = TerminationCondition::new()
            .or(TerminationPredicate::mention(" passed"))
            .or(TerminationPredicate::mention(" failed"));
        assert!(matches!(
            ConversationController::new(agents, unbounded, model.clone()),
            Err(ConversationError::Unbounded)
        ));
        assert!(matches!(
            ConversationController::new(vec![], TerminationCondition::one_agent(4), model),
            Err(ConversationError::NoAgents)
        ));
    }

    #[test]
    fn test_build_messages_roles() {
        let registry = ToolRegistry::with_validation_tools();
        let team = team_roster(&registry);
        let mut transcript = Transcript::new();
        transcript.push(ConversationTurn::task("go"));
        transcript.push(ConversationTurn::message("Planner", "clone first"));
        transcript.push(ConversationTurn::tool(
            "Coder",
            "",
            ToolCall::new("swe_clone", serde_json::json!({"repo_url": "x"})),
            crate::tools::ToolResult::success("(cloned)"),
        ));

        let coder_view = build_messages(&team[1], &transcript);
        assert_eq!(coder_view[0].role, "system");
        assert_eq!(coder_view[1].role, "user");
        assert_eq!(coder_view[2].role, "user");
        assert_eq!(coder_view[2].name.as_deref(), Some("Planner"));
        assert_eq!(coder_view[3].role, "assistant");
        assert!(coder_view[3].content.contains("swe_clone"));
        assert_eq!(coder_view[4].content, "[swe_clone result] (cloned)");

        let planner_view = build_messages(&team[0], &transcript);
        assert_eq!(planner_view.len(), 4);
        assert_eq!(planner_view[2].role, "assistant");
        assert_eq!(planner_view[3].role, "user");
        assert_eq!(planner_view[3].content, "(cloned)");
    }
}
