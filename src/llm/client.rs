//! OpenAI-compatible streaming chat client.
//!
//! Requests are always sent with `stream: true`; the server-sent events are
//! decoded into [`StreamFragment`]s as they arrive. Consumers either drain the
//! stream themselves (the preflight probe) or fold it into a [`ChatReply`]
//! with [`collect_reply`].

use std::collections::BTreeMap;
use std::pin::Pin;
use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LlmError;

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (e.g., "system", "user", "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
    /// Optional speaker name, used to tell agents apart in group chats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
            name: None,
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            name: None,
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
            name: None,
        }
    }

    /// Attach a speaker name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Streaming options understood by OpenAI-compatible servers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamOptions {
    /// Ask the server to append a usage block to the stream.
    pub include_usage: bool,
}

/// Request for a streamed chat completion.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model identifier. Empty means "the client's default model".
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
    /// Function definitions for native tool calling.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    pub stream: bool,
}

impl ChatRequest {
    /// Create a new streamed request with default parameters.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            stream_options: None,
            tools: Vec::new(),
            stream: true,
        }
    }

    /// Set the temperature for this request.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the max tokens for this request.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Request usage metadata at the end of the stream.
    pub fn with_usage(mut self) -> Self {
        self.stream_options = Some(StreamOptions {
            include_usage: true,
        });
        self
    }

    /// Offer function definitions to the model.
    pub fn with_tools(mut self, tools: Vec<Value>) -> Self {
        self.tools = tools;
        self
    }

    /// Whether usage metadata was requested.
    pub fn wants_usage(&self) -> bool {
        self.stream_options
            .as_ref()
            .map(|o| o.include_usage)
            .unwrap_or(false)
    }
}

/// Partial native tool call carried by one stream fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallDelta {
    /// Position of the call within the assistant message.
    pub index: u32,
    pub name: Option<String>,
    /// Argument JSON text, possibly a slice of the full document.
    pub arguments: String,
}

/// One decoded server-sent event of a chat completion stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamFragment {
    /// Text delta (may be empty).
    pub content: String,
    pub tool_calls: Vec<ToolCallDelta>,
    pub finish_reason: Option<String>,
    /// Raw usage object as sent by the provider; field names vary by vendor.
    pub usage: Option<Value>,
}

impl StreamFragment {
    /// Fragment carrying only text.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Fragment carrying only a usage block.
    pub fn usage(usage: Value) -> Self {
        Self {
            usage: Some(usage),
            ..Default::default()
        }
    }
}

/// Boxed stream of decoded fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<StreamFragment, LlmError>> + Send>>;

/// Streaming chat contract shared by real clients and instrumented wrappers.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Identifier of the model this connection talks to.
    fn model_id(&self) -> &str;

    /// Open a streamed completion for the given request.
    async fn stream(&self, request: ChatRequest) -> Result<FragmentStream, LlmError>;
}

/// A complete native function call assembled from stream deltas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    /// Raw JSON argument text.
    pub arguments: String,
}

/// Assistant reply folded from a whole stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatReply {
    pub content: String,
    pub function_calls: Vec<FunctionCall>,
}

/// Drain a fragment stream into a single reply.
///
/// Fails with [`LlmError::EmptyStream`] when the server closed the stream
/// without sending a single fragment.
pub async fn collect_reply(mut stream: FragmentStream) -> Result<ChatReply, LlmError> {
    let mut content = String::new();
    let mut calls: BTreeMap<u32, FunctionCall> = BTreeMap::new();
    let mut received = 0usize;

    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        received += 1;
        content.push_str(&fragment.content);
        for delta in fragment.tool_calls {
            let call = calls.entry(delta.index).or_default();
            if let Some(name) = delta.name.filter(|n| !n.is_empty()) {
                call.name = name;
            }
            call.arguments.push_str(&delta.arguments);
        }
    }

    if received == 0 {
        return Err(LlmError::EmptyStream);
    }

    Ok(ChatReply {
        content,
        function_calls: calls
            .into_values()
            .filter(|call| !call.name.is_empty())
            .collect(),
    })
}

/// Client for OpenAI-compatible chat completion endpoints.
pub struct OpenAiChatClient {
    /// Base URL for the API (e.g., "https://llm.chutes.ai/v1").
    api_base: String,
    /// Optional API key for authentication.
    api_key: Option<String>,
    /// Model used when a request leaves `model` empty.
    model: String,
    /// Temperature applied when a request does not set one.
    temperature: Option<f64>,
    http_client: Client,
}

impl OpenAiChatClient {
    /// Create a new client bound to one model.
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self, LlmError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(600))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LlmError::RequestFailed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            temperature: None,
            http_client,
        })
    }

    /// Set the default sampling temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Get the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Check if an API key is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Error response from the API.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl ChatModel for OpenAiChatClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn stream(&self, mut request: ChatRequest) -> Result<FragmentStream, LlmError> {
        if request.model.is_empty() {
            request.model = self.model.clone();
        }
        if request.temperature.is_none() {
            request.temperature = self.temperature;
        }
        request.stream = true;

        let url = format!("{}/chat/completions", self.api_base);
        let mut http_request = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream");

        if let Some(ref api_key) = self.api_key {
            http_request = http_request.bearer_auth(api_key);
        }

        let http_response = http_request
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            let message = serde_json::from_str::<ApiErrorResponse>(&error_text)
                .map(|r| r.error.message)
                .unwrap_or(error_text);

            if status_code == 429 {
                return Err(LlmError::RateLimited(message));
            }
            return Err(LlmError::ApiError {
                code: status_code,
                message,
            });
        }

        let mut bytes = http_response.bytes_stream();
        let stream = try_stream! {
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| LlmError::RequestFailed(e.to_string()))?;
                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&raw);
                    if let Some(fragment) = parse_sse_line(&line)? {
                        yield fragment;
                    }
                }
            }
            if !buffer.is_empty() {
                let line = String::from_utf8_lossy(&buffer).to_string();
                if let Some(fragment) = parse_sse_line(&line)? {
                    yield fragment;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Decode one line of a server-sent event stream.
///
/// Non-data lines, keep-alive comments, the `[DONE]` marker and payloads that
/// are not JSON all decode to `None`.
pub fn parse_sse_line(line: &str) -> Result<Option<StreamFragment>, LlmError> {
    let line = line.trim();
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let payload = payload.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return Ok(None);
    }

    let Ok(value) = serde_json::from_str::<Value>(payload) else {
        return Ok(None);
    };

    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        let code = error
            .get("code")
            .and_then(|c| c.as_u64())
            .and_then(|c| u16::try_from(c).ok())
            .unwrap_or(500);
        return Err(LlmError::ApiError { code, message });
    }

    let mut fragment = StreamFragment {
        usage: value.get("usage").filter(|u| u.is_object()).cloned(),
        ..Default::default()
    };

    if let Some(choice) = value
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
    {
        let delta = choice.get("delta").or_else(|| choice.get("message"));
        if let Some(delta) = delta {
            if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
                fragment.content.push_str(text);
            }
            if let Some(calls) = delta.get("tool_calls").and_then(|v| v.as_array()) {
                for (position, call) in calls.iter().enumerate() {
                    let function = call.get("function");
                    fragment.tool_calls.push(ToolCallDelta {
                        index: call
                            .get("index")
                            .and_then(|v| v.as_u64())
                            .and_then(|v| u32::try_from(v).ok())
                            .unwrap_or(position as u32),
                        name: function
                            .and_then(|f| f.get("name"))
                            .and_then(|v| v.as_str())
                            .map(str::to_string),
                        arguments: function
                            .and_then(|f| f.get("arguments"))
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                    });
                }
            }
        }
        fragment.finish_reason = choice
            .get("finish_reason")
            .and_then(|v| v.as_str())
            .map(str::to_string);
    }

    Ok(Some(fragment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn boxed(items: Vec<Result<StreamFragment, LlmError>>) -> FragmentStream {
        Box::pin(futures::stream::iter(items))
    }

    #[test]
    fn test_message_constructors() {
        let system = Message::system("You are helpful.");
        assert_eq!(system.role, "system");
        assert_eq!(system.content, "You are helpful.");

        let user = Message::user("Hello").with_name("Runner");
        assert_eq!(user.role, "user");
        assert_eq!(user.name.as_deref(), Some("Runner"));

        let assistant = Message::assistant("Hi there!");
        assert_eq!(assistant.role, "assistant");
        assert!(assistant.name.is_none());
    }

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatRequest::new("openai/gpt-oss-20b", vec![Message::user("hi")])
            .with_max_tokens(4)
            .with_usage();

        let json = serde_json::to_value(&request).expect("serialization should succeed");
        assert_eq!(json["model"], "openai/gpt-oss-20b");
        assert_eq!(json["stream"], true);
        assert_eq!(json["max_tokens"], 4);
        assert_eq!(json["stream_options"]["include_usage"], true);
        assert!(json.get("temperature").is_none());
        assert!(json.get("tools").is_none());
        assert!(json["messages"][0].get("name").is_none());
        assert!(request.wants_usage());
    }

    #[test]
    fn test_parse_sse_text_delta() {
        let line = r#"data: {"choices":[{"index":0,"delta":{"content":"12 passed"}}]}"#;
        let fragment = parse_sse_line(line).unwrap().unwrap();
        assert_eq!(fragment.content, "12 passed");
        assert!(fragment.usage.is_none());
        assert!(fragment.finish_reason.is_none());
    }

    #[test]
    fn test_parse_sse_usage_block() {
        let line = r#"data: {"choices":[],"usage":{"prompt_tokens":7,"completion_tokens":3}}"#;
        let fragment = parse_sse_line(line).unwrap().unwrap();
        assert_eq!(fragment.usage, Some(json!({"prompt_tokens":7,"completion_tokens":3})));
    }

    #[test]
    fn test_parse_sse_null_usage_is_ignored() {
        let line = r#"data: {"choices":[{"delta":{"content":"x"}}],"usage":null}"#;
        let fragment = parse_sse_line(line).unwrap().unwrap();
        assert!(fragment.usage.is_none());
    }

    #[test]
    fn test_parse_sse_markers_and_noise() {
        assert!(parse_sse_line("data: [DONE]").unwrap().is_none());
        assert!(parse_sse_line(": keep-alive").unwrap().is_none());
        assert!(parse_sse_line("").unwrap().is_none());
        assert!(parse_sse_line("data: not json").unwrap().is_none());
    }

    #[test]
    fn test_parse_sse_error_payload() {
        let line = r#"data: {"error":{"message":"model is overloaded","code":503}}"#;
        let err = parse_sse_line(line).unwrap_err();
        match err {
            LlmError::ApiError { code, message } => {
                assert_eq!(code, 503);
                assert_eq!(message, "model is overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_sse_tool_call_delta() {
        let line = r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"swe_clone","arguments":"{\"repo_url\":"}}]}}]}"#;
        let fragment = parse_sse_line(line).unwrap().unwrap();
        assert_eq!(fragment.tool_calls.len(), 1);
        assert_eq!(fragment.tool_calls[0].index, 0);
        assert_eq!(fragment.tool_calls[0].name.as_deref(), Some("swe_clone"));
        assert_eq!(fragment.tool_calls[0].arguments, "{\"repo_url\":");
    }

    #[tokio::test]
    async fn test_collect_reply_joins_text_and_calls() {
        let stream = boxed(vec![
            Ok(StreamFragment::text("Cloning")),
            Ok(StreamFragment {
                tool_calls: vec![ToolCallDelta {
                    index: 0,
                    name: Some("swe_clone".into()),
                    arguments: "{\"repo_url\":".into(),
                }],
                ..Default::default()
            }),
            Ok(StreamFragment {
                tool_calls: vec![ToolCallDelta {
                    index: 0,
                    name: None,
                    arguments: "\"https://x\"}".into(),
                }],
                ..Default::default()
            }),
            Ok(StreamFragment::text("...")),
        ]);

        let reply = collect_reply(stream).await.unwrap();
        assert_eq!(reply.content, "Cloning...");
        assert_eq!(reply.function_calls.len(), 1);
        assert_eq!(reply.function_calls[0].name, "swe_clone");
        assert_eq!(reply.function_calls[0].arguments, "{\"repo_url\":\"https://x\"}");
    }

    #[tokio::test]
    async fn test_collect_reply_empty_stream() {
        let err = collect_reply(boxed(vec![])).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyStream));
    }

    #[tokio::test]
    async fn test_collect_reply_propagates_stream_error() {
        let stream = boxed(vec![
            Ok(StreamFragment::text("partial")),
            Err(LlmError::RequestFailed("connection reset".into())),
        ]);
        let err = collect_reply(stream).await.unwrap_err();
        assert!(matches!(err, LlmError::RequestFailed(_)));
    }

    #[test]
    fn test_client_new() {
        let client = OpenAiChatClient::new(
            "https://llm.chutes.ai/v1/",
            Some("cpk_test".to_string()),
            "openai/gpt-oss-20b",
        )
        .unwrap()
        .with_temperature(0.2);

        assert_eq!(client.api_base(), "https://llm.chutes.ai/v1");
        assert_eq!(client.model_id(), "openai/gpt-oss-20b");
        assert!(client.has_api_key());
    }

    #[tokio::test]
    async fn test_client_stream_connection_error() {
        let client = OpenAiChatClient::new("http://localhost:65535", None, "gpt-4").unwrap();
        let request = ChatRequest::new("", vec![Message::user("test")]);
        let result = client.stream(request).await;
        assert!(matches!(result, Err(LlmError::RequestFailed(_))));
    }
}
