//! Model candidate selection with preflight probing.
//!
//! Candidates are tried in list order. Each one gets a tiny capped request;
//! the first model that answers without a transport fault is wrapped in usage
//! instrumentation and returned as the run's [`ModelConnection`].

use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::client::{ChatModel, ChatRequest, Message, OpenAiChatClient};
use super::usage::{InstrumentedModel, UsageTotals};
use crate::error::{LlmError, ValidateError};

/// Built-in candidate list, highest priority first.
pub const DEFAULT_MODEL_CANDIDATES: &[&str] = &[
    "moonshotai/Kimi-K2-Instruct-75k",
    "openai/gpt-oss-120b",
    "deepseek-ai/DeepSeek-V3-0324",
    "openai/gpt-oss-20b",
    "deepseek-ai/DeepSeek-R1-0528",
    "Qwen/Qwen2.5-VL-32B-Instruct",
    "deepseek-ai/DeepSeek-R1-0528-Qwen3-8B",
    "unsloth/gemma-3-12b-it",
    "chutesai/Devstral-Small-2505",
    "zai-org/GLM-4.5-Air",
    "Qwen/Qwen3-14B",
];

/// Sampling temperature used for every validation conversation.
pub const DEFAULT_TEMPERATURE: f64 = 0.2;

/// What a candidate model is able to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    pub vision: bool,
    pub function_calling: bool,
    pub json_output: bool,
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self {
            vision: false,
            function_calling: true,
            json_output: false,
        }
    }
}

/// One entry of the candidate list. Priority is its position in the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCandidate {
    pub id: String,
    pub capabilities: ModelCapabilities,
}

impl ModelCandidate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capabilities: ModelCapabilities::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: ModelCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// The built-in candidate list.
pub fn default_candidates() -> Vec<ModelCandidate> {
    candidates_from_ids(DEFAULT_MODEL_CANDIDATES.iter().copied())
}

/// Build candidates from identifiers, dropping blanks.
pub fn candidates_from_ids<I, S>(ids: I) -> Vec<ModelCandidate>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    ids.into_iter()
        .map(|id| id.as_ref().trim().to_string())
        .filter(|id| !id.is_empty())
        .map(ModelCandidate::new)
        .collect()
}

/// Parse a comma-separated model list (`"a, b,,c"` gives three candidates).
pub fn parse_model_list(csv: &str) -> Vec<ModelCandidate> {
    candidates_from_ids(csv.split(','))
}

/// Opens raw (uninstrumented) connections to candidate models.
pub trait ModelProvider: Send + Sync {
    fn connect(&self, candidate: &ModelCandidate) -> Result<Arc<dyn ChatModel>, LlmError>;
}

/// Provider for OpenAI-compatible endpoints such as Chutes.
pub struct OpenAiProvider {
    api_base: String,
    api_key: Option<String>,
    temperature: f64,
}

impl OpenAiProvider {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_key,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

impl ModelProvider for OpenAiProvider {
    fn connect(&self, candidate: &ModelCandidate) -> Result<Arc<dyn ChatModel>, LlmError> {
        let client = OpenAiChatClient::new(&self.api_base, self.api_key.clone(), &candidate.id)?
            .with_temperature(self.temperature);
        Ok(Arc::new(client))
    }
}

/// The single active model of a run, with its running token totals.
pub struct ModelConnection {
    candidate: ModelCandidate,
    model: Arc<InstrumentedModel>,
}

impl ModelConnection {
    pub fn new(candidate: ModelCandidate, model: Arc<dyn ChatModel>) -> Self {
        Self {
            candidate,
            model: Arc::new(InstrumentedModel::new(model)),
        }
    }

    pub fn candidate(&self) -> &ModelCandidate {
        &self.candidate
    }

    pub fn model_id(&self) -> &str {
        &self.candidate.id
    }

    /// Instrumented chat handle; every stream opened here is accounted.
    pub fn chat_model(&self) -> Arc<dyn ChatModel> {
        self.model.clone()
    }

    pub fn usage(&self) -> UsageTotals {
        self.model.usage()
    }
}

/// Shape of the reachability probe.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub prompt: String,
    pub max_tokens: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            prompt: "hi".to_string(),
            max_tokens: 4,
        }
    }
}

/// Picks the first responsive model from an ordered candidate list.
pub struct ModelSelector {
    provider: Arc<dyn ModelProvider>,
    probe: ProbeConfig,
}

impl ModelSelector {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            probe: ProbeConfig::default(),
        }
    }

    pub fn with_probe(mut self, probe: ProbeConfig) -> Self {
        self.probe = probe;
        self
    }

    /// Probe candidates in order and return the first responsive one.
    ///
    /// # Errors
    ///
    /// Returns [`ValidateError::ExhaustedCandidates`] when the list is empty
    /// or no candidate answers the probe. Individual probe failures are only
    /// logged.
    pub async fn select(
        &self,
        candidates: &[ModelCandidate],
    ) -> Result<ModelConnection, ValidateError> {
        for (priority, candidate) in candidates.iter().enumerate() {
            match self.probe(candidate).await {
                Ok(model) => {
                    info!(model = %candidate.id, priority, "preflight: using model");
                    return Ok(ModelConnection::new(candidate.clone(), model));
                }
                Err(e) => {
                    warn!(model = %candidate.id, priority, error = %e, "preflight: model not ready, trying next");
                }
            }
        }

        Err(ValidateError::ExhaustedCandidates {
            tried: candidates.len(),
        })
    }

    async fn probe(&self, candidate: &ModelCandidate) -> Result<Arc<dyn ChatModel>, LlmError> {
        let model = self.provider.connect(candidate)?;
        let request = ChatRequest::new(
            candidate.id.clone(),
            vec![Message::user(self.probe.prompt.clone())],
        )
        .with_max_tokens(self.probe.max_tokens)
        .with_usage();

        let mut stream = model.stream(request).await?;
        let mut received = 0usize;
        while let Some(fragment) = stream.next().await {
            fragment?;
            received += 1;
        }
        if received == 0 {
            return Err(LlmError::EmptyStream);
        }
        Ok(model)
    }
}
