//! Token usage accounting for a model connection.
//!
//! [`InstrumentedModel`] wraps any [`ChatModel`] and implements the same
//! streaming contract. Every request it forwards asks for usage metadata, and
//! every fragment that flows back through [`UsageStream`] is merged into a
//! shared [`UsageAccumulator`].

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::{ready, Stream};
use pin_project_lite::pin_project;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::client::{ChatModel, ChatRequest, FragmentStream, StreamFragment};
use crate::error::LlmError;

/// Field names vendors use for prompt-side token counts.
const PROMPT_KEYS: &[&str] = &["prompt_tokens", "input_tokens", "prompt_token_count"];
/// Field names vendors use for completion-side token counts.
const COMPLETION_KEYS: &[&str] = &[
    "completion_tokens",
    "output_tokens",
    "completion_token_count",
];
/// Field names vendors use for the aggregate.
const TOTAL_KEYS: &[&str] = &["total_tokens", "total_token_count"];

/// Running token totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

impl UsageTotals {
    /// Extract the usage carried by one fragment.
    ///
    /// Returns `None` when the object contains none of the known fields. A
    /// missing (or zero) explicit total is replaced by prompt + completion.
    pub fn from_usage_value(value: &Value) -> Option<Self> {
        let prompt = first_count(value, PROMPT_KEYS);
        let completion = first_count(value, COMPLETION_KEYS);
        let total = first_count(value, TOTAL_KEYS);

        if prompt.is_none() && completion.is_none() && total.is_none() {
            return None;
        }

        let prompt = prompt.unwrap_or(0);
        let completion = completion.unwrap_or(0);
        let total = match total {
            Some(t) if t > 0 => t,
            _ => prompt.saturating_add(completion),
        };

        Some(Self {
            prompt,
            completion,
            total,
        })
    }

    fn add(&mut self, other: Self) {
        self.prompt = self.prompt.saturating_add(other.prompt);
        self.completion = self.completion.saturating_add(other.completion);
        self.total = self.total.saturating_add(other.total);
    }
}

fn first_count(value: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| value.get(*key).and_then(|v| v.as_u64()))
}

/// Shared, clonable accumulator owned by one model connection.
#[derive(Debug, Clone, Default)]
pub struct UsageAccumulator {
    totals: Arc<Mutex<UsageTotals>>,
}

impl UsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a raw provider usage object. Unrecognised objects are ignored.
    pub fn merge(&self, usage: &Value) {
        if let Some(delta) = UsageTotals::from_usage_value(usage) {
            let mut totals = self.totals.lock().unwrap_or_else(|e| e.into_inner());
            totals.add(delta);
        }
    }

    /// Snapshot of the totals so far.
    pub fn totals(&self) -> UsageTotals {
        *self.totals.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pin_project! {
    /// Fragment stream that records usage blocks as they pass through.
    pub struct UsageStream<S> {
        #[pin]
        inner: S,
        usage: UsageAccumulator,
    }
}

impl<S> UsageStream<S> {
    pub fn new(inner: S, usage: UsageAccumulator) -> Self {
        Self { inner, usage }
    }
}

impl<S> Stream for UsageStream<S>
where
    S: Stream<Item = Result<StreamFragment, LlmError>>,
{
    type Item = Result<StreamFragment, LlmError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let item = ready!(this.inner.poll_next(cx));
        if let Some(Ok(fragment)) = &item {
            if let Some(usage) = &fragment.usage {
                this.usage.merge(usage);
            }
        }
        Poll::Ready(item)
    }
}

/// A chat model wrapped with usage accounting.
pub struct InstrumentedModel {
    inner: Arc<dyn ChatModel>,
    usage: UsageAccumulator,
}

impl InstrumentedModel {
    pub fn new(inner: Arc<dyn ChatModel>) -> Self {
        Self {
            inner,
            usage: UsageAccumulator::new(),
        }
    }

    /// Totals accumulated over every stream opened through this wrapper.
    pub fn usage(&self) -> UsageTotals {
        self.usage.totals()
    }
}

#[async_trait]
impl ChatModel for InstrumentedModel {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn stream(&self, request: ChatRequest) -> Result<FragmentStream, LlmError> {
        let stream = self.inner.stream(request.with_usage()).await?;
        Ok(Box::pin(UsageStream::new(stream, self.usage.clone())))
    }
}
