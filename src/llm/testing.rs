//! Scripted chat model for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::client::{ChatModel, ChatRequest, FragmentStream, StreamFragment};
use crate::error::LlmError;

/// Replays canned fragment lists, one per `stream` call.
pub(crate) struct ScriptedModel {
    id: String,
    replies: Mutex<VecDeque<Result<Vec<StreamFragment>, String>>>,
    fallback: Option<Vec<StreamFragment>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            replies: Mutex::new(VecDeque::new()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn reply(self, fragments: Vec<StreamFragment>) -> Self {
        self.replies.lock().unwrap().push_back(Ok(fragments));
        self
    }

    pub(crate) fn reply_text(self, text: &str) -> Self {
        self.reply(vec![StreamFragment::text(text)])
    }

    pub(crate) fn failing(self, message: &str) -> Self {
        self.replies.lock().unwrap().push_back(Err(message.to_string()));
        self
    }

    /// Reply used once the queue is empty.
    pub(crate) fn repeat(mut self, fragments: Vec<StreamFragment>) -> Self {
        self.fallback = Some(fragments);
        self
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_id(&self) -> &str {
        &self.id
    }

    async fn stream(&self, request: ChatRequest) -> Result<FragmentStream, LlmError> {
        self.requests.lock().unwrap().push(request);
        let next = self.replies.lock().unwrap().pop_front();
        let fragments = match next {
            Some(Ok(fragments)) => fragments,
            Some(Err(message)) => return Err(LlmError::RequestFailed(message)),
            None => match &self.fallback {
                Some(fragments) => fragments.clone(),
                None => return Err(LlmError::RequestFailed("script exhausted".into())),
            },
        };
        Ok(Box::pin(futures::stream::iter(
            fragments.into_iter().map(Ok::<_, LlmError>),
        )))
    }
}
