//! Scripted chat model

use async_trait::async_trait;
use callscope_assist::{
    ChatModel, ChatRequest, ChatResponse, ChatRole, Choice, ChoiceMessage, LlmError,
};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// [`ChatModel`] returning canned replies and recording every request
#[derive(Debug, Default)]
pub struct ScriptedChatModel {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChatModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, text: &str) {
        self.replies.lock().push_back(Ok(text.to_string()));
    }

    pub fn fail(&self, err: LlmError) {
        self.replies.lock().push_back(Err(err));
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    /// System prompt of the most recent request
    pub fn last_system_prompt(&self) -> Option<String> {
        self.requests.lock().last().and_then(|r| {
            r.messages
                .iter()
                .find(|m| m.role == ChatRole::System)
                .map(|m| m.content.clone())
        })
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.requests.lock().push(request.clone());
        let next = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok("ok".to_string()));
        next.map(|text| ChatResponse {
            choices: vec![Choice {
                message: ChoiceMessage {
                    content: Some(text),
                },
            }],
        })
    }
}
