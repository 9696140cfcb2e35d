//! Scripted [`ChatModel`] for tests

use crate::ai::{AiError, AiResponse, ChatModel, Message, MessageRole, ToolHistoryEntry};
use crate::tools::ToolDefinition;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// What a persona sent on one call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: String,
    pub prompt: String,
    pub image_count: usize,
    pub tool_names: Vec<String>,
    pub history_len: usize,
}

/// Replays queued replies in order, then falls back to echoing the prompt.
/// Optionally fails on a given call index.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<AiResponse, AiError>>>,
    calls: Mutex<Vec<RecordedCall>>,
    fail_on_call: Option<usize>,
}

impl ScriptedModel {
    pub fn echo() -> Self {
        Self::with_replies(Vec::new())
    }

    pub fn with_replies(replies: Vec<Result<AiResponse, AiError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
            fail_on_call: None,
        }
    }

    /// Echo model whose `index`-th call (0-based) fails with an API error
    pub fn failing_on(index: usize) -> Self {
        Self {
            fail_on_call: Some(index),
            ..Self::echo()
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn generate_with_tools(
        &self,
        messages: Vec<Message>,
        tool_history: Vec<ToolHistoryEntry>,
        tools: Vec<ToolDefinition>,
    ) -> Result<AiResponse, AiError> {
        let system = messages
            .iter()
            .find(|m| m.role == MessageRole::System)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let user = messages.iter().find(|m| m.role == MessageRole::User);
        let prompt = user.map(|m| m.content.clone()).unwrap_or_default();

        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(RecordedCall {
                system,
                prompt: prompt.clone(),
                image_count: user.map(|m| m.images.len()).unwrap_or(0),
                tool_names: tools.iter().map(|t| t.name.clone()).collect(),
                history_len: tool_history.len(),
            });
            calls.len() - 1
        };

        if self.fail_on_call == Some(index) {
            return Err(AiError::Api {
                status: 500,
                message: "upstream exploded".to_string(),
            });
        }

        match self.replies.lock().unwrap().pop_front() {
            Some(reply) => reply,
            None => Ok(AiResponse::text(format!("reply to: {}", prompt))),
        }
    }
}
