pub mod openrouter;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use openrouter::OpenRouterClient;
pub use types::{AiError, AiResponse, ToolCall, ToolHistoryEntry, ToolResponse};

use crate::staging::StagedImage;
use crate::tools::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
        }
    }
}

/// A chat message. Images are only meaningful on user messages and are sent
/// as additional content parts after the text.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub images: Vec<StagedImage>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn user_with_images(content: impl Into<String>, images: Vec<StagedImage>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            images,
        }
    }
}

/// The seam between personas and whatever serves completions.
///
/// Production uses [`OpenRouterClient`]; tests script replies.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_id(&self) -> &str;

    async fn generate_with_tools(
        &self,
        messages: Vec<Message>,
        tool_history: Vec<ToolHistoryEntry>,
        tools: Vec<ToolDefinition>,
    ) -> Result<AiResponse, AiError>;
}
