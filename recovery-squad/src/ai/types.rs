use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::tools::ToolResult;

/// Errors raised while talking to the model provider
#[derive(Debug, Error)]
pub enum AiError {
    #[error("Client configuration error: {0}")]
    Config(String),

    #[error("Model API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Model API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode model response: {0}")]
    Decode(String),

    #[error("Failed to load image attachment {path}: {source}")]
    Attachment {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Model API returned no choices")]
    EmptyResponse,

    #[error("Model still requested tools after {0} tool rounds")]
    ToolLoop(u32),
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Result of running a tool, keyed back to the call that asked for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResponse {
    pub fn from_result(tool_call_id: impl Into<String>, result: &ToolResult) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: result.content.clone(),
            is_error: !result.success,
        }
    }
}

/// One round of tool calls plus their results, replayed on the next request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolHistoryEntry {
    pub tool_calls: Vec<ToolCall>,
    pub tool_responses: Vec<ToolResponse>,
}

impl ToolHistoryEntry {
    pub fn new(tool_calls: Vec<ToolCall>, tool_responses: Vec<ToolResponse>) -> Self {
        Self {
            tool_calls,
            tool_responses,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AiResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl AiResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_use(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: String::new(),
            tool_calls,
        }
    }

    pub fn is_tool_use(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}
