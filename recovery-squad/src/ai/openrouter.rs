use crate::ai::types::{AiError, AiResponse, ToolCall, ToolHistoryEntry};
use crate::ai::{ChatModel, Message};
use crate::tools::ToolDefinition;
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "mistralai/devstral-2512:free";

/// OpenAI-compatible chat completions client pointed at OpenRouter
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ApiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<ApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

/// Plain string content, or text + image parts for multimodal user turns
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Clone, Serialize)]
struct ApiTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: ApiFunction,
}

#[derive(Debug, Clone, Serialize)]
struct ApiFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type", default = "default_call_type")]
    call_type: String,
    function: ApiFunctionCall,
}

fn default_call_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct ApiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl OpenRouterClient {
    pub fn new(
        api_key: &str,
        endpoint: Option<&str>,
        model: Option<&str>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, AiError> {
        let endpoint_url = endpoint
            .filter(|e| !e.is_empty())
            .unwrap_or(DEFAULT_ENDPOINT)
            .to_string();

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|e| AiError::Config(format!("Invalid API key format: {}", e)))?;
        headers.insert(header::AUTHORIZATION, auth_value);
        // OpenRouter attribution headers
        headers.insert(
            header::HeaderName::from_static("x-title"),
            header::HeaderValue::from_static("Recovery Squad"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| AiError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let model_name = match model {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => DEFAULT_MODEL.to_string(),
        };

        Ok(Self {
            client,
            endpoint: endpoint_url,
            model: model_name,
            max_tokens,
        })
    }

    async fn build_request(
        &self,
        messages: Vec<Message>,
        tool_history: Vec<ToolHistoryEntry>,
        tools: &[ToolDefinition],
    ) -> Result<CompletionRequest, AiError> {
        let mut api_messages = Vec::with_capacity(messages.len());
        for message in messages {
            api_messages.push(to_api_message(message).await?);
        }
        for entry in &tool_history {
            api_messages.extend(build_tool_result_messages(entry));
        }

        let api_tools: Option<Vec<ApiTool>> = if tools.is_empty() {
            None
        } else {
            Some(tools.iter().map(to_api_tool).collect())
        };

        Ok(CompletionRequest {
            model: self.model.clone(),
            messages: api_messages,
            max_tokens: self.max_tokens,
            tool_choice: api_tools.as_ref().map(|_| "auto".to_string()),
            tools: api_tools,
        })
    }
}

#[async_trait]
impl ChatModel for OpenRouterClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate_with_tools(
        &self,
        messages: Vec<Message>,
        tool_history: Vec<ToolHistoryEntry>,
        tools: Vec<ToolDefinition>,
    ) -> Result<AiResponse, AiError> {
        let image_count: usize = messages.iter().map(|m| m.images.len()).sum();
        let request = self.build_request(messages, tool_history, &tools).await?;

        // Full request bodies carry base64 images, so only counts are logged
        log::info!(
            "[OPENROUTER] Sending request to {} with model {}, {} messages, {} images, {} tools",
            self.endpoint,
            self.model,
            request.messages.len(),
            image_count,
            tools.len()
        );

        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ErrorResponse>(&error_text) {
                Ok(error_response) => error_response.error.message,
                Err(_) => error_text,
            };
            return Err(AiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let response_text = response.text().await?;
        log::debug!("[OPENROUTER] Raw response:\n{}", response_text);

        parse_completion(&response_text)
    }
}

async fn to_api_message(message: Message) -> Result<ApiMessage, AiError> {
    let content = if message.images.is_empty() {
        ApiContent::Text(message.content)
    } else {
        let mut parts = Vec::with_capacity(message.images.len() + 1);
        parts.push(ContentPart::Text {
            text: message.content,
        });
        for image in &message.images {
            let url = image.to_data_url().await.map_err(|source| AiError::Attachment {
                path: image.path().display().to_string(),
                source,
            })?;
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl { url },
            });
        }
        ApiContent::Parts(parts)
    };

    Ok(ApiMessage {
        role: message.role.as_str().to_string(),
        content: Some(content),
        tool_calls: None,
        tool_call_id: None,
    })
}

fn to_api_tool(tool: &ToolDefinition) -> ApiTool {
    let properties = tool
        .input_schema
        .properties
        .iter()
        .map(|(name, prop)| {
            let mut schema = json!({
                "type": prop.schema_type,
                "description": prop.description,
            });
            if let Some(default) = &prop.default {
                schema["default"] = default.clone();
            }
            (name.clone(), schema)
        })
        .collect::<serde_json::Map<String, Value>>();

    ApiTool {
        tool_type: "function".to_string(),
        function: ApiFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: json!({
                "type": tool.input_schema.schema_type,
                "properties": properties,
                "required": tool.input_schema.required,
            }),
        },
    }
}

/// Assistant turn carrying the tool calls, followed by one `tool` message per result
fn build_tool_result_messages(entry: &ToolHistoryEntry) -> Vec<ApiMessage> {
    let mut messages = Vec::with_capacity(entry.tool_responses.len() + 1);

    let tool_calls = entry
        .tool_calls
        .iter()
        .map(|tc| ApiToolCall {
            id: tc.id.clone(),
            call_type: "function".to_string(),
            function: ApiFunctionCall {
                name: tc.name.clone(),
                arguments: serde_json::to_string(&tc.arguments).unwrap_or_default(),
            },
        })
        .collect();

    messages.push(ApiMessage {
        role: "assistant".to_string(),
        content: Some(ApiContent::Text(String::new())),
        tool_calls: Some(tool_calls),
        tool_call_id: None,
    });

    for response in &entry.tool_responses {
        messages.push(ApiMessage {
            role: "tool".to_string(),
            content: Some(ApiContent::Text(response.content.clone())),
            tool_calls: None,
            tool_call_id: Some(response.tool_call_id.clone()),
        });
    }

    messages
}

fn parse_completion(body: &str) -> Result<AiResponse, AiError> {
    let data: CompletionResponse =
        serde_json::from_str(body).map_err(|e| AiError::Decode(e.to_string()))?;

    let choice = data.choices.into_iter().next().ok_or(AiError::EmptyResponse)?;

    log::info!(
        "[OPENROUTER] Response - content_len: {}, tool_calls: {}, finish_reason: {:?}",
        choice.message.content.as_ref().map(|c| c.len()).unwrap_or(0),
        choice.message.tool_calls.as_ref().map(|t| t.len()).unwrap_or(0),
        choice.finish_reason
    );

    let tool_calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCall {
            arguments: serde_json::from_str(&tc.function.arguments).unwrap_or(json!({})),
            id: tc.id,
            name: tc.function.name,
        })
        .collect();

    Ok(AiResponse {
        content: choice.message.content.unwrap_or_default(),
        tool_calls,
    })
}
