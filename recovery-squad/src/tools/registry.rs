use crate::ai::ToolCall;
use crate::tools::types::{ToolContext, ToolDefinition, ToolResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A capability the model can invoke through native tool calling
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult;
}

/// Named set of tools handed to a persona
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        if self.tools.insert(name.clone(), tool).is_some() {
            log::warn!("[TOOLS] Replaced existing tool '{}'", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions sorted by name so requests are stable across runs
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn names(&self) -> Vec<String> {
        self.definitions().into_iter().map(|d| d.name).collect()
    }

    /// Run a model-requested call. Unknown tools come back as error results
    /// so the model can recover instead of the step failing.
    pub async fn execute(&self, call: &ToolCall, context: &ToolContext) -> ToolResult {
        match self.get(&call.name) {
            Some(tool) => {
                log::info!(
                    "[TOOLS] {} executing '{}' with {}",
                    context.log_tag(),
                    call.name,
                    call.arguments
                );
                tool.execute(call.arguments.clone(), context).await
            }
            None => {
                log::warn!("[TOOLS] {} requested unknown tool '{}'", context.log_tag(), call.name);
                ToolResult::error(format!("Unknown tool: {}", call.name))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::types::ToolInputSchema;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".to_string(),
                description: "Echo params".to_string(),
                input_schema: ToolInputSchema::default(),
            }
        }

        async fn execute(&self, params: Value, _context: &ToolContext) -> ToolResult {
            ToolResult::success(params.to_string())
        }
    }

    #[tokio::test]
    async fn test_execute_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names(), vec!["echo"]);

        let call = ToolCall {
            id: "1".to_string(),
            name: "echo".to_string(),
            arguments: json!({"a": 1}),
        };
        let result = registry.execute(&call, &ToolContext::new()).await;
        assert!(result.success);
        assert_eq!(result.content, r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_result() {
        let registry = ToolRegistry::new();
        let call = ToolCall {
            id: "1".to_string(),
            name: "missing".to_string(),
            arguments: json!({}),
        };
        let result = registry.execute(&call, &ToolContext::new()).await;
        assert!(!result.success);
        assert!(result.content.contains("missing"));
    }
}
