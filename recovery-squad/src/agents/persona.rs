use crate::ai::{AiError, ChatModel, Message, ToolHistoryEntry, ToolResponse};
use crate::staging::StagedImage;
use crate::tools::{ToolContext, ToolRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::EnumIter;

/// The four personas, in the order they always run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(rename_all = "lowercase")]
pub enum PersonaId {
    Support,
    Closure,
    Plan,
    Honesty,
}

impl std::fmt::Display for PersonaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PersonaId {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonaId::Support => "support",
            PersonaId::Closure => "closure",
            PersonaId::Plan => "plan",
            PersonaId::Honesty => "honesty",
        }
    }

    pub fn spec(&self) -> &'static PersonaSpec {
        match self {
            PersonaId::Support => &PERSONAS[0],
            PersonaId::Closure => &PERSONAS[1],
            PersonaId::Plan => &PERSONAS[2],
            PersonaId::Honesty => &PERSONAS[3],
        }
    }
}

/// Static description of a persona: who it is, how it is prompted and
/// where its answer is shown.
#[derive(Debug, Serialize)]
pub struct PersonaSpec {
    pub id: PersonaId,
    pub name: &'static str,
    pub instructions: &'static [&'static str],
    /// Prefix placed in front of the user's narrative, trailing space included
    pub prompt_label: &'static str,
    pub heading: &'static str,
    /// Shown while the step is running
    pub progress: &'static str,
    /// Whether the persona is offered the web search tools
    pub wants_search: bool,
}

pub static PERSONAS: [PersonaSpec; 4] = [
    PersonaSpec {
        id: PersonaId::Support,
        name: "Therapist Agent",
        instructions: &[
            "You are an empathetic therapist.",
            "Validate feelings and offer gentle comfort.",
            "Analyze both text and image inputs.",
        ],
        prompt_label: "User feelings: ",
        heading: "🤗 Emotional Support",
        progress: "🤗 Providing emotional support...",
        wants_search: false,
    },
    PersonaSpec {
        id: PersonaId::Closure,
        name: "Closure Agent",
        instructions: &[
            "Help express unsent emotions.",
            "Create heartfelt closure messages.",
        ],
        prompt_label: "Help create closure for: ",
        heading: "✍️ Finding Closure",
        progress: "✍️ Crafting closure messages...",
        wants_search: false,
    },
    PersonaSpec {
        id: PersonaId::Plan,
        name: "Routine Planner Agent",
        instructions: &[
            "Create a 7-day emotional recovery plan.",
            "Include self-care and healing activities.",
        ],
        prompt_label: "Create a 7-day recovery plan for: ",
        heading: "📅 Your Recovery Plan",
        progress: "📅 Creating recovery plan...",
        wants_search: false,
    },
    PersonaSpec {
        id: PersonaId::Honesty,
        name: "Brutal Honesty Agent",
        instructions: &[
            "Give honest, objective relationship feedback.",
            "Explain why moving on is necessary.",
        ],
        prompt_label: "Give honest advice for: ",
        heading: "💪 Honest Perspective",
        progress: "💪 Getting honest perspective...",
        wants_search: true,
    },
];

impl PersonaSpec {
    /// Label followed by the narrative, which is passed through untouched
    pub fn build_prompt(&self, narrative: &str) -> String {
        format!("{}{}", self.prompt_label, narrative)
    }

    pub fn system_prompt(&self) -> String {
        let mut prompt = format!("# {}\n\n## Instructions\n\n", self.name);
        for instruction in self.instructions {
            prompt.push_str(&format!("- {}\n", instruction));
        }
        prompt.push_str("- Use markdown to format your answers.\n");
        prompt
    }
}

/// A persona bound to a model client (and possibly tools) for one submission
pub struct Persona {
    spec: &'static PersonaSpec,
    model: Arc<dyn ChatModel>,
    tools: Option<Arc<ToolRegistry>>,
}

impl Persona {
    pub fn new(spec: &'static PersonaSpec, model: Arc<dyn ChatModel>) -> Self {
        Self {
            spec,
            model,
            tools: None,
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn id(&self) -> PersonaId {
        self.spec.id
    }

    pub fn spec(&self) -> &'static PersonaSpec {
        self.spec
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.as_ref().map(|t| t.names()).unwrap_or_default()
    }

    /// Ask the persona one question. When the persona has tools, tool calls
    /// are executed and fed back until the model answers in text, for at
    /// most `max_tool_rounds` rounds.
    pub async fn run(
        &self,
        prompt: &str,
        images: &[StagedImage],
        context: &ToolContext,
        max_tool_rounds: u32,
    ) -> Result<String, AiError> {
        let messages = vec![
            Message::system(self.spec.system_prompt()),
            Message::user_with_images(prompt, images.to_vec()),
        ];
        let definitions = self
            .tools
            .as_ref()
            .map(|t| t.definitions())
            .unwrap_or_default();

        let mut history: Vec<ToolHistoryEntry> = Vec::new();
        let mut rounds = 0;

        loop {
            let response = self
                .model
                .generate_with_tools(messages.clone(), history.clone(), definitions.clone())
                .await?;

            let registry = match &self.tools {
                Some(registry) if response.is_tool_use() => registry,
                _ => return Ok(response.content),
            };

            if rounds >= max_tool_rounds {
                return Err(AiError::ToolLoop(max_tool_rounds));
            }
            rounds += 1;

            log::info!(
                "[PERSONA] {} tool round {}: {} call(s)",
                context.log_tag(),
                rounds,
                response.tool_calls.len()
            );

            let mut responses = Vec::with_capacity(response.tool_calls.len());
            for call in &response.tool_calls {
                let result = registry.execute(call, context).await;
                responses.push(ToolResponse::from_result(call.id.clone(), &result));
            }
            history.push(ToolHistoryEntry::new(response.tool_calls, responses));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::ScriptedModel;
    use crate::ai::{AiResponse, ToolCall};
    use crate::tools::registry::Tool;
    use crate::tools::types::{ToolDefinition, ToolInputSchema, ToolResult};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use strum::IntoEnumIterator;

    struct FixedTool;

    #[async_trait]
    impl Tool for FixedTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "duckduckgo_search".to_string(),
                description: "stub".to_string(),
                input_schema: ToolInputSchema::default(),
            }
        }

        async fn execute(&self, _params: Value, _context: &ToolContext) -> ToolResult {
            ToolResult::success(r#"[{"title":"Moving on"}]"#)
        }
    }

    fn search_call(id: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: "duckduckgo_search".to_string(),
            arguments: json!({"query": "moving on"}),
        }
    }

    fn tools() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FixedTool));
        Arc::new(registry)
    }

    #[test]
    fn test_table_order_matches_ids() {
        let ids: Vec<PersonaId> = PersonaId::iter().collect();
        let table: Vec<PersonaId> = PERSONAS.iter().map(|p| p.id).collect();
        assert_eq!(ids, table);
        for id in PersonaId::iter() {
            assert_eq!(id.spec().id, id);
        }
    }

    #[test]
    fn test_only_honesty_wants_search() {
        let searching: Vec<PersonaId> = PERSONAS
            .iter()
            .filter(|p| p.wants_search)
            .map(|p| p.id)
            .collect();
        assert_eq!(searching, vec![PersonaId::Honesty]);
    }

    #[test]
    fn test_labels_end_with_single_space() {
        for spec in PERSONAS.iter() {
            assert!(spec.prompt_label.ends_with(": "), "{}", spec.prompt_label);
            assert_eq!(spec.build_prompt(""), spec.prompt_label);
        }
    }

    #[test]
    fn test_build_prompt() {
        let spec = PersonaId::Support.spec();
        assert_eq!(
            spec.build_prompt("We broke up after 3 years"),
            "User feelings: We broke up after 3 years"
        );
        assert_eq!(
            PersonaId::Plan.spec().build_prompt("x"),
            "Create a 7-day recovery plan for: x"
        );
    }

    #[test]
    fn test_system_prompt_lists_instructions_in_order() {
        let prompt = PersonaId::Support.spec().system_prompt();
        let first = prompt.find("empathetic therapist").unwrap();
        let second = prompt.find("gentle comfort").unwrap();
        let third = prompt.find("image inputs").unwrap();
        assert!(first < second && second < third);
        assert!(prompt.contains("markdown"));
        assert!(prompt.starts_with("# Therapist Agent"));
    }

    #[tokio::test]
    async fn test_run_without_tools_returns_content() {
        let model = Arc::new(ScriptedModel::echo());
        let persona = Persona::new(PersonaId::Closure.spec(), model.clone());

        let reply = persona
            .run("Help create closure for: hi", &[], &ToolContext::new(), 3)
            .await
            .unwrap();

        assert_eq!(reply, "reply to: Help create closure for: hi");
        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].system.contains("Closure Agent"));
        assert!(calls[0].tool_names.is_empty());
    }

    #[tokio::test]
    async fn test_tool_round_then_answer() {
        let model = Arc::new(ScriptedModel::with_replies(vec![
            Ok(AiResponse::tool_use(vec![search_call("c1")])),
            Ok(AiResponse::text("Time to move on.")),
        ]));
        let persona = Persona::new(PersonaId::Honesty.spec(), model.clone()).with_tools(tools());

        let reply = persona
            .run("Give honest advice for: x", &[], &ToolContext::new(), 3)
            .await
            .unwrap();

        assert_eq!(reply, "Time to move on.");
        let calls = model.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].tool_names, vec!["duckduckgo_search"]);
        assert_eq!(calls[0].history_len, 0);
        assert_eq!(calls[1].history_len, 1);
    }

    #[tokio::test]
    async fn test_tool_loop_is_bounded() {
        let model = Arc::new(ScriptedModel::with_replies(vec![
            Ok(AiResponse::tool_use(vec![search_call("c1")])),
            Ok(AiResponse::tool_use(vec![search_call("c2")])),
            Ok(AiResponse::tool_use(vec![search_call("c3")])),
        ]));
        let persona = Persona::new(PersonaId::Honesty.spec(), model.clone()).with_tools(tools());

        let result = persona.run("p", &[], &ToolContext::new(), 2).await;

        assert!(matches!(result, Err(AiError::ToolLoop(2))));
        assert_eq!(model.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_tool_calls_ignored_without_tools() {
        let model = Arc::new(ScriptedModel::with_replies(vec![Ok(AiResponse {
            content: "plain answer".to_string(),
            tool_calls: vec![search_call("c1")],
        })]));
        let persona = Persona::new(PersonaId::Honesty.spec(), model);

        let reply = persona.run("p", &[], &ToolContext::new(), 2).await.unwrap();
        assert_eq!(reply, "plain answer");
    }
}
