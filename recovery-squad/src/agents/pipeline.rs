use super::{PersonaId, Squad};
use crate::ai::AiError;
use crate::markdown;
use crate::staging::StagedImage;
use crate::tools::ToolContext;
use serde::Serialize;
use thiserror::Error;

/// The only failure text users ever see for a broken run
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong during analysis.";

/// One rendered persona answer
#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub persona: PersonaId,
    pub heading: &'static str,
    pub label: &'static str,
    /// Markdown exactly as the model returned it
    pub content: String,
    /// `content` rendered for display, raw HTML escaped
    pub html: String,
}

#[derive(Debug, Error)]
#[error("{persona} step failed: {source}")]
pub struct PipelineError {
    pub persona: PersonaId,
    #[source]
    pub source: AiError,
}

/// Outcome of one run. On failure `sections` holds what finished before
/// the failing step.
#[derive(Debug)]
pub struct RunReport {
    pub sections: Vec<Section>,
    pub failure: Option<PipelineError>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Runs the squad's personas strictly in order against one narrative
pub struct Pipeline<'a> {
    squad: &'a Squad,
    run_id: String,
    max_tool_rounds: u32,
}

impl<'a> Pipeline<'a> {
    pub fn new(squad: &'a Squad, run_id: impl Into<String>, max_tool_rounds: u32) -> Self {
        Self {
            squad,
            run_id: run_id.into(),
            max_tool_rounds,
        }
    }

    pub async fn run(&self, narrative: &str, images: &[StagedImage]) -> RunReport {
        let total = self.squad.personas().len();
        let mut sections = Vec::with_capacity(total);

        for (step, persona) in self.squad.personas().iter().enumerate() {
            let spec = persona.spec();
            let prompt = spec.build_prompt(narrative);
            let context = ToolContext::new()
                .with_run_id(self.run_id.clone())
                .with_persona(spec.id.as_str());

            log::info!(
                "[PIPELINE] {} step {}/{}: {} ({} images, tools: [{}])",
                self.run_id,
                step + 1,
                total,
                spec.progress,
                images.len(),
                persona.tool_names().join(", ")
            );

            match persona.run(&prompt, images, &context, self.max_tool_rounds).await {
                Ok(content) => sections.push(Section {
                    persona: spec.id,
                    heading: spec.heading,
                    label: spec.prompt_label,
                    html: markdown::render(&content),
                    content,
                }),
                Err(source) => {
                    log::error!(
                        "[PIPELINE] {} aborted at {} ({}): {}",
                        self.run_id,
                        spec.name,
                        spec.id,
                        source
                    );
                    return RunReport {
                        sections,
                        failure: Some(PipelineError {
                            persona: spec.id,
                            source,
                        }),
                    };
                }
            }
        }

        log::info!("[PIPELINE] {} finished all {} steps", self.run_id, total);
        RunReport {
            sections,
            failure: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::PERSONAS;
    use crate::ai::testing::ScriptedModel;
    use crate::ai::{AiResponse, ChatModel};
    use std::sync::Arc;

    fn squad_with(model: Arc<ScriptedModel>) -> Squad {
        Squad::assemble(model as Arc<dyn ChatModel>, None)
    }

    #[tokio::test]
    async fn test_full_run_order_and_labels() {
        let model = Arc::new(ScriptedModel::echo());
        let squad = squad_with(model.clone());

        let report = Pipeline::new(&squad, "run-1", 2)
            .run("We broke up after 3 years", &[])
            .await;

        assert!(report.is_complete());
        let order: Vec<PersonaId> = report.sections.iter().map(|s| s.persona).collect();
        assert_eq!(
            order,
            vec![PersonaId::Support, PersonaId::Closure, PersonaId::Plan, PersonaId::Honesty]
        );
        for (section, spec) in report.sections.iter().zip(PERSONAS.iter()) {
            assert_eq!(section.heading, spec.heading);
            assert_eq!(section.label, spec.prompt_label);
            assert!(!section.content.is_empty());
            assert_eq!(
                section.content,
                format!("reply to: {}We broke up after 3 years", spec.prompt_label)
            );
        }

        let calls = model.calls();
        assert_eq!(calls.len(), 4);
        assert!(calls.iter().all(|c| c.image_count == 0));
        assert_eq!(calls[0].prompt, "User feelings: We broke up after 3 years");
        assert_eq!(calls[3].prompt, "Give honest advice for: We broke up after 3 years");
    }

    #[tokio::test]
    async fn test_images_shared_by_every_step() {
        let model = Arc::new(ScriptedModel::echo());
        let squad = squad_with(model.clone());
        let images = vec![StagedImage::from_path("/tmp/temp_chat.png".into())];

        let report = Pipeline::new(&squad, "run-2", 2).run("", &images).await;

        assert!(report.is_complete());
        let calls = model.calls();
        assert_eq!(calls.len(), 4);
        assert!(calls.iter().all(|c| c.image_count == 1));
        assert_eq!(calls[0].prompt, "User feelings: ");
    }

    #[tokio::test]
    async fn test_failure_keeps_earlier_sections_and_stops() {
        // Third call (plan) fails
        let model = Arc::new(ScriptedModel::failing_on(2));
        let squad = squad_with(model.clone());

        let report = Pipeline::new(&squad, "run-3", 2).run("hi", &[]).await;

        assert!(!report.is_complete());
        assert_eq!(report.sections.len(), 2);
        assert_eq!(report.sections[1].persona, PersonaId::Closure);
        let failure = report.failure.unwrap();
        assert_eq!(failure.persona, PersonaId::Plan);
        assert!(matches!(failure.source, AiError::Api { status: 500, .. }));
        // Honesty never ran
        assert_eq!(model.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_first_step_failure_renders_nothing() {
        let model = Arc::new(ScriptedModel::with_replies(vec![Err(AiError::EmptyResponse)]));
        let squad = squad_with(model.clone());

        let report = Pipeline::new(&squad, "run-4", 2).run("hi", &[]).await;

        assert!(report.sections.is_empty());
        assert_eq!(report.failure.unwrap().persona, PersonaId::Support);
        assert_eq!(model.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_content_is_verbatim() {
        let markdown = "## Day 1\n\n- Walk\n- **Journal**\n";
        let model = Arc::new(ScriptedModel::with_replies(vec![Ok(AiResponse::text(markdown))]));
        let squad = squad_with(model);

        let report = Pipeline::new(&squad, "run-5", 2).run("hi", &[]).await;

        assert_eq!(report.sections[0].content, markdown);
        assert!(report.sections[0].html.contains("<h2>Day 1</h2>"));
        assert!(report.sections[0].html.contains("<strong>Journal</strong>"));
    }
}
