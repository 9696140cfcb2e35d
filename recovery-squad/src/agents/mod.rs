//! Recovery squad personas
//!
//! Four personas share one model client and run one after another:
//!
//! ```text
//! support → closure → plan → honesty
//! ```
//!
//! Each persona is a [`PersonaSpec`] record (name, instructions, prompt
//! label, heading) driving the same [`Persona::run`] routine. Only the
//! honesty persona is offered web search, and it still runs when search
//! could not be set up.

pub mod factory;
pub mod persona;
pub mod pipeline;

pub use factory::{AgentFactory, FactoryError};
pub use persona::{Persona, PersonaId, PersonaSpec, PERSONAS};
pub use pipeline::{Pipeline, Section, GENERIC_FAILURE_MESSAGE};

use crate::ai::ChatModel;
use crate::tools::ToolRegistry;
use std::sync::Arc;

/// All four personas for one submission, in run order
pub struct Squad {
    personas: Vec<Persona>,
    warnings: Vec<String>,
}

impl Squad {
    /// Bind every persona to `model`. `search` goes to the personas that
    /// want it; when absent they run without tools.
    pub fn assemble(model: Arc<dyn ChatModel>, search: Option<Arc<ToolRegistry>>) -> Self {
        let personas = PERSONAS
            .iter()
            .map(|spec| {
                let persona = Persona::new(spec, Arc::clone(&model));
                match (&search, spec.wants_search) {
                    (Some(tools), true) => persona.with_tools(Arc::clone(tools)),
                    _ => persona,
                }
            })
            .collect();

        Self {
            personas,
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn personas(&self) -> &[Persona] {
        &self.personas
    }

    #[cfg(test)]
    pub fn get(&self, id: PersonaId) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id() == id)
    }

    /// Degradations noticed while building the squad, safe to show users
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::ScriptedModel;
    use crate::tools::create_search_registry;
    use std::time::Duration;

    #[test]
    fn test_assemble_order_and_tools() {
        let search = Arc::new(create_search_registry(Duration::from_secs(5)).unwrap());
        let squad = Squad::assemble(Arc::new(ScriptedModel::echo()), Some(search));

        let ids: Vec<PersonaId> = squad.personas().iter().map(|p| p.id()).collect();
        assert_eq!(
            ids,
            vec![PersonaId::Support, PersonaId::Closure, PersonaId::Plan, PersonaId::Honesty]
        );
        assert!(squad.get(PersonaId::Support).unwrap().tool_names().is_empty());
        assert_eq!(
            squad.get(PersonaId::Honesty).unwrap().tool_names(),
            vec!["duckduckgo_news", "duckduckgo_search"]
        );
        assert!(squad.warnings().is_empty());
    }

    #[test]
    fn test_assemble_without_search() {
        let squad = Squad::assemble(Arc::new(ScriptedModel::echo()), None);
        assert_eq!(squad.personas().len(), 4);
        assert!(squad.get(PersonaId::Honesty).unwrap().tool_names().is_empty());
    }
}
