use super::{PersonaId, Squad};
use crate::ai::{AiError, ChatModel, OpenRouterClient};
use crate::config::Config;
use crate::tools::{self, ToolRegistry};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const MISSING_CREDENTIAL_MESSAGE: &str = "Please enter your OpenRouter API Key.";
pub const INITIALIZATION_FAILED_MESSAGE: &str = "Agent initialization failed.";

#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("no API key supplied")]
    MissingCredential,

    #[error("failed to build model client: {0}")]
    Initialization(#[from] AiError),
}

impl FactoryError {
    /// Text shown in the form's error banner
    pub fn user_message(&self) -> &'static str {
        match self {
            FactoryError::MissingCredential => MISSING_CREDENTIAL_MESSAGE,
            FactoryError::Initialization(_) => INITIALIZATION_FAILED_MESSAGE,
        }
    }
}

type ModelBuilder = dyn Fn(&str) -> Result<Arc<dyn ChatModel>, AiError> + Send + Sync;
type SearchBuilder = dyn Fn() -> Result<ToolRegistry, String> + Send + Sync;

/// Builds a fresh [`Squad`] for every submission.
///
/// The model and search builders are injectable so the server can be
/// exercised without reaching OpenRouter or DuckDuckGo.
pub struct AgentFactory {
    model_builder: Box<ModelBuilder>,
    search_builder: Option<Box<SearchBuilder>>,
}

impl AgentFactory {
    pub fn new<F>(model_builder: F) -> Self
    where
        F: Fn(&str) -> Result<Arc<dyn ChatModel>, AiError> + Send + Sync + 'static,
    {
        Self {
            model_builder: Box::new(model_builder),
            search_builder: None,
        }
    }

    pub fn with_search<F>(mut self, search_builder: F) -> Self
    where
        F: Fn() -> Result<ToolRegistry, String> + Send + Sync + 'static,
    {
        self.search_builder = Some(Box::new(search_builder));
        self
    }

    /// OpenRouter-backed factory, with DuckDuckGo search unless disabled
    pub fn from_config(config: &Config) -> Self {
        let endpoint = config.endpoint.clone();
        let model = config.model.clone();
        let max_tokens = config.max_tokens;
        let timeout = Duration::from_secs(config.http_timeout_secs);

        let factory = Self::new(move |api_key| {
            let client = OpenRouterClient::new(
                api_key,
                Some(endpoint.as_str()),
                Some(model.as_str()),
                max_tokens,
                timeout,
            )?;
            Ok(Arc::new(client) as Arc<dyn ChatModel>)
        });

        if config.enable_web_search {
            factory.with_search(move || tools::create_search_registry(timeout))
        } else {
            log::info!("[FACTORY] Web search disabled by configuration");
            factory
        }
    }

    /// Construct all four personas for `credential`.
    ///
    /// An empty credential fails before anything is built. A search setup
    /// failure only removes the tools: the honesty persona is still returned
    /// and the squad carries a warning.
    pub fn build(&self, credential: &str) -> Result<Squad, FactoryError> {
        if credential.trim().is_empty() {
            log::warn!("[FACTORY] Refusing to build personas without an API key");
            return Err(FactoryError::MissingCredential);
        }

        let model = (self.model_builder)(credential).map_err(|e| {
            log::error!("[FACTORY] Agent initialization failed: {}", e);
            FactoryError::Initialization(e)
        })?;

        let mut warning = None;
        let search = match &self.search_builder {
            Some(builder) => match builder() {
                Ok(registry) if !registry.is_empty() => Some(Arc::new(registry)),
                Ok(_) => None,
                Err(e) => {
                    let honesty = PersonaId::Honesty.spec().name;
                    log::warn!(
                        "[FACTORY] Web search failed to initialize: {}. {} will run without it.",
                        e,
                        honesty
                    );
                    warning = Some(format!(
                        "Web search is unavailable right now, so the {} will answer without it.",
                        honesty
                    ));
                    None
                }
            },
            None => None,
        };

        log::info!(
            "[FACTORY] Built 4 personas on model {} (search: {})",
            model.model_id(),
            search.is_some()
        );

        let squad = Squad::assemble(model, search);
        Ok(match warning {
            Some(w) => squad.with_warning(w),
            None => squad,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::ScriptedModel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_factory(counter: Arc<AtomicUsize>) -> AgentFactory {
        AgentFactory::new(move |_key| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(ScriptedModel::echo()) as Arc<dyn ChatModel>)
        })
    }

    #[test]
    fn test_empty_credential_builds_nothing() {
        let built = Arc::new(AtomicUsize::new(0));
        let factory = counting_factory(built.clone());

        for credential in ["", "   ", "\n\t"] {
            let result = factory.build(credential);
            assert!(matches!(result, Err(FactoryError::MissingCredential)));
        }
        assert_eq!(built.load(Ordering::SeqCst), 0);
        assert_eq!(
            FactoryError::MissingCredential.user_message(),
            MISSING_CREDENTIAL_MESSAGE
        );
    }

    #[test]
    fn test_valid_credential_builds_four() {
        let built = Arc::new(AtomicUsize::new(0));
        let factory = counting_factory(built.clone());

        let squad = factory.build("sk-or-v1-abc").unwrap();
        assert_eq!(squad.personas().len(), 4);
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_search_failure_degrades_honesty_only() {
        let factory = counting_factory(Arc::new(AtomicUsize::new(0)))
            .with_search(|| Err("tls backend unavailable".to_string()));

        let squad = factory.build("sk-or-v1-abc").unwrap();

        assert_eq!(squad.personas().len(), 4);
        let honesty = squad.get(PersonaId::Honesty).unwrap();
        assert!(honesty.tool_names().is_empty());
        assert_eq!(squad.warnings().len(), 1);
        assert!(squad.warnings()[0].contains("Brutal Honesty Agent"));
        assert!(!squad.warnings()[0].contains("tls"));
    }

    #[test]
    fn test_search_success_binds_tools() {
        let factory = counting_factory(Arc::new(AtomicUsize::new(0)))
            .with_search(|| tools::create_search_registry(Duration::from_secs(5)));

        let squad = factory.build("sk-or-v1-abc").unwrap();
        assert_eq!(squad.get(PersonaId::Honesty).unwrap().tool_names().len(), 2);
        assert!(squad.warnings().is_empty());
    }

    #[test]
    fn test_model_builder_failure() {
        let factory = AgentFactory::new(|_key| Err(AiError::Config("bad key".to_string())));
        let result = factory.build("sk");
        let err = match result {
            Err(e) => e,
            Ok(_) => panic!("expected failure"),
        };
        assert!(matches!(err, FactoryError::Initialization(_)));
        assert_eq!(err.user_message(), INITIALIZATION_FAILED_MESSAGE);
    }

    #[test]
    fn test_from_config_uses_real_client() {
        let config = Config {
            enable_web_search: false,
            ..Config::default()
        };
        let squad = AgentFactory::from_config(&config).build("sk-or-v1-abc").unwrap();
        assert!(squad.get(PersonaId::Honesty).unwrap().tool_names().is_empty());
        assert!(squad.warnings().is_empty());
    }
}
