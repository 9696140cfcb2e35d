pub mod builtin;
pub mod registry;
pub mod types;

pub use registry::ToolRegistry;
pub use types::{ToolContext, ToolDefinition, ToolResult};

use std::sync::Arc;
use std::time::Duration;

/// Build the web search capability (`duckduckgo_search` + `duckduckgo_news`).
///
/// Fails if either tool cannot build its HTTP client; callers treat that as
/// a degraded mode rather than a fatal error.
pub fn create_search_registry(timeout: Duration) -> Result<ToolRegistry, String> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(builtin::DuckDuckGoSearchTool::new(timeout)?));
    registry.register(Arc::new(builtin::DuckDuckGoNewsTool::new(timeout)?));
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_registry_contents() {
        let registry = create_search_registry(Duration::from_secs(5)).unwrap();
        assert_eq!(registry.names(), vec!["duckduckgo_news", "duckduckgo_search"]);
    }
}
