//! Built-in tools available to personas

mod duckduckgo;

pub use duckduckgo::{DuckDuckGoNewsTool, DuckDuckGoSearchTool};
