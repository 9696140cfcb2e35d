use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::ai::openrouter::{DEFAULT_ENDPOINT, DEFAULT_MODEL};

/// Per-file upload ceiling (10 MiB)
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Server and upstream settings. The OpenRouter API key is not
/// part of this: it only ever arrives with a form submission.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind_addr: String,
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    /// Tool rounds allowed per persona call before the step is failed
    pub max_tool_iterations: u32,
    pub http_timeout_secs: u64,
    /// Directory uploaded images are staged into
    pub staging_dir: PathBuf,
    pub enable_web_search: bool,
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_addr: "0.0.0.0".to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            max_tool_iterations: 4,
            http_timeout_secs: 120,
            staging_dir: env::temp_dir(),
            enable_web_search: true,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source. Unset or empty
    /// variables keep their defaults; unparseable ones are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            port: parse_or(&get, "PORT", defaults.port),
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            endpoint: get("OPENROUTER_ENDPOINT").unwrap_or(defaults.endpoint),
            model: get("OPENROUTER_MODEL").unwrap_or(defaults.model),
            max_tokens: parse_or(&get, "MAX_TOKENS", defaults.max_tokens),
            max_tool_iterations: parse_or(&get, "MAX_TOOL_ITERATIONS", defaults.max_tool_iterations),
            http_timeout_secs: parse_or(&get, "HTTP_TIMEOUT_SECS", defaults.http_timeout_secs),
            staging_dir: get("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.staging_dir),
            enable_web_search: get("ENABLE_WEB_SEARCH")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.enable_web_search),
            max_upload_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
        }
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("{} must be a valid number, got '{}'; using {}", key, raw, default);
            default
        }),
        None => default,
    }
}

/// Same truthy spellings the server uses for DISABLE_FRONTEND
pub fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
