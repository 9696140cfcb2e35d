//! DuckDuckGo web and news search
//!
//! Neither endpoint needs an API key. Text search scrapes the HTML-only
//! results page; news search first obtains a `vqd` token from the main
//! site and then calls the `news.js` JSON endpoint with it.

use crate::tools::registry::Tool;
use crate::tools::types::{PropertySchema, ToolContext, ToolDefinition, ToolInputSchema, ToolResult};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

const HTML_SEARCH_URL: &str = "https://html.duckduckgo.com/html/";
const TOKEN_URL: &str = "https://duckduckgo.com/";
const NEWS_URL: &str = "https://duckduckgo.com/news.js";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) RecoverySquad/0.1";

const DEFAULT_MAX_RESULTS: usize = 5;
const MAX_RESULTS_CAP: usize = 10;

static RESULT_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<a[^>]*class="result__a"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#)
        .expect("valid result link regex")
});
static RESULT_SNIPPET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<a[^>]*class="result__snippet"[^>]*>(.*?)</a>"#)
        .expect("valid snippet regex")
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));
static VQD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"vqd=["']?([0-9-]+)["'&]?"#).expect("valid vqd regex"));

/// One text search hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// One news article
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsHit {
    pub title: String,
    pub url: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub excerpt: String,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default)]
    max_results: Option<Value>,
}

impl SearchParams {
    /// Accepts numbers or numeric strings; clamps to 1..=10
    fn limit(&self) -> usize {
        let requested = match &self.max_results {
            Some(Value::Number(n)) => n.as_u64().map(|v| v as usize),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        requested
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, MAX_RESULTS_CAP)
    }
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    results: Vec<NewsItem>,
}

#[derive(Debug, Deserialize)]
struct NewsItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    excerpt: String,
    date: Option<i64>,
}

fn build_client(timeout: Duration) -> Result<Client, String> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| format!("Failed to create search HTTP client: {}", e))
}

fn search_definition(name: &str, description: &str) -> ToolDefinition {
    let mut properties = HashMap::new();
    properties.insert(
        "query".to_string(),
        PropertySchema::new("string", "The search query"),
    );
    properties.insert(
        "max_results".to_string(),
        PropertySchema::new("integer", "Maximum number of results to return (1-10)")
            .with_default(json!(DEFAULT_MAX_RESULTS)),
    );

    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: ToolInputSchema {
            schema_type: "object".to_string(),
            properties,
            required: vec!["query".to_string()],
        },
    }
}

fn parse_params(params: Value) -> Result<SearchParams, ToolResult> {
    let params: SearchParams = serde_json::from_value(params)
        .map_err(|e| ToolResult::error(format!("Invalid parameters: {}", e)))?;
    if params.query.trim().is_empty() {
        return Err(ToolResult::error("query cannot be empty"));
    }
    Ok(params)
}

/// `duckduckgo_search`: general web results
pub struct DuckDuckGoSearchTool {
    client: Client,
}

impl DuckDuckGoSearchTool {
    pub fn new(timeout: Duration) -> Result<Self, String> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl Tool for DuckDuckGoSearchTool {
    fn definition(&self) -> ToolDefinition {
        search_definition(
            "duckduckgo_search",
            "Search the web with DuckDuckGo. Returns titles, URLs and snippets.",
        )
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params = match parse_params(params) {
            Ok(p) => p,
            Err(result) => return result,
        };
        let limit = params.limit();

        let response = match self
            .client
            .post(HTML_SEARCH_URL)
            .form(&[("q", params.query.as_str())])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("Search request failed: {}", e)),
        };

        if !response.status().is_success() {
            return ToolResult::error(format!("Search returned HTTP {}", response.status()));
        }

        let html = match response.text().await {
            Ok(t) => t,
            Err(e) => return ToolResult::error(format!("Failed to read search results: {}", e)),
        };

        let hits = parse_html_results(&html, limit);
        log::info!(
            "[SEARCH] {} '{}' -> {} results",
            context.log_tag(),
            params.query,
            hits.len()
        );

        ToolResult::success(serde_json::to_string(&hits).unwrap_or_else(|_| "[]".to_string()))
            .with_metadata(json!({ "query": params.query, "count": hits.len() }))
    }
}

/// `duckduckgo_news`: recent news articles
pub struct DuckDuckGoNewsTool {
    client: Client,
}

impl DuckDuckGoNewsTool {
    pub fn new(timeout: Duration) -> Result<Self, String> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }

    async fn fetch_vqd(&self, query: &str) -> Result<String, String> {
        let page = self
            .client
            .get(TOKEN_URL)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| format!("Token request failed: {}", e))?
            .text()
            .await
            .map_err(|e| format!("Failed to read token page: {}", e))?;

        extract_vqd(&page).ok_or_else(|| "Could not obtain a DuckDuckGo search token".to_string())
    }
}

#[async_trait]
impl Tool for DuckDuckGoNewsTool {
    fn definition(&self) -> ToolDefinition {
        search_definition(
            "duckduckgo_news",
            "Search recent news with DuckDuckGo. Returns titles, URLs, sources, dates and excerpts.",
        )
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params = match parse_params(params) {
            Ok(p) => p,
            Err(result) => return result,
        };
        let limit = params.limit();

        let vqd = match self.fetch_vqd(&params.query).await {
            Ok(v) => v,
            Err(e) => return ToolResult::error(e),
        };

        let response = match self
            .client
            .get(NEWS_URL)
            .query(&[
                ("l", "us-en"),
                ("o", "json"),
                ("noamp", "1"),
                ("q", params.query.as_str()),
                ("vqd", vqd.as_str()),
            ])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("News request failed: {}", e)),
        };

        if !response.status().is_success() {
            return ToolResult::error(format!("News search returned HTTP {}", response.status()));
        }

        let body = match response.text().await {
            Ok(t) => t,
            Err(e) => return ToolResult::error(format!("Failed to read news results: {}", e)),
        };

        let hits = match parse_news_results(&body, limit) {
            Ok(h) => h,
            Err(e) => return ToolResult::error(e),
        };
        log::info!(
            "[SEARCH] {} news '{}' -> {} results",
            context.log_tag(),
            params.query,
            hits.len()
        );

        ToolResult::success(serde_json::to_string(&hits).unwrap_or_else(|_| "[]".to_string()))
            .with_metadata(json!({ "query": params.query, "count": hits.len() }))
    }
}

/// Pull result links and snippets out of the HTML results page. A snippet
/// belongs to the link it follows, up to the next result link. Ads link
/// through `duckduckgo.com/y.js` and are skipped.
pub fn parse_html_results(html: &str, limit: usize) -> Vec<SearchHit> {
    let links: Vec<regex::Captures> = RESULT_LINK_RE.captures_iter(html).collect();

    links
        .iter()
        .enumerate()
        .filter_map(|(i, caps)| {
            let href = decode_entities(&caps[1]);
            if href.contains("duckduckgo.com/y.js") {
                return None;
            }
            let block_start = caps.get(0)?.end();
            let block_end = links
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map(|m| m.start())
                .unwrap_or(html.len());
            let snippet = RESULT_SNIPPET_RE
                .captures(&html[block_start..block_end])
                .map(|c| clean_fragment(&c[1]))
                .unwrap_or_default();

            Some(SearchHit {
                title: clean_fragment(&caps[2]),
                url: resolve_result_url(&href),
                snippet,
            })
        })
        .take(limit)
        .collect()
}

/// Result links are redirects of the form `//duckduckgo.com/l/?uddg=<target>&rut=...`
pub fn resolve_result_url(href: &str) -> String {
    if let Some(start) = href.find("uddg=") {
        let encoded = &href[start + 5..];
        let encoded = encoded.split('&').next().unwrap_or(encoded);
        if let Ok(decoded) = urlencoding::decode(encoded) {
            return decoded.into_owned();
        }
    }
    if let Some(rest) = href.strip_prefix("//") {
        return format!("https://{}", rest);
    }
    href.to_string()
}

pub fn extract_vqd(page: &str) -> Option<String> {
    VQD_RE.captures(page).map(|c| c[1].to_string())
}

pub fn parse_news_results(body: &str, limit: usize) -> Result<Vec<NewsHit>, String> {
    let data: NewsResponse =
        serde_json::from_str(body).map_err(|e| format!("Failed to parse news results: {}", e))?;

    Ok(data
        .results
        .into_iter()
        .filter(|item| !item.url.is_empty())
        .take(limit)
        .map(|item| NewsHit {
            title: clean_fragment(&item.title),
            url: item.url,
            source: item.source,
            date: item
                .date
                .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
                .map(|dt| dt.to_rfc3339()),
            excerpt: clean_fragment(&item.excerpt),
        })
        .collect())
}

fn clean_fragment(fragment: &str) -> String {
    let text = TAG_RE.replace_all(fragment, "");
    decode_entities(text.trim())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        // last, so `&amp;lt;` stays `&lt;`
        .replace("&amp;", "&")
}
