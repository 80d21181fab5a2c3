//! Web search capability.
//!
//! The tool validates arguments and shapes results; a [`SearchBackend`]
//! fetches them. [`SerperBackend`] queries Google through serper.dev,
//! [`OfflineBackend`] returns canned results so the agent can run and be
//! tested without network access.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sleuth_core::error::ToolError;
use sleuth_core::tool::{Tool, ToolResult};
use std::sync::Arc;
use tracing::debug;

/// Hard ceiling on results per query, whatever the model asks for.
const MAX_RESULTS: u32 = 10;

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Where search results come from.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, num_results: u32) -> Result<Vec<SearchRecord>, ToolError>;
}

pub struct WebSearchTool {
    backend: Arc<dyn SearchBackend>,
    default_results: u32,
}

impl WebSearchTool {
    pub fn new(backend: Arc<dyn SearchBackend>, default_results: u32) -> Self {
        Self {
            backend,
            default_results: default_results.clamp(1, MAX_RESULTS),
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information. Returns a list of relevant results with titles, URLs, and snippets."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "num_results": {
                    "type": "integer",
                    "description": format!("Number of results to return (default {})", self.default_results),
                    "default": self.default_results
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let num_results = arguments["num_results"]
            .as_u64()
            .map(|n| n.clamp(1, MAX_RESULTS as u64) as u32)
            .unwrap_or(self.default_results);

        debug!(backend = self.backend.name(), query, num_results, "Running web search");
        let results = self.backend.search(query, num_results).await?;

        let output = serde_json::to_string_pretty(&results).map_err(|e| {
            ToolError::ExecutionFailed {
                tool_name: "web_search".into(),
                reason: e.to_string(),
            }
        })?;
        let data = serde_json::to_value(&results).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "web_search".into(),
            reason: e.to_string(),
        })?;

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output,
            data: Some(data),
        })
    }
}

// --- Serper ---

/// Google search through the serper.dev API.
pub struct SerperBackend {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl SerperBackend {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn failure(reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: "web_search".into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Debug, Deserialize)]
struct SerperOrganic {
    #[serde(default)]
    title: String,
    /// Absent on some entry kinds; those have nothing to cite.
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    snippet: String,
}

#[async_trait]
impl SearchBackend for SerperBackend {
    fn name(&self) -> &str {
        "serper"
    }

    async fn search(&self, query: &str, num_results: u32) -> Result<Vec<SearchRecord>, ToolError> {
        if self.api_key.is_empty() {
            return Err(Self::failure("no Serper API key configured"));
        }

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("X-API-KEY", &self.api_key)
            .json(&serde_json::json!({ "q": query, "num": num_results }))
            .send()
            .await
            .map_err(|e| Self::failure(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::failure(format!("Serper returned {status}: {body}")));
        }

        let parsed: SerperResponse = response
            .json()
            .await
            .map_err(|e| Self::failure(format!("unreadable Serper response: {e}")))?;

        Ok(parsed
            .organic
            .into_iter()
            .filter_map(|o| {
                Some(SearchRecord {
                    url: o.link?,
                    title: o.title,
                    snippet: o.snippet,
                })
            })
            .take(num_results as usize)
            .collect())
    }
}

// --- Offline ---

/// Deterministic canned results keyed on the query text.
pub struct OfflineBackend;

#[async_trait]
impl SearchBackend for OfflineBackend {
    fn name(&self) -> &str {
        "offline"
    }

    async fn search(&self, query: &str, num_results: u32) -> Result<Vec<SearchRecord>, ToolError> {
        Ok(canned_results(query, num_results as usize))
    }
}

fn record(title: &str, url: &str, snippet: &str) -> SearchRecord {
    SearchRecord {
        title: title.into(),
        url: url.into(),
        snippet: snippet.into(),
    }
}

fn canned_results(query: &str, count: usize) -> Vec<SearchRecord> {
    let q = query.to_lowercase();

    let templates: [(&str, Vec<SearchRecord>); 2] = [
        ("weather", vec![
            record(
                "Weather Forecast - National Weather Service",
                "https://weather.gov/",
                "Current conditions and forecasts for locations across the United States.",
            ),
            record(
                "OpenWeatherMap",
                "https://openweathermap.org/",
                "Current weather data and forecasts for any location.",
            ),
            record(
                "Japan Meteorological Agency",
                "https://www.jma.go.jp/",
                "Official forecasts and observations for Tokyo and the rest of Japan.",
            ),
        ]),
        ("rust", vec![
            record(
                "The Rust Programming Language",
                "https://doc.rust-lang.org/book/",
                "Rust is a systems programming language focused on safety, speed, and concurrency.",
            ),
            record(
                "crates.io: Rust Package Registry",
                "https://crates.io/",
                "The Rust community's crate registry for sharing and discovering Rust libraries.",
            ),
        ]),
    ];

    for (keyword, results) in templates {
        if q.contains(keyword) {
            return results.into_iter().take(count).collect();
        }
    }

    (0..count)
        .map(|i| SearchRecord {
            title: format!("Result {} for: {}", i + 1, query),
            url: format!("https://example.com/search?q={}&p={}", query.replace(' ', "+"), i + 1),
            snippet: format!("Offline search result for the query '{query}'."),
        })
        .collect()
}
