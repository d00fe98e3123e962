//! Web search tool backed by a SearXNG instance

use crate::tool::{parameters_schema, Tool, ToolContext, ToolDefinition, ToolResult};
use async_trait::async_trait;
use reqwest::Client;
use schemars::JsonSchema;
use serde::Deserialize;

pub const DEFAULT_SEARCH_URL: &str = "http://localhost:8082";

#[derive(Debug, Deserialize, JsonSchema)]
struct Args {
    /// The search query
    query: String,
    /// Maximum results (default: 5)
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    5
}

pub struct WebSearchTool {
    client: Client,
    searxng_url: String,
}

impl WebSearchTool {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            searxng_url: url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::with_url(DEFAULT_SEARCH_URL)
    }
}

#[derive(Debug, Deserialize)]
struct SearxResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
    #[serde(default)]
    infoboxes: Vec<Infobox>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    url: String,
    title: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct Infobox {
    infobox: String,
    #[serde(default)]
    content: String,
}

fn render(data: &SearxResponse, limit: usize) -> String {
    let mut text = String::new();

    for infobox in &data.infoboxes {
        text.push_str(&format!("## {}\n{}\n\n", infobox.infobox, infobox.content));
    }

    if data.results.is_empty() {
        text.push_str("No results found.\n");
    }
    for hit in data.results.iter().take(limit) {
        text.push_str(&format!("### {}\nURL: {}\n{}\n\n", hit.title, hit.url, hit.content));
    }
    text
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "web_search".to_string(),
            description: "Search the web. Use it to find current SDK versions, documentation pages, or configuration guides.".to_string(),
            parameters: parameters_schema::<Args>(),
        }
    }

    async fn execute(&self, args_value: serde_json::Value, ctx: &ToolContext) -> ToolResult {
        if ctx.is_cancelled() {
            return ToolResult::error("Cancelled");
        }

        let args: Args = match serde_json::from_value(args_value) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("Invalid arguments: {}", e)),
        };

        let request = self
            .client
            .get(format!("{}/search", self.searxng_url))
            .query(&[("q", args.query.as_str()), ("format", "json")])
            .send();

        let response = tokio::select! {
            _ = ctx.cancellation.cancelled() => return ToolResult::error("Cancelled"),
            r = request => match r {
                Ok(r) => r,
                Err(e) => return ToolResult::error(format!("Search request failed: {}", e)),
            },
        };

        if !response.status().is_success() {
            return ToolResult::error(format!("Search failed: {}", response.status()));
        }

        match response.json::<SearxResponse>().await {
            Ok(data) => ToolResult::success(render(&data, args.limit)),
            Err(e) => ToolResult::error(format!("Failed to parse response: {}", e)),
        }
    }
}
