//! Fetch tool - HTTP GET, reduced to readable text
//!
//! Agents use this to read provider documentation (SDK quickstarts and the
//! like) while planning an integration.

use crate::tool::{parameters_schema, Tool, ToolContext, ToolDefinition, ToolResult};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

const MAX_CONTENT_CHARS: usize = 20_000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize, JsonSchema)]
struct Args {
    /// The URL to fetch; https:// is assumed when no scheme is given
    url: String,
}

pub struct FetchTool {
    client: Client,
}

impl FetchTool {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("autocrew/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for FetchTool {
    fn default() -> Self {
        Self::new()
    }
}

struct Patterns {
    hidden: Regex,
    block: Regex,
    tag: Regex,
    blank_lines: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        hidden: Regex::new(r"(?is)<(script|style|head|nav|footer|svg|noscript)\b.*?</(script|style|head|nav|footer|svg|noscript)\s*>")
            .expect("static regex"),
        block: Regex::new(r"(?i)</?(p|div|br|li|tr|h[1-6]|pre|section|article|ul|ol|table)\b[^>]*>")
            .expect("static regex"),
        tag: Regex::new(r"(?s)<[^>]*>").expect("static regex"),
        blank_lines: Regex::new(r"\n{3,}").expect("static regex"),
    })
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Strip markup from an HTML page, keeping block structure as line breaks
pub fn html_to_text(html: &str) -> String {
    let p = patterns();
    let text = p.hidden.replace_all(html, "");
    let text = p.block.replace_all(&text, "\n");
    let text = p.tag.replace_all(&text, "");
    let text = decode_entities(&text);

    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let joined = lines.join("\n");
    p.blank_lines.replace_all(&joined, "\n\n").trim().to_string()
}

fn truncate(mut content: String) -> String {
    if let Some((cut, _)) = content.char_indices().nth(MAX_CONTENT_CHARS) {
        content.truncate(cut);
        content.push_str("\n\n[content truncated]");
    }
    content
}

#[async_trait]
impl Tool for FetchTool {
    fn name(&self) -> &str {
        "fetch"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "fetch".to_string(),
            description: "Fetch a URL and return its content as plain text. Useful for reading SDK documentation or API references.".to_string(),
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

        let url = if args.url.starts_with("https://") || args.url.starts_with("http://") {
            args.url
        } else {
            format!("https://{}", args.url)
        };

        let request = self.client.get(&url).send();
        let response = tokio::select! {
            _ = ctx.cancellation.cancelled() => return ToolResult::error("Cancelled"),
            r = request => match r {
                Ok(r) => r,
                Err(e) => return ToolResult::error(format!("Request failed: {}", e)),
            },
        };

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return ToolResult::error(format!("HTTP error: {}", status));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return ToolResult::error(format!("Failed to read response: {}", e)),
        };

        let content = if content_type.starts_with("application/json") {
            match serde_json::from_str::<serde_json::Value>(&body) {
                Ok(json) => serde_json::to_string_pretty(&json).unwrap_or(body),
                Err(_) => body,
            }
        } else if content_type.starts_with("text/plain") || content_type.contains("markdown") {
            body
        } else {
            html_to_text(&body)
        };

        if content.trim().is_empty() {
            ToolResult::error("No content found")
        } else {
            ToolResult::success(truncate(content))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text_keeps_blocks() {
        let html = "<h1>Quickstart</h1><p>Install <code>authlib</code> &amp; configure.</p><ul><li>One</li><li>Two</li></ul>";
        let text = html_to_text(html);
        assert!(text.starts_with("Quickstart"));
        assert!(text.contains("Install authlib & configure."));
        assert!(text.contains("One\n"));
    }

    #[test]
    fn test_html_to_text_strips_script() {
        let html = "<p>Before</p><script type=\"x\">alert('bad')</script><style>p{}</style><p>After</p>";
        let text = html_to_text(html);
        assert!(text.contains("Before"));
        assert!(text.contains("After"));
        assert!(!text.contains("alert"));
        assert!(!text.contains("p{}"));
    }

    #[test]
    fn test_truncate_long_content() {
        let long = "x".repeat(MAX_CONTENT_CHARS + 10);
        let out = truncate(long);
        assert!(out.ends_with("[content truncated]"));
    }
}
