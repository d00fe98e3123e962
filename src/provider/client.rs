//! OpenAI-compatible provider client
//!
//! Non-streaming chat completions with tool support. Every call is logged
//! under the `llm` tracing target so the JSON log doubles as a request trace.

use super::ProviderConfig;
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestMessage, ChatCompletionTool,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use serde::Serialize;
use std::time::Instant;

/// Token counts for one or more completions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.input += other.input;
        self.output += other.output;
    }
}

/// Per-request knobs an agent definition may set
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

/// The first choice of a completion
#[derive(Debug, Clone, Default)]
pub struct ChatReply {
    pub text: Option<String>,
    pub tool_calls: Vec<ChatCompletionMessageToolCall>,
    pub usage: TokenUsage,
}

/// OpenAI-compatible client wrapper
#[derive(Clone)]
pub struct ProviderClient {
    config: ProviderConfig,
    client: Client<OpenAIConfig>,
}

impl ProviderClient {
    /// Create a new provider client from config
    pub fn new(config: ProviderConfig) -> Result<Self, String> {
        let mut openai_config = OpenAIConfig::new().with_api_base(&config.base_url);
        if config.requires_key() {
            let api_key = Self::get_api_key(&config)?;
            openai_config = openai_config.with_api_key(api_key);
        }

        Ok(Self {
            config,
            client: Client::with_config(openai_config),
        })
    }

    /// API key from the environment, after loading any `.env` file
    fn get_api_key(config: &ProviderConfig) -> Result<String, String> {
        let _ = dotenvy::dotenv();
        std::env::var(&config.api_key_env)
            .map_err(|_| format!("{} not found in environment", config.api_key_env))
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Send a chat completion request with tools. The request always runs to
    /// completion; callers check for cancellation between calls.
    pub async fn chat(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        tools: Vec<ChatCompletionTool>,
        options: &ChatOptions,
    ) -> Result<ChatReply, String> {
        let model = options
            .model
            .as_deref()
            .unwrap_or(&self.config.default_model)
            .to_string();

        let mut request_builder = CreateChatCompletionRequestArgs::default();
        request_builder.model(model.clone()).messages(messages);
        if !tools.is_empty() {
            request_builder.tools(tools);
        }
        if let Some(temperature) = options.temperature {
            request_builder.temperature(temperature);
        }

        let request = request_builder
            .build()
            .map_err(|e| format!("Failed to build request: {}", e))?;

        let start = Instant::now();
        let response = self.client.chat().create(request).await.map_err(|e| {
            tracing::warn!(target: "llm", provider = %self.config.name, model = %model, error = %e, "chat completion failed");
            format!("API call failed: {}", e)
        })?;

        let usage = response
            .usage
            .as_ref()
            .map(|u| TokenUsage {
                input: u64::from(u.prompt_tokens),
                output: u64::from(u.completion_tokens),
            })
            .unwrap_or_default();

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| "API returned no choices".to_string())?;

        let reply = ChatReply {
            text: choice.message.content.filter(|t| !t.trim().is_empty()),
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
            usage,
        };

        tracing::info!(
            target: "llm",
            provider = %self.config.name,
            model = %model,
            input_tokens = usage.input,
            output_tokens = usage.output,
            tool_calls = reply.tool_calls.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "chat completion"
        );

        Ok(reply)
    }
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyless_provider_builds() {
        let client = ProviderClient::new(ProviderConfig::local("http://localhost:1234/v1", "qwen"))
            .unwrap();
        assert_eq!(client.config().default_model, "qwen");
    }

    #[test]
    fn test_missing_key_is_error() {
        let config = ProviderConfig {
            api_key_env: "AUTOCREW_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            ..ProviderConfig::openai()
        };
        let err = ProviderClient::new(config).unwrap_err();
        assert!(err.contains("AUTOCREW_TEST_KEY_THAT_IS_NOT_SET"));
    }

    #[test]
    fn test_usage_accumulates() {
        let mut total = TokenUsage::default();
        total.add(TokenUsage { input: 10, output: 2 });
        total.add(TokenUsage { input: 5, output: 1 });
        assert_eq!(total, TokenUsage { input: 15, output: 3 });
    }
}
