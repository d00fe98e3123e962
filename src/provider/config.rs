//! Provider configuration

use serde::{Deserialize, Serialize};

/// Configuration for an OpenAI-compatible chat endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Display name for the provider
    pub name: String,
    /// API base URL (e.g., "https://api.openai.com/v1")
    pub base_url: String,
    /// Environment variable holding the API key. Empty for keyless local servers.
    pub api_key_env: String,
    /// Model used when an agent does not name one
    pub default_model: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::openai()
    }
}

impl ProviderConfig {
    pub fn openai() -> Self {
        Self {
            name: "OpenAI".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            default_model: "gpt-4o".to_string(),
        }
    }

    pub fn openrouter() -> Self {
        Self {
            name: "OpenRouter".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            default_model: "openai/gpt-4o".to_string(),
        }
    }

    /// A local OpenAI-compatible server (LM Studio, vLLM, Ollama)
    pub fn local(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: "Local".to_string(),
            base_url: base_url.into(),
            api_key_env: String::new(),
            default_model: model.into(),
        }
    }

    /// Look up a preset by its lowercase name
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "openai" => Some(Self::openai()),
            "openrouter" => Some(Self::openrouter()),
            _ => None,
        }
    }

    pub fn requires_key(&self) -> bool {
        !self.api_key_env.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: ProviderConfig =
            serde_yaml::from_str("base_url: http://localhost:1234/v1\napi_key_env: ''\n").unwrap();
        assert_eq!(config.base_url, "http://localhost:1234/v1");
        assert_eq!(config.default_model, "gpt-4o");
        assert!(!config.requires_key());
    }

    #[test]
    fn test_presets() {
        assert_eq!(ProviderConfig::preset("OpenRouter").unwrap().name, "OpenRouter");
        assert!(ProviderConfig::preset("nope").is_none());
    }
}
