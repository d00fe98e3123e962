//! Process-wide settings and run policy
//!
//! Loaded once at startup from `settings.yaml` and passed explicitly to the
//! runner. Nothing here is re-read mid-run.

use crate::error::ConfigError;
use crate::provider::ProviderConfig;
use crate::tools::DEFAULT_SEARCH_URL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SETTINGS_FILE: &str = "settings.yaml";

/// Bounds on a single run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunPolicy {
    /// Validate/revise cycles before the run completes with warnings
    pub iteration_cap: u32,
    /// Extra attempts for a task whose agent failed (hierarchical only)
    pub max_task_retries: u32,
    /// Wall-clock limit for the whole run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            iteration_cap: 3,
            max_task_retries: 1,
            deadline_secs: None,
        }
    }
}

/// Partial policy from `crew.yaml` or the command line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_cap: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_task_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
}

impl RunPolicy {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    /// Layer `overrides` on top of this policy
    pub fn apply(mut self, overrides: &PolicyOverrides) -> Self {
        if let Some(cap) = overrides.iteration_cap {
            self.iteration_cap = cap;
        }
        if let Some(retries) = overrides.max_task_retries {
            self.max_task_retries = retries;
        }
        if let Some(secs) = overrides.deadline_secs {
            self.deadline_secs = Some(secs);
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iteration_cap < 1 {
            return Err(ConfigError::Invalid("iteration_cap must be at least 1".into()));
        }
        if self.deadline_secs == Some(0) {
            return Err(ConfigError::Invalid("deadline_secs must be positive".into()));
        }
        Ok(())
    }
}

/// Main settings for the binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// LLM provider configuration
    pub provider: ProviderConfig,

    /// Directory for JSON log files
    pub log_dir: PathBuf,

    /// Enable verbose logging
    pub verbose: bool,

    /// OTLP HTTP endpoint; span export is off when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otel_endpoint: Option<String>,

    /// SearXNG instance for the web_search tool
    pub search_url: String,

    /// Default run policy
    pub policy: RunPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            log_dir: PathBuf::from(".autocrew_logs"),
            verbose: false,
            otel_endpoint: None,
            search_url: DEFAULT_SEARCH_URL.to_string(),
            policy: RunPolicy::default(),
        }
    }
}

impl Settings {
    /// Load settings from an explicit YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.policy.validate()?;
        Ok(settings)
    }

    /// `settings.yaml` in `config_dir` if given and present, else the user
    /// config dir, else defaults
    pub fn discover(config_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let candidates = [
            config_dir.map(|d| d.join(SETTINGS_FILE)),
            dirs::config_dir().map(|d| d.join("autocrew").join(SETTINGS_FILE)),
        ];

        for path in candidates.into_iter().flatten() {
            if path.is_file() {
                tracing::debug!(path = %path.display(), "loading settings");
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    /// Set verbose logging
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_policy_defaults_and_overrides() {
        let policy = RunPolicy::default();
        assert_eq!(policy.iteration_cap, 3);
        assert_eq!(policy.max_task_retries, 1);
        assert!(policy.deadline().is_none());

        let tuned = policy.apply(&PolicyOverrides {
            iteration_cap: Some(5),
            deadline_secs: Some(60),
            ..Default::default()
        });
        assert_eq!(tuned.iteration_cap, 5);
        assert_eq!(tuned.max_task_retries, 1);
        assert_eq!(tuned.deadline(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_policy_validation() {
        let zero_cap = RunPolicy {
            iteration_cap: 0,
            ..Default::default()
        };
        assert!(zero_cap.validate().is_err());
        assert!(RunPolicy::default().validate().is_ok());
    }

    #[test]
    fn test_load_partial_settings() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(SETTINGS_FILE),
            "provider:\n  base_url: http://localhost:1234/v1\n  api_key_env: ''\npolicy:\n  iteration_cap: 2\n",
        )
        .unwrap();

        let settings = Settings::discover(Some(temp.path())).unwrap();
        assert_eq!(settings.provider.base_url, "http://localhost:1234/v1");
        assert_eq!(settings.policy.iteration_cap, 2);
        assert_eq!(settings.policy.max_task_retries, 1);
        assert_eq!(settings.search_url, DEFAULT_SEARCH_URL);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SETTINGS_FILE);
        std::fs::write(&path, "policy:\n  iteration_cap: 0\n").unwrap();
        assert!(Settings::load(&path).is_err());

        std::fs::write(&path, "verbose: [nope\n").unwrap();
        assert!(matches!(Settings::load(&path), Err(ConfigError::Parse { .. })));
    }
}
