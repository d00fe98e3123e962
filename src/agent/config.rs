//! Agent definitions as they appear in `agents.yaml`

use serde::{Deserialize, Serialize};

/// Per-agent model settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmOptions {
    /// Model override (uses provider default if None)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Temperature (0.0 - 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Max ReAct iterations before giving up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,
}

pub const DEFAULT_MAX_ITERATIONS: usize = 25;

impl LlmOptions {
    pub fn max_iterations(&self) -> usize {
        self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS)
    }
}

/// Configuration for an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Short job title, e.g. "Codebase Analyst"
    pub role: String,

    /// What the agent is trying to achieve
    pub goal: String,

    /// Behavioral brief that shapes how the agent works
    #[serde(alias = "backstory")]
    pub brief: String,

    /// Log every model reply at debug level
    #[serde(default)]
    pub verbose: bool,

    /// Whether the agent may hand work to other agents (manager only)
    #[serde(default, alias = "allowDelegation")]
    pub allow_delegation: bool,

    /// Capability names selected from the standard registry
    #[serde(default)]
    pub tools: Vec<String>,

    #[serde(default)]
    pub llm: LlmOptions,
}

impl AgentDefinition {
    pub fn new(role: impl Into<String>, goal: impl Into<String>, brief: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            goal: goal.into(),
            brief: brief.into(),
            verbose: false,
            allow_delegation: false,
            tools: Vec::new(),
            llm: LlmOptions::default(),
        }
    }

    /// Builder: set the capability names
    pub fn with_tools<S: Into<String>>(mut self, tools: impl IntoIterator<Item = S>) -> Self {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: allow delegation
    pub fn delegating(mut self) -> Self {
        self.allow_delegation = true;
        self
    }

    /// Builder: set temperature
    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.llm.temperature = Some(temp);
        self
    }

    /// Required text fields must be non-blank
    pub fn validate(&self, name: &str) -> Result<(), String> {
        for (field, value) in [("role", &self.role), ("goal", &self.goal), ("brief", &self.brief)] {
            if value.trim().is_empty() {
                return Err(format!("agent '{}' has an empty '{}'", name, field));
            }
        }
        if let Some(temp) = self.llm.temperature {
            if !(0.0..=2.0).contains(&temp) {
                return Err(format!("agent '{}' temperature {} is outside 0.0..=2.0", name, temp));
            }
        }
        if self.llm.max_iterations == Some(0) {
            return Err(format!("agent '{}' max_iterations must be at least 1", name));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backstory_alias_and_defaults() {
        let yaml = r#"
role: Codebase Analyst
goal: Understand the project
backstory: You read code carefully.
allowDelegation: true
tools: [list_directory, read_file]
"#;
        let def: AgentDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.brief, "You read code carefully.");
        assert!(def.allow_delegation);
        assert!(!def.verbose);
        assert_eq!(def.tools, vec!["list_directory", "read_file"]);
        assert_eq!(def.llm.max_iterations(), DEFAULT_MAX_ITERATIONS);
    }

    #[test]
    fn test_missing_required_key_is_parse_error() {
        let yaml = "role: Analyst\ngoal: Analyze\n";
        assert!(serde_yaml::from_str::<AgentDefinition>(yaml).is_err());
    }

    #[test]
    fn test_validate() {
        let def = AgentDefinition::new("Analyst", "Analyze", "Careful").with_temperature(0.2);
        assert!(def.validate("a").is_ok());

        let blank = AgentDefinition::new("Analyst", "  ", "Careful");
        assert!(blank.validate("a").unwrap_err().contains("'goal'"));

        let hot = AgentDefinition::new("Analyst", "Analyze", "Careful").with_temperature(3.0);
        assert!(hot.validate("a").is_err());
    }
}
