//! Error taxonomy for crew runs
//!
//! Capability and parse failures never reach this level: tools report
//! failures as data and unparseable output falls back to a canonical shape.
//! Everything here either aborts a run or is recorded in its outcome.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors that terminate a run
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CrewError {
    /// Missing or malformed agent/task definition. Raised before any task runs.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// An agent could not produce any output for a task
    #[error("agent '{agent}' failed on task '{task}': {message}")]
    AgentExecution {
        task: String,
        agent: String,
        message: String,
    },

    /// The manager could not (or did not validly) assign a task
    #[error("delegation error: {message}")]
    Delegation { message: String },

    /// Cancellation was observed at a task or capability boundary
    #[error("run cancelled")]
    Cancelled,
}

impl CrewError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn delegation(message: impl Into<String>) -> Self {
        Self::Delegation {
            message: message.into(),
        }
    }

    /// Short machine-friendly name, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            CrewError::Configuration { .. } => "configuration",
            CrewError::AgentExecution { .. } => "agent_execution",
            CrewError::Delegation { .. } => "delegation",
            CrewError::Cancelled => "cancelled",
        }
    }
}

/// A single capability invocation failed. Surfaced to the agent as text.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{tool}: {message}")]
pub struct CapabilityError {
    pub tool: String,
    pub message: String,
}

impl CapabilityError {
    pub fn new(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Returned by an agent backend when no output could be produced
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct AgentExecutionError(pub String);

impl AgentExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors while loading or validating crew configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("task '{task}' references unknown agent '{agent}'")]
    MissingAgent { task: String, agent: String },

    #[error("crew references unknown task '{0}'")]
    MissingTask(String),

    #[error("agent '{agent}' requests unknown tool '{tool}'")]
    UnknownTool { agent: String, tool: String },

    #[error("{0}")]
    Invalid(String),
}

impl From<ConfigError> for CrewError {
    fn from(err: ConfigError) -> Self {
        CrewError::configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_becomes_configuration() {
        let err: CrewError = ConfigError::MissingTask("validate".into()).into();
        assert_eq!(err.kind(), "configuration");
        assert!(err.to_string().contains("validate"));
    }

    #[test]
    fn test_crew_error_serializes_with_kind_tag() {
        let err = CrewError::AgentExecution {
            task: "integrate".into(),
            agent: "integrator".into(),
            message: "no output".into(),
        };
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["kind"], "agent_execution");
        assert_eq!(value["task"], "integrate");
    }
}
