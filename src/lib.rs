//! autocrew - workflow orchestration for cooperating LLM agents
//!
//! This crate provides:
//! - Agents with a role, a goal and a fixed capability set
//! - Sequential pipelines and manager-delegated (hierarchical) crews
//! - A bounded validate/revise feedback loop between integration and validation
//! - YAML crew definitions and a built-in codebase integration crew
//! - An OpenAI-compatible LLM backend and a scripted backend for tests

pub mod config;
pub mod error;
pub mod telemetry;

// Agent system
pub mod agent;
pub mod crew;
pub mod events;
pub mod provider;
pub mod tool;
pub mod tools;

pub use config::{PolicyOverrides, RunPolicy, Settings};
pub use error::{AgentExecutionError, CapabilityError, ConfigError, CrewError};
pub use telemetry::Telemetry;

pub use agent::{Agent, AgentBackend, ExecutionContext, ExecutionRequest, LlmBackend, ScriptedBackend, ScriptedReply};
pub use crew::{
    AgentManager, CrewConfig, CrewRunner, Manager, OrderedManager, Process, RunOutcome, RunStatus, Task,
    TaskKind, TaskResult, Workflow,
};
pub use events::{CrewEvent, EventSink};
pub use provider::{ProviderClient, ProviderConfig};
pub use tool::{Tool, ToolRegistry};
