//! Agents and the execution contract
//!
//! An `Agent` is immutable once built and shared between tasks as
//! `Arc<Agent>`. How it turns a request into text is the business of an
//! `AgentBackend`; the runner only sees `execute`.

use super::config::{AgentDefinition, LlmOptions};
use crate::crew::InputContext;
use crate::error::{AgentExecutionError, CapabilityError};
use crate::events::EventSink;
use crate::tool::{ToolContext, ToolRegistry};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// A named role with a goal, a brief, and a closed capability set
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: String,
    pub role: String,
    pub goal: String,
    pub brief: String,
    pub can_delegate: bool,
    pub verbose: bool,
    pub llm: LlmOptions,
    capabilities: ToolRegistry,
}

impl Agent {
    pub fn new(
        id: impl Into<String>,
        role: impl Into<String>,
        goal: impl Into<String>,
        brief: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            goal: goal.into(),
            brief: brief.into(),
            can_delegate: false,
            verbose: false,
            llm: LlmOptions::default(),
            capabilities: ToolRegistry::new(),
        }
    }

    /// Build an agent from its YAML definition, selecting its tools from
    /// `available`. Returns the first unknown tool name as the error.
    pub fn from_definition(
        id: &str,
        def: &AgentDefinition,
        available: &ToolRegistry,
    ) -> Result<Self, String> {
        let capabilities = available.select(&def.tools)?;
        Ok(Self {
            id: id.to_string(),
            role: def.role.clone(),
            goal: def.goal.clone(),
            brief: def.brief.clone(),
            can_delegate: def.allow_delegation,
            verbose: def.verbose,
            llm: def.llm.clone(),
            capabilities,
        })
    }

    pub fn with_capabilities(mut self, capabilities: ToolRegistry) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_delegation(mut self, can_delegate: bool) -> Self {
        self.can_delegate = can_delegate;
        self
    }

    pub fn capabilities(&self) -> &ToolRegistry {
        &self.capabilities
    }

    /// Invoke one of this agent's capabilities. Tools outside the agent's
    /// set are reported like any other capability failure.
    pub async fn invoke(
        &self,
        tool: &str,
        args: Value,
        ctx: &ExecutionContext,
    ) -> Result<String, CapabilityError> {
        let tool_ctx = ToolContext::new(ctx.project_root.clone(), ctx.cancellation.clone());
        self.capabilities.invoke(tool, args, &tool_ctx).await
    }
}

/// Everything an agent needs to work on one task attempt
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub task_id: String,
    /// Task description with the input context already rendered in
    pub description: String,
    pub expected_output: String,
    pub input_context: InputContext,
}

/// Run-scoped collaborators handed to the backend
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub project_root: PathBuf,
    pub cancellation: CancellationToken,
    pub events: EventSink,
}

impl ExecutionContext {
    pub fn new(project_root: PathBuf, cancellation: CancellationToken) -> Self {
        Self {
            project_root,
            cancellation,
            events: EventSink::none(),
        }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Turns an agent plus a task request into raw output text
#[async_trait]
pub trait AgentBackend: Send + Sync {
    async fn execute(
        &self,
        agent: &Agent,
        request: &ExecutionRequest,
        ctx: &ExecutionContext,
    ) -> Result<String, AgentExecutionError>;
}
