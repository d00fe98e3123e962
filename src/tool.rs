//! Capability (tool) system
//!
//! Tools implement the `Tool` trait and are collected into a `ToolRegistry`.
//! Each agent owns a closed registry selected at construction; the runner never
//! looks inside it.

use crate::error::CapabilityError;
use async_trait::async_trait;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Tool definition for LLM (matches OpenAI format)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Result of a tool execution
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub output: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            output: message.into(),
            is_error: true,
        }
    }

    /// Convert into the capability contract: text or a `CapabilityError` value
    pub fn into_capability(self, tool: &str) -> Result<String, CapabilityError> {
        if self.is_error {
            Err(CapabilityError::new(tool, self.output))
        } else {
            Ok(self.output)
        }
    }
}

/// Context passed to tools during execution
#[derive(Clone)]
pub struct ToolContext {
    pub working_dir: PathBuf,
    pub cancellation: CancellationToken,
}

impl ToolContext {
    pub fn new(working_dir: PathBuf, cancellation: CancellationToken) -> Self {
        Self {
            working_dir,
            cancellation,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (used for dispatch)
    fn name(&self) -> &str;

    /// Get the tool definition for LLM
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with given arguments.
    ///
    /// Failures must come back as `ToolResult::error`, never as a panic.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult;
}

/// JSON schema for a tool's argument struct, without the meta keys
/// chat-completion endpoints reject.
pub fn parameters_schema<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({}));
    if let Value::Object(map) = &mut value {
        map.remove("$schema");
        map.remove("title");
    }
    value
}

/// Ordered, closed set of tools
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List all tool names, in registration order
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Build a sub-registry holding only `names`.
    ///
    /// Returns the first unknown name as the error.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<ToolRegistry, String> {
        let mut selected = ToolRegistry::new();
        for name in names {
            let name = name.as_ref();
            let tool = self.get(name).ok_or_else(|| name.to_string())?;
            selected.register_arc(tool);
        }
        Ok(selected)
    }

    /// Get all tool definitions (for LLM)
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Convert to OpenAI ChatCompletionTool format
    pub fn to_openai_tools(&self) -> Vec<async_openai::types::ChatCompletionTool> {
        self.tools
            .values()
            .map(|t| {
                let def = t.definition();
                async_openai::types::ChatCompletionTool {
                    r#type: async_openai::types::ChatCompletionToolType::Function,
                    function: async_openai::types::FunctionObject {
                        name: def.name,
                        description: Some(def.description),
                        parameters: Some(def.parameters),
                        strict: None,
                    },
                }
            })
            .collect()
    }

    /// Invoke a capability by name. Unknown tools are a capability error too.
    pub async fn invoke(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<String, CapabilityError> {
        if ctx.is_cancelled() {
            return Err(CapabilityError::new(name, "Cancelled"));
        }
        match self.get(name) {
            Some(tool) => tool.execute(args, ctx).await.into_capability(name),
            None => Err(CapabilityError::new(name, format!("Unknown tool: {}", name))),
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.tools.keys()).finish()
    }
}
