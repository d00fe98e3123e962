//! LLM agent backend - the ReAct loop
//!
//! 1. Call the LLM with the agent's tools advertised
//! 2. Execute tool calls against the agent's capability set
//! 3. Repeat until a text-only reply, the iteration limit, or cancellation
//!
//! It knows nothing about tasks, processes, or feedback cycles. That is the
//! runner's job.

use super::prompt::{task_message, Templates};
use super::worker::{Agent, AgentBackend, ExecutionContext, ExecutionRequest};
use crate::error::AgentExecutionError;
use crate::events::CrewEvent;
use crate::provider::{ChatOptions, ProviderClient, TokenUsage};
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

/// If this many consecutive tool calls share a name and identical
/// arguments, the model is stuck
const DOOM_LOOP_THRESHOLD: usize = 3;

/// Tracks recent tool calls for doom loop detection
#[derive(Debug, Clone, PartialEq)]
struct ToolCallRecord {
    name: String,
    args_hash: u64,
}

impl ToolCallRecord {
    fn new(name: &str, args: &serde_json::Value) -> Self {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        serde_json::to_string(args).unwrap_or_default().hash(&mut hasher);
        Self {
            name: name.to_string(),
            args_hash: hasher.finish(),
        }
    }
}

fn is_doom_loop(recent_calls: &VecDeque<ToolCallRecord>) -> bool {
    if recent_calls.len() < DOOM_LOOP_THRESHOLD {
        return false;
    }
    let mut calls = recent_calls.iter().rev().take(DOOM_LOOP_THRESHOLD);
    match calls.next() {
        Some(first) => calls.all(|c| c == first),
        None => false,
    }
}

/// Per-iteration trace, only for agents marked `verbose`
fn log_iteration(agent: &Agent, task_id: &str, iteration: usize, tool_calls: usize, usage: TokenUsage) {
    if !agent.verbose {
        return;
    }
    tracing::debug!(
        agent = %agent.id,
        task = %task_id,
        iteration,
        tool_calls,
        input_tokens = usage.input,
        output_tokens = usage.output,
        "model replied"
    );
}

fn build_err(e: impl std::fmt::Display) -> AgentExecutionError {
    AgentExecutionError::new(format!("failed to build message: {}", e))
}

/// Agent backend that drives an OpenAI-compatible chat endpoint
pub struct LlmBackend {
    provider: Arc<ProviderClient>,
    templates: Arc<Templates>,
}

impl LlmBackend {
    pub fn new(provider: Arc<ProviderClient>) -> Self {
        Self {
            provider,
            templates: Arc::new(Templates::new()),
        }
    }

    pub fn with_templates(mut self, templates: Arc<Templates>) -> Self {
        self.templates = templates;
        self
    }

    fn initial_messages(
        &self,
        agent: &Agent,
        request: &ExecutionRequest,
    ) -> Result<Vec<ChatCompletionRequestMessage>, AgentExecutionError> {
        let system = self
            .templates
            .system_prompt(agent)
            .map_err(AgentExecutionError::new)?;

        Ok(vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()
                    .map_err(build_err)?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(task_message(request))
                    .build()
                    .map_err(build_err)?,
            ),
        ])
    }
}

#[async_trait]
impl AgentBackend for LlmBackend {
    async fn execute(
        &self,
        agent: &Agent,
        request: &ExecutionRequest,
        ctx: &ExecutionContext,
    ) -> Result<String, AgentExecutionError> {
        let max_iterations = agent.llm.max_iterations();
        let options = ChatOptions {
            model: agent.llm.model.clone(),
            temperature: agent.llm.temperature,
        };
        let tools = agent.capabilities().to_openai_tools();

        let mut messages = self.initial_messages(agent, request)?;
        let mut total_usage = TokenUsage::default();
        let mut recent_tool_calls: VecDeque<ToolCallRecord> =
            VecDeque::with_capacity(DOOM_LOOP_THRESHOLD + 1);

        for iteration in 0..max_iterations {
            if ctx.is_cancelled() {
                return Err(AgentExecutionError::new("cancelled"));
            }

            let reply = self
                .provider
                .chat(messages.clone(), tools.clone(), &options)
                .await
                .map_err(AgentExecutionError::new)?;
            total_usage.add(reply.usage);
            log_iteration(agent, &request.task_id, iteration + 1, reply.tool_calls.len(), reply.usage);

            // No tool calls = done
            if reply.tool_calls.is_empty() {
                tracing::debug!(
                    agent = %agent.id,
                    task = %request.task_id,
                    iterations = iteration + 1,
                    input_tokens = total_usage.input,
                    output_tokens = total_usage.output,
                    "agent finished"
                );
                return reply.text.ok_or_else(|| {
                    AgentExecutionError::new("model returned neither text nor tool calls")
                });
            }

            let mut assistant = ChatCompletionRequestAssistantMessageArgs::default();
            assistant.tool_calls(reply.tool_calls.clone());
            if let Some(text) = &reply.text {
                assistant.content(text.clone());
            }
            messages.push(ChatCompletionRequestMessage::Assistant(
                assistant.build().map_err(build_err)?,
            ));

            for call in reply.tool_calls {
                if ctx.is_cancelled() {
                    return Err(AgentExecutionError::new("cancelled"));
                }

                let tool_name = call.function.name;
                let args: serde_json::Value = serde_json::from_str(&call.function.arguments)
                    .unwrap_or(serde_json::json!({}));

                recent_tool_calls.push_back(ToolCallRecord::new(&tool_name, &args));
                if recent_tool_calls.len() > DOOM_LOOP_THRESHOLD {
                    recent_tool_calls.pop_front();
                }

                ctx.events.emit(CrewEvent::ToolCallStart {
                    agent: agent.id.clone(),
                    call_id: call.id.clone(),
                    tool: tool_name.clone(),
                    arguments: args.clone(),
                });
                let start = Instant::now();

                let (output, is_error) = if is_doom_loop(&recent_tool_calls) {
                    // Give the model a fresh chance after telling it
                    recent_tool_calls.clear();
                    let message = format!(
                        "Loop detected: '{}' called {} times with identical arguments. \
                         Try a different approach or give your final answer.",
                        tool_name, DOOM_LOOP_THRESHOLD
                    );
                    (message, true)
                } else {
                    match agent.invoke(&tool_name, args, ctx).await {
                        Ok(output) => (output, false),
                        Err(e) => (format!("Error: {}", e.message), true),
                    }
                };

                let duration_ms = start.elapsed().as_millis() as u64;
                if is_error {
                    tracing::debug!(agent = %agent.id, tool = %tool_name, error = %output, "capability error returned to agent");
                }
                ctx.events.emit(CrewEvent::ToolCallEnd {
                    agent: agent.id.clone(),
                    call_id: call.id.clone(),
                    tool: tool_name,
                    output: output.clone(),
                    is_error,
                    duration_ms,
                });

                messages.push(ChatCompletionRequestMessage::Tool(
                    ChatCompletionRequestToolMessageArgs::default()
                        .content(output)
                        .tool_call_id(call.id)
                        .build()
                        .map_err(build_err)?,
                ));
            }
        }

        Err(AgentExecutionError::new(format!(
            "no final answer after {} iterations",
            max_iterations
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_doom_loop_detection() {
        let mut calls = VecDeque::new();
        calls.push_back(ToolCallRecord::new("read_file", &json!({"path": "a.py"})));
        calls.push_back(ToolCallRecord::new("read_file", &json!({"path": "a.py"})));
        assert!(!is_doom_loop(&calls));

        calls.push_back(ToolCallRecord::new("read_file", &json!({"path": "a.py"})));
        assert!(is_doom_loop(&calls));

        calls.pop_back();
        calls.push_back(ToolCallRecord::new("read_file", &json!({"path": "b.py"})));
        assert!(!is_doom_loop(&calls));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn logged_iteration(agent: &Agent) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let usage = TokenUsage { input: 120, output: 30 };
        tracing::subscriber::with_default(subscriber, || log_iteration(agent, "analyze", 2, 1, usage));
        let bytes = captured.0.lock().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_iteration_trace_follows_verbose_flag() {
        let mut agent = Agent::new("analyst", "Analyst", "Analyze", "Careful");
        assert!(logged_iteration(&agent).is_empty());

        agent.verbose = true;
        let line = logged_iteration(&agent);
        assert!(line.contains("model replied"));
        assert!(line.contains("iteration=2"));
        assert!(line.contains("input_tokens=120"));
    }

    #[test]
    fn test_initial_messages() {
        let provider = ProviderClient::new(crate::provider::ProviderConfig::local(
            "http://localhost:1234/v1",
            "local-model",
        ))
        .unwrap();
        let backend = LlmBackend::new(Arc::new(provider));
        let agent = Agent::new("analyst", "Analyst", "Analyze", "Careful");
        let request = ExecutionRequest {
            task_id: "analyze".into(),
            description: "Look at /work/app".into(),
            expected_output: "A JSON report".into(),
            input_context: Default::default(),
        };

        let messages = backend.initial_messages(&agent, &request).unwrap();
        assert_eq!(messages.len(), 2);
        let user = serde_json::to_value(&messages[1]).unwrap();
        assert_eq!(user["role"], "user");
        assert_eq!(user["content"], "Look at /work/app\n\nExpected output:\nA JSON report");
    }
}
