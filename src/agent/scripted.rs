//! Scripted agent backend
//!
//! Replays canned replies per task id and records every call, so process
//! strategies and the feedback loop run deterministically without a model.
//! The last reply queued for a task repeats once the queue is drained.

use super::worker::{Agent, AgentBackend, ExecutionContext, ExecutionRequest};
use crate::crew::InputContext;
use crate::error::AgentExecutionError;
use crate::events::CrewEvent;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

/// One canned reaction to a task attempt
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Return this raw output
    Output(String),
    /// Fail the attempt with an `AgentExecutionError`
    Fail(String),
    /// Invoke a capability of the agent, then continue with `then`
    UseTool {
        tool: String,
        args: Value,
        then: Box<ScriptedReply>,
    },
    /// Cancel the run token while "in flight", then return this output
    CancelRun(String),
}

impl ScriptedReply {
    pub fn output(text: impl Into<String>) -> Self {
        Self::Output(text.into())
    }

    pub fn use_tool(tool: impl Into<String>, args: Value, then: ScriptedReply) -> Self {
        Self::UseTool {
            tool: tool.into(),
            args,
            then: Box::new(then),
        }
    }
}

/// A call observed by the scripted backend
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub agent: String,
    pub task_id: String,
    pub description: String,
    pub input_context: InputContext,
    /// Capability results, errors rendered as `Err(message)`
    pub tool_results: Vec<Result<String, String>>,
}

#[derive(Debug, Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue replies for `task_id`
    pub fn on<I>(self, task_id: impl Into<String>, replies: I) -> Self
    where
        I: IntoIterator<Item = ScriptedReply>,
    {
        self.scripts
            .lock()
            .entry(task_id.into())
            .or_default()
            .extend(replies);
        self
    }

    /// All calls so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Calls made for one task, in order
    pub fn calls_for(&self, task_id: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.task_id == task_id)
            .cloned()
            .collect()
    }

    fn next_reply(&self, task_id: &str) -> Option<ScriptedReply> {
        let mut scripts = self.scripts.lock();
        let queue = scripts.get_mut(task_id)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl AgentBackend for ScriptedBackend {
    async fn execute(
        &self,
        agent: &Agent,
        request: &ExecutionRequest,
        ctx: &ExecutionContext,
    ) -> Result<String, AgentExecutionError> {
        let mut reply = self.next_reply(&request.task_id);
        let mut tool_results = Vec::new();

        let result = loop {
            match reply {
                None => {
                    break Err(AgentExecutionError::new(format!(
                        "no scripted reply for task '{}'",
                        request.task_id
                    )))
                }
                Some(ScriptedReply::Output(text)) => break Ok(text),
                Some(ScriptedReply::Fail(message)) => break Err(AgentExecutionError::new(message)),
                Some(ScriptedReply::CancelRun(text)) => {
                    ctx.cancellation.cancel();
                    break Ok(text);
                }
                Some(ScriptedReply::UseTool { tool, args, then }) => {
                    let call_id = format!("call_{}", tool_results.len());
                    ctx.events.emit(CrewEvent::ToolCallStart {
                        agent: agent.id.clone(),
                        call_id: call_id.clone(),
                        tool: tool.clone(),
                        arguments: args.clone(),
                    });
                    let outcome = agent.invoke(&tool, args, ctx).await;
                    ctx.events.emit(CrewEvent::ToolCallEnd {
                        agent: agent.id.clone(),
                        call_id,
                        tool,
                        output: match &outcome {
                            Ok(out) => out.clone(),
                            Err(e) => e.message.clone(),
                        },
                        is_error: outcome.is_err(),
                        duration_ms: 0,
                    });
                    tool_results.push(outcome.map_err(|e| e.message));
                    reply = Some(*then);
                }
            }
        };

        self.calls.lock().push(RecordedCall {
            agent: agent.id.clone(),
            task_id: request.task_id.clone(),
            description: request.description.clone(),
            input_context: request.input_context.clone(),
            tool_results,
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tokio_util::sync::CancellationToken;

    fn request(task_id: &str) -> ExecutionRequest {
        ExecutionRequest {
            task_id: task_id.into(),
            description: "do it".into(),
            expected_output: "done".into(),
            input_context: InputContext::new(),
        }
    }

    #[tokio::test]
    async fn test_replays_in_order_and_repeats_last() {
        let backend = ScriptedBackend::new().on(
            "validate",
            [ScriptedReply::output("fail"), ScriptedReply::output("pass")],
        );
        let agent = Agent::new("v", "Validator", "Validate", "Strict");
        let ctx = ExecutionContext::new(PathBuf::from("/tmp"), CancellationToken::new());

        let mut outputs = Vec::new();
        for _ in 0..3 {
            outputs.push(backend.execute(&agent, &request("validate"), &ctx).await.unwrap());
        }
        assert_eq!(outputs, vec!["fail", "pass", "pass"]);
        assert_eq!(backend.calls_for("validate").len(), 3);
    }

    #[tokio::test]
    async fn test_unscripted_task_fails() {
        let backend = ScriptedBackend::new();
        let agent = Agent::new("v", "Validator", "Validate", "Strict");
        let ctx = ExecutionContext::new(PathBuf::from("/tmp"), CancellationToken::new());

        let err = backend.execute(&agent, &request("other"), &ctx).await.unwrap_err();
        assert!(err.0.contains("no scripted reply"));
        assert_eq!(backend.calls().len(), 1);
    }
}
