//! Managers for the hierarchical process
//!
//! A manager picks the next task from those the runner says are eligible.
//! The runner checks every assignment; a manager can reorder work but can
//! never skip, repeat, or reassign a task.

use super::parse::parse_structured;
use super::task::{InputContext, TaskResult};
use crate::agent::{Agent, AgentBackend, ExecutionContext, ExecutionRequest};
use crate::error::CrewError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Task id used for the manager's own backend calls
pub const DELEGATION_TASK: &str = "delegation";

/// A task the manager may choose
#[derive(Debug, Clone, Serialize)]
pub struct TaskBrief {
    pub task_id: String,
    pub agent_id: String,
    pub kind: String,
    pub expected_output: String,
}

/// What the manager sees when choosing
#[derive(Debug, Clone, Default)]
pub struct Board {
    pub eligible: Vec<TaskBrief>,
    pub completed: Vec<TaskResult>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub task_id: String,
    pub agent_id: String,
}

/// What to do after an agent failed a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    /// Try again, if the retry budget allows
    Retry,
    Abort,
}

#[async_trait]
pub trait Manager: Send + Sync {
    /// Choose the next task among `board.eligible`. `None` ends delegation;
    /// the runner then finishes any remaining tasks in list order.
    async fn next_assignment(
        &self,
        board: &Board,
        ctx: &ExecutionContext,
    ) -> Result<Option<Assignment>, CrewError>;

    async fn on_task_failure(&self, _task_id: &str, _error: &str) -> FailureDecision {
        FailureDecision::Retry
    }
}

/// Assigns eligible tasks in workflow order
#[derive(Debug, Default)]
pub struct OrderedManager;

#[async_trait]
impl Manager for OrderedManager {
    async fn next_assignment(
        &self,
        board: &Board,
        _ctx: &ExecutionContext,
    ) -> Result<Option<Assignment>, CrewError> {
        Ok(board.eligible.first().map(|t| Assignment {
            task_id: t.task_id.clone(),
            agent_id: t.agent_id.clone(),
        }))
    }
}

/// Asks the manager agent, through a backend, which task runs next
pub struct AgentManager {
    manager: Arc<Agent>,
    backend: Arc<dyn AgentBackend>,
}

impl AgentManager {
    pub fn new(manager: Arc<Agent>, backend: Arc<dyn AgentBackend>) -> Self {
        Self { manager, backend }
    }

    fn request(board: &Board) -> ExecutionRequest {
        let eligible = serde_json::to_string_pretty(&board.eligible).unwrap_or_default();
        let completed: Vec<&str> = board.completed.iter().map(|r| r.task_id.as_str()).collect();

        let description = format!(
            "You are coordinating the crew. Choose the single task that should run next.\n\n\
             Tasks that may run now:\n{}\n\n\
             Completed so far: {}\n\n\
             Assign each task to the agent listed with it.",
            eligible,
            if completed.is_empty() {
                "nothing yet".to_string()
            } else {
                completed.join(", ")
            }
        );

        ExecutionRequest {
            task_id: DELEGATION_TASK.to_string(),
            description,
            expected_output: r#"Only a JSON object: {"task": "<task id>", "agent": "<agent id>"}"#
                .to_string(),
            input_context: InputContext::new(),
        }
    }
}

/// Read `{"task": .., "agent": ..}` from a manager reply
pub fn parse_assignment(raw: &str, board: &Board) -> Result<Assignment, CrewError> {
    let value = parse_structured(raw)
        .ok_or_else(|| CrewError::delegation(format!("manager reply is not JSON: {}", raw.trim())))?;

    let task_id = value
        .get("task")
        .and_then(Value::as_str)
        .ok_or_else(|| CrewError::delegation("manager reply has no \"task\" field"))?;

    let brief = board
        .eligible
        .iter()
        .find(|t| t.task_id == task_id)
        .ok_or_else(|| CrewError::delegation(format!("manager chose ineligible task '{}'", task_id)))?;

    let agent_id = match value.get("agent").and_then(Value::as_str) {
        Some(agent) => agent.to_string(),
        None => brief.agent_id.clone(),
    };

    Ok(Assignment {
        task_id: task_id.to_string(),
        agent_id,
    })
}

#[async_trait]
impl Manager for AgentManager {
    async fn next_assignment(
        &self,
        board: &Board,
        ctx: &ExecutionContext,
    ) -> Result<Option<Assignment>, CrewError> {
        match board.eligible.as_slice() {
            [] => return Ok(None),
            [only] => {
                tracing::debug!(task = %only.task_id, "single eligible task, skipping manager call");
                return Ok(Some(Assignment {
                    task_id: only.task_id.clone(),
                    agent_id: only.agent_id.clone(),
                }));
            }
            _ => {}
        }

        let raw = self
            .backend
            .execute(&self.manager, &Self::request(board), ctx)
            .await
            .map_err(|e| CrewError::delegation(format!("manager '{}' failed: {}", self.manager.id, e)))?;

        parse_assignment(&raw, board).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ScriptedBackend, ScriptedReply};
    use std::path::PathBuf;
    use tokio_util::sync::CancellationToken;

    fn board() -> Board {
        let brief = |task: &str, agent: &str| TaskBrief {
            task_id: task.into(),
            agent_id: agent.into(),
            kind: "analysis".into(),
            expected_output: "JSON".into(),
        };
        Board {
            eligible: vec![brief("analyze_requirements", "req"), brief("analyze_codebase", "code")],
            completed: vec![],
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(PathBuf::from("/work"), CancellationToken::new())
    }

    fn manager_agent() -> Arc<Agent> {
        Arc::new(Agent::new("boss", "Manager", "Coordinate", "Delegates").with_delegation(true))
    }

    #[test]
    fn test_parse_assignment() {
        let board = board();
        let ok = parse_assignment("```json\n{\"task\": \"analyze_codebase\", \"agent\": \"code\"}\n```", &board)
            .unwrap();
        assert_eq!(ok.task_id, "analyze_codebase");

        let defaulted = parse_assignment(r#"{"task": "analyze_requirements"}"#, &board).unwrap();
        assert_eq!(defaulted.agent_id, "req");

        assert!(matches!(
            parse_assignment("run the codebase one", &board),
            Err(CrewError::Delegation { .. })
        ));
        assert!(matches!(
            parse_assignment(r#"{"task": "deploy"}"#, &board),
            Err(CrewError::Delegation { .. })
        ));
    }

    #[tokio::test]
    async fn test_ordered_manager_takes_first() {
        let assignment = OrderedManager.next_assignment(&board(), &ctx()).await.unwrap().unwrap();
        assert_eq!(assignment.task_id, "analyze_requirements");
    }

    #[tokio::test]
    async fn test_agent_manager_asks_backend() {
        let backend = Arc::new(ScriptedBackend::new().on(
            DELEGATION_TASK,
            [ScriptedReply::output(r#"{"task": "analyze_codebase", "agent": "code"}"#)],
        ));
        let manager = AgentManager::new(manager_agent(), backend.clone());

        let assignment = manager.next_assignment(&board(), &ctx()).await.unwrap().unwrap();
        assert_eq!(assignment.task_id, "analyze_codebase");
        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].agent, "boss");
        assert!(calls[0].description.contains("analyze_requirements"));
    }

    #[tokio::test]
    async fn test_agent_manager_failure_is_delegation_error() {
        let backend = Arc::new(ScriptedBackend::new());
        let manager = AgentManager::new(manager_agent(), backend);
        let err = manager.next_assignment(&board(), &ctx()).await.unwrap_err();
        assert_eq!(err.kind(), "delegation");
    }
}
