//! Crew runner - executes a `Workflow` under its process strategy
//!
//! - Sequential: tasks in list order, each seeing the previous result as
//!   `priorOutput`. Any agent failure ends the run.
//! - Hierarchical: a `Manager` picks the order among eligible tasks. After a
//!   validation task reports `fail`, the integration task it validates runs
//!   again with the report as `revisionNotes`, then validation runs again,
//!   until `pass` or the policy's iteration cap.
//!
//! Tasks never overlap. Cancellation is checked before every task, so an
//! in-flight agent call finishes but nothing new starts.

use super::manager::{Assignment, Board, FailureDecision, Manager, OrderedManager, TaskBrief};
use super::outcome::{RunOutcome, RunStatus, TaskRecord};
use super::task::{
    InputContext, Task, TaskResult, ValidationStatus, COMPLETED_OUTPUTS, PRIOR_OUTPUT,
    REVISION_NOTES,
};
use super::workflow::{Process, Workflow};
use crate::agent::{AgentBackend, ExecutionContext, ExecutionRequest, Templates};
use crate::config::RunPolicy;
use crate::error::CrewError;
use crate::events::{CrewEvent, EventSink};
use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Mutable bookkeeping for one run
#[derive(Debug, Default)]
struct RunState {
    history: Vec<TaskRecord>,
    warnings: Vec<String>,
    attempts: HashMap<String, u32>,
    final_result: Option<TaskResult>,
    validation_report: Option<TaskResult>,
}

impl RunState {
    fn next_attempt(&mut self, task_id: &str) -> u32 {
        let counter = self.attempts.entry(task_id.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }
}

pub struct CrewRunner {
    backend: Arc<dyn AgentBackend>,
    manager: Option<Arc<dyn Manager>>,
    policy: RunPolicy,
    templates: Arc<Templates>,
    events: EventSink,
    cancellation: CancellationToken,
}

impl CrewRunner {
    pub fn new(backend: Arc<dyn AgentBackend>, policy: RunPolicy) -> Self {
        Self {
            backend,
            manager: None,
            policy,
            templates: Arc::new(Templates::new()),
            events: EventSink::none(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Manager for hierarchical workflows. Defaults to `OrderedManager`.
    pub fn with_manager(mut self, manager: Arc<dyn Manager>) -> Self {
        self.manager = Some(manager);
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Use an externally owned token (e.g. wired to Ctrl-C)
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_templates(mut self, templates: Arc<Templates>) -> Self {
        self.templates = templates;
        self
    }

    /// Cancelling this token stops the run at the next task boundary
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn policy(&self) -> &RunPolicy {
        &self.policy
    }

    /// Execute `workflow`. Always returns an outcome, with the history
    /// collected so far when the run fails or is cancelled.
    pub async fn run(&self, workflow: &Workflow) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let token = self.cancellation.child_token();
        let deadline_timer = self.policy.deadline().map(|deadline| {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                token.cancel();
            })
        });

        let ctx = ExecutionContext::new(workflow.project_path().to_path_buf(), token.clone())
            .with_events(self.events.clone());
        let mut state = RunState::default();

        self.events.emit(CrewEvent::RunStart {
            run_id: run_id.to_string(),
            process: workflow.process().to_string(),
            tasks: workflow.task_ids(),
        });
        tracing::info!(
            run_id = %run_id,
            process = %workflow.process(),
            tasks = workflow.tasks().len(),
            project = %workflow.project_path().display(),
            "crew run starting"
        );

        let span = tracing::info_span!("crew_run", run_id = %run_id);
        let result = match workflow.process() {
            Process::Sequential => {
                self.run_sequential(workflow, &ctx, &mut state)
                    .instrument(span)
                    .await
            }
            Process::Hierarchical => {
                self.run_hierarchical(workflow, &ctx, &mut state)
                    .instrument(span)
                    .await
            }
        };

        if let Some(timer) = deadline_timer {
            timer.abort();
        }
        if token.is_cancelled() && !self.cancellation.is_cancelled() {
            if let Some(secs) = self.policy.deadline_secs {
                state.warn(format!("run deadline of {}s exceeded", secs));
            }
        }

        let (status, error) = match result {
            Ok(()) if state.warnings.is_empty() => (RunStatus::Completed, None),
            Ok(()) => (RunStatus::CompletedWithWarnings, None),
            Err(CrewError::Cancelled) => {
                self.events.emit(CrewEvent::Cancelled {
                    run_id: run_id.to_string(),
                });
                (RunStatus::Cancelled, Some(CrewError::Cancelled))
            }
            Err(e) => {
                tracing::error!(run_id = %run_id, kind = e.kind(), error = %e, "crew run failed");
                (RunStatus::Failed, Some(e))
            }
        };

        self.events.emit(CrewEvent::RunComplete {
            run_id: run_id.to_string(),
            status: status.as_str().to_string(),
        });
        tracing::info!(
            run_id = %run_id,
            status = status.as_str(),
            attempts = state.history.len(),
            warnings = state.warnings.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "crew run finished"
        );

        RunOutcome {
            run_id,
            status,
            final_result: state.final_result,
            warnings: state.warnings,
            validation_report: state.validation_report,
            error,
            history: state.history,
        }
    }

    async fn run_sequential(
        &self,
        workflow: &Workflow,
        ctx: &ExecutionContext,
        state: &mut RunState,
    ) -> Result<(), CrewError> {
        let mut prior: Option<TaskResult> = None;

        for task in workflow.tasks() {
            let mut extra = InputContext::new();
            if let Some(prior) = &prior {
                extra.insert(PRIOR_OUTPUT.to_string(), prior.to_value());
            }

            let result = self.dispatch(task, extra, 1, ctx, state).await?;
            if task.validates().is_some() {
                state.validation_report = Some(result.clone());
            }
            prior = Some(result);
        }
        Ok(())
    }

    async fn run_hierarchical(
        &self,
        workflow: &Workflow,
        ctx: &ExecutionContext,
        state: &mut RunState,
    ) -> Result<(), CrewError> {
        let manager: Arc<dyn Manager> = match &self.manager {
            Some(m) => m.clone(),
            None => {
                tracing::debug!("no manager configured, assigning tasks in order");
                Arc::new(OrderedManager)
            }
        };

        let mut executed: HashSet<String> = HashSet::new();
        let mut completed: IndexMap<String, TaskResult> = IndexMap::new();
        let mut delegating = true;

        loop {
            if ctx.is_cancelled() {
                return Err(CrewError::Cancelled);
            }

            let eligible: Vec<&Task> = workflow
                .tasks()
                .iter()
                .filter(|t| !executed.contains(&t.id))
                .filter(|t| t.validates().map_or(true, |target| executed.contains(target)))
                .collect();
            let Some(first_eligible) = eligible.first().copied() else {
                break;
            };

            let task = if delegating {
                let board = Board {
                    eligible: eligible.iter().map(|t| brief(t)).collect(),
                    completed: completed.values().cloned().collect(),
                };
                let choice = manager.next_assignment(&board, ctx).await;
                if ctx.is_cancelled() {
                    return Err(CrewError::Cancelled);
                }
                match choice? {
                    Some(assignment) => {
                        let task = check_assignment(workflow, &eligible, &executed, &assignment)?;
                        self.events.emit(CrewEvent::Delegated {
                            task: task.id.clone(),
                            agent: task.agent.id.clone(),
                        });
                        tracing::info!(task = %task.id, agent = %task.agent.id, "delegated");
                        task
                    }
                    None => {
                        delegating = false;
                        state.warn(format!(
                            "manager stopped delegating with {} task(s) left; running them in order",
                            workflow.tasks().len() - executed.len()
                        ));
                        first_eligible
                    }
                }
            } else {
                first_eligible
            };

            let extra = completed_context(&completed);
            let result = self
                .dispatch_with_retries(task, extra, 1, manager.as_ref(), ctx, state)
                .await?;
            executed.insert(task.id.clone());
            completed.insert(task.id.clone(), result.clone());

            if let Some(target) = task.validates() {
                let integration = workflow.task(target).ok_or_else(|| {
                    CrewError::configuration(format!("unknown integration task '{}'", target))
                })?;
                self.feedback_loop(integration, task, result, manager.as_ref(), &mut completed, ctx, state)
                    .await?;
            }
        }
        Ok(())
    }

    /// Revise and re-validate until the report passes or the cap is reached.
    /// `report` is the validation result of the first cycle.
    #[allow(clippy::too_many_arguments)]
    async fn feedback_loop(
        &self,
        integration: &Task,
        validation: &Task,
        mut report: TaskResult,
        manager: &dyn Manager,
        completed: &mut IndexMap<String, TaskResult>,
        ctx: &ExecutionContext,
        state: &mut RunState,
    ) -> Result<(), CrewError> {
        let cap = self.policy.iteration_cap.max(1);
        let mut cycle = 1;

        loop {
            state.validation_report = Some(report.clone());
            match report.validation_status() {
                Some(ValidationStatus::Pass) => {
                    tracing::info!(task = %validation.id, cycle, "validation passed");
                    return Ok(());
                }
                None => {
                    state.warn(format!(
                        "validation task '{}' reported no pass/fail status; treating it as pass",
                        validation.id
                    ));
                    return Ok(());
                }
                Some(ValidationStatus::Fail) if cycle >= cap => {
                    state.warn(format!(
                        "validation of '{}' still failing after {} cycle(s); giving up",
                        integration.id, cap
                    ));
                    return Ok(());
                }
                Some(ValidationStatus::Fail) => {}
            }

            if ctx.is_cancelled() {
                return Err(CrewError::Cancelled);
            }
            cycle += 1;
            tracing::info!(integration = %integration.id, validation = %validation.id, cycle, "validation failed, revising");
            self.events.emit(CrewEvent::FeedbackCycle {
                integration: integration.id.clone(),
                validation: validation.id.clone(),
                cycle,
            });

            let mut extra = completed_context(completed);
            extra.insert(REVISION_NOTES.to_string(), report.to_value());
            let revised = self
                .dispatch_with_retries(integration, extra, cycle, manager, ctx, state)
                .await?;
            completed.insert(integration.id.clone(), revised);

            let extra = completed_context(completed);
            report = self
                .dispatch_with_retries(validation, extra, cycle, manager, ctx, state)
                .await?;
            completed.insert(validation.id.clone(), report.clone());
        }
    }

    /// Dispatch, retrying agent failures while the manager and the retry
    /// budget allow
    async fn dispatch_with_retries(
        &self,
        task: &Task,
        extra: InputContext,
        cycle: u32,
        manager: &dyn Manager,
        ctx: &ExecutionContext,
        state: &mut RunState,
    ) -> Result<TaskResult, CrewError> {
        let mut retries = 0;
        loop {
            let err = match self.attempt(task, extra.clone(), cycle, ctx, state).await {
                Ok(result) => return Ok(result),
                Err(AttemptError { error, retryable: false }) => return Err(error),
                Err(AttemptError { error, .. }) => error,
            };
            let message = match &err {
                CrewError::AgentExecution { message, .. } => message.clone(),
                _ => return Err(err),
            };
            if retries >= self.policy.max_task_retries {
                return Err(err);
            }
            if manager.on_task_failure(&task.id, &message).await == FailureDecision::Abort {
                tracing::info!(task = %task.id, "manager aborted after agent failure");
                return Err(err);
            }
            retries += 1;
            tracing::warn!(task = %task.id, retry = retries, error = %message, "retrying task");
        }
    }

    /// Run one attempt of `task` and record it in the history
    async fn dispatch(
        &self,
        task: &Task,
        extra: InputContext,
        cycle: u32,
        ctx: &ExecutionContext,
        state: &mut RunState,
    ) -> Result<TaskResult, CrewError> {
        self.attempt(task, extra, cycle, ctx, state)
            .await
            .map_err(|e| e.error)
    }

    async fn attempt(
        &self,
        task: &Task,
        extra: InputContext,
        cycle: u32,
        ctx: &ExecutionContext,
        state: &mut RunState,
    ) -> Result<TaskResult, AttemptError> {
        if ctx.is_cancelled() {
            return Err(AttemptError::fatal(CrewError::Cancelled));
        }

        let attempt = state.next_attempt(&task.id);
        let mut input_context = task.input_context.clone();
        input_context.extend(extra);

        let started_at = Utc::now();
        let start = Instant::now();
        self.events.emit(CrewEvent::TaskStart {
            task: task.id.clone(),
            agent: task.agent.id.clone(),
            attempt,
            cycle,
        });
        tracing::info!(task = %task.id, agent = %task.agent.id, attempt, cycle, "task starting");

        // A template that fails to render fails the same way on every attempt
        let rendered = self.templates.render_task(&task.description, &input_context);
        let retryable = rendered.is_ok();
        let outcome = match rendered {
            Ok(description) => {
                let request = ExecutionRequest {
                    task_id: task.id.clone(),
                    description,
                    expected_output: task.expected_output.clone(),
                    input_context: input_context.clone(),
                };
                self.backend
                    .execute(&task.agent, &request, ctx)
                    .await
                    .map_err(|e| e.0)
            }
            Err(e) => Err(e),
        };

        let mut record = TaskRecord {
            task_id: task.id.clone(),
            agent_id: task.agent.id.clone(),
            attempt,
            cycle,
            input_context,
            result: None,
            error: None,
            started_at,
            finished_at: Utc::now(),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(raw) => {
                let result = TaskResult::from_raw(&task.id, raw);
                self.events.emit(CrewEvent::TaskComplete {
                    task: task.id.clone(),
                    agent: task.agent.id.clone(),
                    attempt,
                    structured: result.structured_output.is_some(),
                    duration_ms,
                });
                tracing::info!(
                    task = %task.id,
                    agent = %task.agent.id,
                    attempt,
                    structured = result.structured_output.is_some(),
                    elapsed_ms = duration_ms,
                    "task complete"
                );
                record.result = Some(result.clone());
                state.history.push(record);
                state.final_result = Some(result.clone());
                Ok(result)
            }
            Err(message) => {
                let cancelled = ctx.is_cancelled();
                record.error = Some(if cancelled { "cancelled".to_string() } else { message.clone() });
                state.history.push(record);
                if cancelled {
                    return Err(AttemptError::fatal(CrewError::Cancelled));
                }
                self.events.emit(CrewEvent::TaskFailed {
                    task: task.id.clone(),
                    agent: task.agent.id.clone(),
                    attempt,
                    error: message.clone(),
                });
                tracing::warn!(task = %task.id, agent = %task.agent.id, attempt, error = %message, "task failed");
                Err(AttemptError {
                    error: CrewError::AgentExecution {
                        task: task.id.clone(),
                        agent: task.agent.id.clone(),
                        message,
                    },
                    retryable,
                })
            }
        }
    }
}

/// A failed attempt, and whether running it again could change anything
struct AttemptError {
    error: CrewError,
    retryable: bool,
}

impl AttemptError {
    fn fatal(error: CrewError) -> Self {
        Self { error, retryable: false }
    }
}

fn brief(task: &Task) -> TaskBrief {
    TaskBrief {
        task_id: task.id.clone(),
        agent_id: task.agent.id.clone(),
        kind: task.kind.name().to_string(),
        expected_output: task.expected_output.clone(),
    }
}

fn completed_context(completed: &IndexMap<String, TaskResult>) -> InputContext {
    let outputs: serde_json::Map<String, Value> = completed
        .iter()
        .map(|(id, result)| (id.clone(), result.to_value()))
        .collect();
    let mut context = InputContext::new();
    context.insert(COMPLETED_OUTPUTS.to_string(), Value::Object(outputs));
    context
}

/// Enforce fixed-role dispatch: the task must exist, be eligible, not have
/// run yet, and go to the agent it is bound to.
fn check_assignment<'w>(
    workflow: &'w Workflow,
    eligible: &[&'w Task],
    executed: &HashSet<String>,
    assignment: &Assignment,
) -> Result<&'w Task, CrewError> {
    let task = workflow.task(&assignment.task_id).ok_or_else(|| {
        CrewError::delegation(format!("manager assigned unknown task '{}'", assignment.task_id))
    })?;
    if executed.contains(&task.id) {
        return Err(CrewError::delegation(format!(
            "manager assigned task '{}' which already ran",
            task.id
        )));
    }
    if !eligible.iter().any(|t| t.id == task.id) {
        return Err(CrewError::delegation(format!(
            "manager assigned task '{}' before its prerequisites",
            task.id
        )));
    }
    if assignment.agent_id != task.agent.id {
        return Err(CrewError::delegation(format!(
            "task '{}' is bound to agent '{}', not '{}'",
            task.id, task.agent.id, assignment.agent_id
        )));
    }
    Ok(task)
}
