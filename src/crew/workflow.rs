//! Workflow (crew) model and its validating builder
//!
//! A `Workflow` is validated once at build time and is immutable afterwards.

use super::task::{Task, TaskKind, PROJECT_PATH};
use crate::agent::Agent;
use crate::error::ConfigError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How tasks are ordered and assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Process {
    /// Strict pipeline in list order
    #[default]
    Sequential,
    /// Manager-delegated with the validate/revise loop
    Hierarchical,
}

impl std::fmt::Display for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Process::Sequential => write!(f, "sequential"),
            Process::Hierarchical => write!(f, "hierarchical"),
        }
    }
}

impl std::str::FromStr for Process {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(Process::Sequential),
            "hierarchical" => Ok(Process::Hierarchical),
            other => Err(format!("unknown process '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Workflow {
    tasks: Vec<Task>,
    agents: IndexMap<String, Arc<Agent>>,
    process: Process,
    manager: Option<Arc<Agent>>,
    project_path: PathBuf,
}

impl Workflow {
    pub fn builder(project_path: impl Into<PathBuf>) -> WorkflowBuilder {
        WorkflowBuilder::new(project_path)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Task agents by id, in first-use order. The manager is not included.
    pub fn agents(&self) -> &IndexMap<String, Arc<Agent>> {
        &self.agents
    }

    pub fn process(&self) -> Process {
        self.process
    }

    pub fn manager(&self) -> Option<&Arc<Agent>> {
        self.manager.as_ref()
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.id.clone()).collect()
    }
}

#[derive(Debug)]
pub struct WorkflowBuilder {
    tasks: Vec<Task>,
    process: Process,
    manager: Option<Arc<Agent>>,
    project_path: PathBuf,
}

impl WorkflowBuilder {
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        Self {
            tasks: Vec::new(),
            process: Process::Sequential,
            manager: None,
            project_path: project_path.into(),
        }
    }

    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn tasks(mut self, tasks: impl IntoIterator<Item = Task>) -> Self {
        self.tasks.extend(tasks);
        self
    }

    pub fn process(mut self, process: Process) -> Self {
        self.process = process;
        self
    }

    pub fn manager(mut self, manager: Arc<Agent>) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Validate and freeze the workflow
    pub fn build(self) -> Result<Workflow, ConfigError> {
        if !self.project_path.is_absolute() {
            return Err(ConfigError::Invalid(format!(
                "project path must be absolute: {}",
                self.project_path.display()
            )));
        }
        if self.tasks.is_empty() {
            return Err(ConfigError::Invalid("a workflow needs at least one task".into()));
        }

        let mut seen = HashSet::new();
        let mut agents: IndexMap<String, Arc<Agent>> = IndexMap::new();
        for task in &self.tasks {
            if !seen.insert(task.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate task id '{}'", task.id)));
            }
            match agents.get(&task.agent.id) {
                Some(existing) if !Arc::ptr_eq(existing, &task.agent) => {
                    return Err(ConfigError::Invalid(format!(
                        "two different agents share the id '{}'",
                        task.agent.id
                    )));
                }
                Some(_) => {}
                None => {
                    agents.insert(task.agent.id.clone(), task.agent.clone());
                }
            }
        }

        for task in &self.tasks {
            if let TaskKind::Validation { validates } = &task.kind {
                let target = self.tasks.iter().find(|t| &t.id == validates);
                match target {
                    Some(t) if t.is_integration() => {}
                    Some(_) => {
                        return Err(ConfigError::Invalid(format!(
                            "validation task '{}' validates '{}', which is not an integration task",
                            task.id, validates
                        )))
                    }
                    None => return Err(ConfigError::MissingTask(validates.clone())),
                }
            }
        }

        match self.process {
            Process::Hierarchical => {
                let manager = self.manager.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("hierarchical process requires a manager agent".into())
                })?;
                if !manager.can_delegate {
                    return Err(ConfigError::Invalid(format!(
                        "manager agent '{}' must allow delegation",
                        manager.id
                    )));
                }
            }
            Process::Sequential => {
                if let Some(manager) = &self.manager {
                    return Err(ConfigError::Invalid(format!(
                        "sequential process does not take a manager (got '{}')",
                        manager.id
                    )));
                }
                if let Some(agent) = agents.values().find(|a| a.can_delegate) {
                    return Err(ConfigError::Invalid(format!(
                        "agent '{}' allows delegation, which a sequential process forbids",
                        agent.id
                    )));
                }
            }
        }

        let project_value = Value::String(self.project_path.display().to_string());
        let tasks = self
            .tasks
            .into_iter()
            .map(|t| t.with_context(PROJECT_PATH, project_value.clone()))
            .collect();

        Ok(Workflow {
            tasks,
            agents,
            process: self.process,
            manager: self.manager,
            project_path: self.project_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str) -> Arc<Agent> {
        Arc::new(Agent::new(id, "Role", "Goal", "Brief"))
    }

    fn manager() -> Arc<Agent> {
        Arc::new(Agent::new("manager", "Manager", "Coordinate", "Brief").with_delegation(true))
    }

    #[test]
    fn test_sequential_injects_project_path_and_shares_agents() {
        let analyst = agent("analyst");
        let workflow = Workflow::builder("/work/app")
            .task(Task::new("a", "A", "x", analyst.clone()))
            .task(Task::new("b", "B", "y", analyst.clone()))
            .build()
            .unwrap();

        assert_eq!(workflow.agents().len(), 1);
        for task in workflow.tasks() {
            assert_eq!(task.input_context[PROJECT_PATH], "/work/app");
            assert!(Arc::ptr_eq(&task.agent, &analyst));
        }
    }

    #[test]
    fn test_rejects_relative_path_and_empty() {
        let err = Workflow::builder("relative/app")
            .task(Task::new("a", "A", "x", agent("a")))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("absolute"));
        assert!(Workflow::builder("/work").build().is_err());
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let err = Workflow::builder("/work")
            .task(Task::new("a", "A", "x", agent("one")))
            .task(Task::new("a", "B", "y", agent("two")))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate task id"));

        let err = Workflow::builder("/work")
            .task(Task::new("a", "A", "x", agent("same")))
            .task(Task::new("b", "B", "y", agent("same")))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("share the id"));
    }

    #[test]
    fn test_process_invariants() {
        let hier_without_manager = Workflow::builder("/work")
            .process(Process::Hierarchical)
            .task(Task::new("a", "A", "x", agent("a")))
            .build();
        assert!(hier_without_manager.is_err());

        let non_delegating = Workflow::builder("/work")
            .process(Process::Hierarchical)
            .manager(agent("boss"))
            .task(Task::new("a", "A", "x", agent("a")))
            .build();
        assert!(non_delegating.unwrap_err().to_string().contains("must allow delegation"));

        let seq_with_manager = Workflow::builder("/work")
            .manager(manager())
            .task(Task::new("a", "A", "x", agent("a")))
            .build();
        assert!(seq_with_manager.is_err());

        let seq_delegating_agent = Workflow::builder("/work")
            .task(Task::new("a", "A", "x", manager()))
            .build();
        assert!(seq_delegating_agent.is_err());

        let ok = Workflow::builder("/work")
            .process(Process::Hierarchical)
            .manager(manager())
            .task(Task::new("a", "A", "x", agent("a")))
            .build()
            .unwrap();
        assert_eq!(ok.process(), Process::Hierarchical);
    }

    #[test]
    fn test_validation_target_must_be_integration() {
        let integrator = agent("integrator");
        let validator = agent("validator");
        let missing = Workflow::builder("/work")
            .task(Task::new("v", "V", "x", validator.clone()).with_kind(TaskKind::Validation {
                validates: "integrate".into(),
            }))
            .build();
        assert!(matches!(missing, Err(ConfigError::MissingTask(t)) if t == "integrate"));

        let wrong_kind = Workflow::builder("/work")
            .task(Task::new("integrate", "I", "x", integrator.clone()))
            .task(Task::new("v", "V", "x", validator.clone()).with_kind(TaskKind::Validation {
                validates: "integrate".into(),
            }))
            .build();
        assert!(wrong_kind.is_err());

        let ok = Workflow::builder("/work")
            .task(Task::new("integrate", "I", "x", integrator).with_kind(TaskKind::Integration))
            .task(Task::new("v", "V", "x", validator).with_kind(TaskKind::Validation {
                validates: "integrate".into(),
            }))
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn test_process_parse() {
        assert_eq!("Hierarchical".parse::<Process>().unwrap(), Process::Hierarchical);
        assert!("parallel".parse::<Process>().is_err());
    }
}
