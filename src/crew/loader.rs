//! Crew definitions loaded from YAML
//!
//! A config directory holds `agents.yaml`, `tasks.yaml` and `crew.yaml`.
//! Everything is validated here, once, before a `Workflow` is built.

use super::builtins;
use super::task::{Task, TaskKind};
use super::workflow::{Process, Workflow};
use crate::agent::{Agent, AgentDefinition};
use crate::config::{PolicyOverrides, RunPolicy};
use crate::error::ConfigError;
use crate::tool::ToolRegistry;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const AGENTS_FILE: &str = "agents.yaml";
pub const TASKS_FILE: &str = "tasks.yaml";
pub const CREW_FILE: &str = "crew.yaml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKindName {
    #[default]
    Analysis,
    Integration,
    Validation,
}

/// One entry of `tasks.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Handlebars template over the task's input context
    #[serde(alias = "promptTemplate", alias = "description", alias = "prompt")]
    pub prompt_template: String,
    #[serde(alias = "expectedOutput")]
    pub expected_output: String,
    pub agent: String,
    #[serde(default)]
    pub kind: TaskKindName,
    /// Integration task checked by a validation task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validates: Option<String>,
}

/// `crew.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewDefinition {
    #[serde(default)]
    pub process: Process,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
    /// Task names in pipeline order
    pub tasks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyOverrides>,
}

#[derive(Debug, Clone)]
pub struct CrewConfig {
    pub agents: IndexMap<String, AgentDefinition>,
    pub tasks: IndexMap<String, TaskDefinition>,
    pub crew: CrewDefinition,
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_yaml(&content, path)
}

fn parse_yaml<T: DeserializeOwned>(content: &str, origin: &Path) -> Result<T, ConfigError> {
    serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
        path: origin.to_path_buf(),
        source,
    })
}

impl CrewConfig {
    /// Load and validate the three definition files in `dir`
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let config = Self {
            agents: read_yaml(&dir.join(AGENTS_FILE))?,
            tasks: read_yaml(&dir.join(TASKS_FILE))?,
            crew: read_yaml(&dir.join(CREW_FILE))?,
        };
        config.validate()?;
        tracing::debug!(
            dir = %dir.display(),
            agents = config.agents.len(),
            tasks = config.crew.tasks.len(),
            "loaded crew definition"
        );
        Ok(config)
    }

    /// Parse definitions from YAML text; `origin` names them in errors
    pub fn from_yaml(agents: &str, tasks: &str, crew: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config = Self {
            agents: parse_yaml(agents, &origin.join(AGENTS_FILE))?,
            tasks: parse_yaml(tasks, &origin.join(TASKS_FILE))?,
            crew: parse_yaml(crew, &origin.join(CREW_FILE))?,
        };
        config.validate()?;
        Ok(config)
    }

    /// The codebase-integration crew shipped with the binary
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_yaml(
            builtins::AGENTS_YAML,
            builtins::TASKS_YAML,
            builtins::CREW_YAML,
            &PathBuf::from("<builtin>"),
        )
    }

    /// Every reference must resolve and every definition be well-formed
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, agent) in &self.agents {
            agent.validate(name).map_err(ConfigError::Invalid)?;
        }

        for (name, task) in &self.tasks {
            if task.prompt_template.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("task '{}' has an empty prompt template", name)));
            }
            if task.expected_output.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("task '{}' has an empty expected output", name)));
            }
            if !self.agents.contains_key(&task.agent) {
                return Err(ConfigError::MissingAgent {
                    task: name.clone(),
                    agent: task.agent.clone(),
                });
            }
            match (task.kind, &task.validates) {
                (TaskKindName::Validation, None) => {
                    return Err(ConfigError::Invalid(format!(
                        "validation task '{}' must name the task it validates",
                        name
                    )))
                }
                (TaskKindName::Validation, Some(target)) if !self.tasks.contains_key(target) => {
                    return Err(ConfigError::MissingTask(target.clone()))
                }
                (TaskKindName::Analysis | TaskKindName::Integration, Some(_)) => {
                    return Err(ConfigError::Invalid(format!(
                        "only validation tasks may set 'validates' (task '{}')",
                        name
                    )))
                }
                _ => {}
            }
        }

        if self.crew.tasks.is_empty() {
            return Err(ConfigError::Invalid("crew lists no tasks".into()));
        }
        for name in &self.crew.tasks {
            if !self.tasks.contains_key(name) {
                return Err(ConfigError::MissingTask(name.clone()));
            }
        }
        if let Some(manager) = &self.crew.manager {
            if !self.agents.contains_key(manager) {
                return Err(ConfigError::MissingAgent {
                    task: "crew".into(),
                    agent: manager.clone(),
                });
            }
        }
        if let Some(policy) = &self.crew.policy {
            RunPolicy::default().apply(policy).validate()?;
        }
        Ok(())
    }

    /// Override the process from `crew.yaml`. Sequential runs take no manager.
    pub fn with_process(mut self, process: Process) -> Self {
        self.crew.process = process;
        if process == Process::Sequential {
            self.crew.manager = None;
        }
        self
    }

    /// `base` with this crew's policy overrides applied
    pub fn policy(&self, base: RunPolicy) -> RunPolicy {
        match &self.crew.policy {
            Some(overrides) => base.apply(overrides),
            None => base,
        }
    }

    /// Build the immutable workflow for `project_path`, selecting each
    /// agent's tools from `available`
    pub fn build_workflow(&self, project_path: &Path, available: &ToolRegistry) -> Result<Workflow, ConfigError> {
        let mut built: HashMap<&str, Arc<Agent>> = HashMap::new();
        let mut agent_for = |name: &str| -> Result<Arc<Agent>, ConfigError> {
            if let Some(existing) = built.get(name) {
                return Ok(existing.clone());
            }
            let (key, def) = self
                .agents
                .get_key_value(name)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown agent '{}'", name)))?;
            let agent = Agent::from_definition(key, def, available).map_err(|tool| ConfigError::UnknownTool {
                agent: key.clone(),
                tool,
            })?;
            let agent = Arc::new(agent);
            built.insert(key.as_str(), agent.clone());
            Ok(agent)
        };

        let mut builder = Workflow::builder(project_path).process(self.crew.process);

        for name in &self.crew.tasks {
            let def = self
                .tasks
                .get(name)
                .ok_or_else(|| ConfigError::MissingTask(name.clone()))?;
            let kind = match def.kind {
                TaskKindName::Analysis => TaskKind::Analysis,
                TaskKindName::Integration => TaskKind::Integration,
                TaskKindName::Validation => TaskKind::Validation {
                    validates: def.validates.clone().unwrap_or_default(),
                },
            };
            let task = Task::new(
                name.clone(),
                def.prompt_template.clone(),
                def.expected_output.clone(),
                agent_for(&def.agent)?,
            )
            .with_kind(kind);
            builder = builder.task(task);
        }

        if let Some(manager) = &self.crew.manager {
            builder = builder.manager(agent_for(manager)?);
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{standard_registry, DEFAULT_SEARCH_URL};
    use tempfile::TempDir;

    const AGENTS: &str = r#"
analyst:
  role: Codebase Analyst
  goal: Understand the project
  backstory: Reads code carefully.
  tools: [list_directory, read_file]
writer:
  role: Integrator
  goal: Change the code
  brief: Writes minimal diffs.
  tools: [read_file, write_file]
checker:
  role: Validator
  goal: Check the change
  brief: Strict reviewer.
  tools: [read_file]
boss:
  role: Manager
  goal: Coordinate
  brief: Delegates work.
  allowDelegation: true
"#;

    const TASKS: &str = r#"
analyze:
  promptTemplate: "Analyze {{projectPath}}"
  expectedOutput: JSON report
  agent: analyst
integrate:
  description: "Integrate using {{json priorOutput}}"
  expected_output: Modified files
  agent: writer
  kind: integration
validate:
  prompt: "Validate {{projectPath}}"
  expected_output: '{"status": "pass|fail"}'
  agent: checker
  kind: validation
  validates: integrate
"#;

    const CREW: &str = r#"
process: hierarchical
manager: boss
tasks: [analyze, integrate, validate]
policy:
  iteration_cap: 2
"#;

    fn write_dir(agents: &str, tasks: &str, crew: &str) -> TempDir {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(AGENTS_FILE), agents).unwrap();
        std::fs::write(temp.path().join(TASKS_FILE), tasks).unwrap();
        std::fs::write(temp.path().join(CREW_FILE), crew).unwrap();
        temp
    }

    #[test]
    fn test_load_and_build() {
        let dir = write_dir(AGENTS, TASKS, CREW);
        let config = CrewConfig::load(dir.path()).unwrap();
        assert_eq!(config.policy(RunPolicy::default()).iteration_cap, 2);

        let project = TempDir::new().unwrap();
        let registry = standard_registry(project.path(), DEFAULT_SEARCH_URL);
        let workflow = config.build_workflow(project.path(), &registry).unwrap();

        assert_eq!(workflow.process(), Process::Hierarchical);
        assert_eq!(workflow.task_ids(), vec!["analyze", "integrate", "validate"]);
        assert_eq!(workflow.task("validate").unwrap().validates(), Some("integrate"));
        assert_eq!(workflow.manager().unwrap().id, "boss");
        let writer = &workflow.task("integrate").unwrap().agent;
        assert_eq!(writer.capabilities().names(), vec!["read_file", "write_file"]);
    }

    #[test]
    fn test_sequential_override_drops_manager() {
        let dir = write_dir(AGENTS, TASKS, CREW);
        let config = CrewConfig::load(dir.path()).unwrap().with_process(Process::Sequential);
        let project = TempDir::new().unwrap();
        let registry = standard_registry(project.path(), DEFAULT_SEARCH_URL);

        let workflow = config.build_workflow(project.path(), &registry).unwrap();
        assert_eq!(workflow.process(), Process::Sequential);
        assert!(workflow.manager().is_none());
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(AGENTS_FILE), AGENTS).unwrap();
        assert!(matches!(CrewConfig::load(temp.path()), Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_missing_required_key_is_parse_error() {
        let tasks = "analyze:\n  expected_output: report\n  agent: analyst\n";
        let dir = write_dir(AGENTS, tasks, "tasks: [analyze]\n");
        assert!(matches!(CrewConfig::load(dir.path()), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_unresolved_references() {
        let tasks = TASKS.replace("agent: checker", "agent: ghost");
        let dir = write_dir(AGENTS, &tasks, CREW);
        assert!(matches!(
            CrewConfig::load(dir.path()),
            Err(ConfigError::MissingAgent { agent, .. }) if agent == "ghost"
        ));

        let crew = CREW.replace("validate]", "deploy]");
        let dir = write_dir(AGENTS, TASKS, &crew);
        assert!(matches!(CrewConfig::load(dir.path()), Err(ConfigError::MissingTask(t)) if t == "deploy"));
    }

    #[test]
    fn test_unknown_tool_fails_build() {
        let agents = AGENTS.replace("tools: [read_file]", "tools: [read_file, shell]");
        let dir = write_dir(&agents, TASKS, CREW);
        let config = CrewConfig::load(dir.path()).unwrap();
        let project = TempDir::new().unwrap();
        let registry = standard_registry(project.path(), DEFAULT_SEARCH_URL);

        let err = config.build_workflow(project.path(), &registry).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTool { ref tool, .. } if tool == "shell"));
    }

    #[test]
    fn test_builtin_crew_is_valid() {
        let config = CrewConfig::builtin().unwrap();
        assert_eq!(config.crew.process, Process::Hierarchical);
        let project = TempDir::new().unwrap();
        let registry = standard_registry(project.path(), DEFAULT_SEARCH_URL);
        let workflow = config.build_workflow(project.path(), &registry).unwrap();
        assert_eq!(workflow.tasks().len(), 4);
    }
}
