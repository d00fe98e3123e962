//! Crew orchestration
//!
//! - `Workflow`: validated tasks, agents and process
//! - `CrewConfig`: YAML definitions (`agents.yaml`, `tasks.yaml`, `crew.yaml`)
//! - `CrewRunner`: sequential and hierarchical execution with the
//!   validate/revise feedback loop
//! - `Manager`: picks task order in hierarchical mode

mod builtins;
mod loader;
mod manager;
mod outcome;
mod parse;
mod runner;
mod task;
mod workflow;

pub use loader::{CrewConfig, CrewDefinition, TaskDefinition, TaskKindName, AGENTS_FILE, CREW_FILE, TASKS_FILE};
pub use manager::{
    parse_assignment, AgentManager, Assignment, Board, FailureDecision, Manager, OrderedManager, TaskBrief,
    DELEGATION_TASK,
};
pub use outcome::{RunOutcome, RunStatus, TaskRecord};
pub use parse::{canonical_fallback, parse_output, parse_structured, ParsedOutput};
pub use runner::CrewRunner;
pub use task::{
    InputContext, Task, TaskKind, TaskResult, ValidationStatus, ANALYSIS, COMPLETED_OUTPUTS, PRIOR_OUTPUT,
    PROJECT_PATH, REVISION_NOTES,
};
pub use workflow::{Process, Workflow, WorkflowBuilder};
