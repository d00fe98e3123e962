//! Tasks and task results

use super::parse::{canonical_fallback, parse_structured};
use crate::agent::Agent;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Always present in every task's input context
pub const PROJECT_PATH: &str = "projectPath";
/// Sequential mode: the previous task's `TaskResult`
pub const PRIOR_OUTPUT: &str = "priorOutput";
/// Feedback loop: the failing validation `TaskResult`
pub const REVISION_NOTES: &str = "revisionNotes";
/// Hierarchical mode: results completed so far, keyed by task id
pub const COMPLETED_OUTPUTS: &str = "completedOutputs";
/// Key of the parsed-or-fallback output inside a `TaskResult` value
pub const ANALYSIS: &str = "analysis";

pub type InputContext = IndexMap<String, Value>;

/// What part a task plays in the workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    Analysis,
    Integration,
    /// Checks the output of the named integration task
    Validation { validates: String },
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Analysis => "analysis",
            TaskKind::Integration => "integration",
            TaskKind::Validation { .. } => "validation",
        }
    }
}

/// A unit of work bound to exactly one agent
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    /// Handlebars template over `input_context`
    pub description: String,
    pub expected_output: String,
    pub agent: Arc<Agent>,
    pub kind: TaskKind,
    pub input_context: InputContext,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        expected_output: impl Into<String>,
        agent: Arc<Agent>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            expected_output: expected_output.into(),
            agent,
            kind: TaskKind::Analysis,
            input_context: InputContext::new(),
        }
    }

    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.input_context.insert(key.into(), value);
        self
    }

    pub fn validates(&self) -> Option<&str> {
        match &self.kind {
            TaskKind::Validation { validates } => Some(validates),
            _ => None,
        }
    }

    pub fn is_integration(&self) -> bool {
        self.kind == TaskKind::Integration
    }
}

/// Verdict of a validation task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Pass,
    Fail,
}

/// Output of one task attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub task_id: String,
    pub raw_output: String,
    /// Absent when the raw output did not parse
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_output: Option<Value>,
}

impl TaskResult {
    /// Wrap raw agent output, parsing it when possible
    pub fn from_raw(task_id: impl Into<String>, raw_output: impl Into<String>) -> Self {
        let raw_output = raw_output.into();
        Self {
            task_id: task_id.into(),
            structured_output: parse_structured(&raw_output),
            raw_output,
        }
    }

    /// The JSON form placed in downstream input contexts. Carries an
    /// `analysis` key that is always readable, parsed or not.
    pub fn to_value(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.insert(ANALYSIS.to_string(), self.analysis());
        }
        value
    }

    /// Structured output, or the canonical fallback built from the raw text
    pub fn analysis(&self) -> Value {
        self.structured_output
            .clone()
            .unwrap_or_else(|| canonical_fallback(&self.raw_output))
    }

    /// `status` of a validation report, case-insensitive
    pub fn validation_status(&self) -> Option<ValidationStatus> {
        let status = self.structured_output.as_ref()?.get("status")?.as_str()?;
        match status.trim().to_ascii_lowercase().as_str() {
            "pass" => Some(ValidationStatus::Pass),
            "fail" => Some(ValidationStatus::Fail),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_raw_structured_and_fallback() {
        let structured = TaskResult::from_raw("analyze", r#"{"filesToModify": ["server.py"]}"#);
        assert_eq!(structured.structured_output, Some(json!({"filesToModify": ["server.py"]})));
        assert_eq!(structured.analysis()["filesToModify"][0], "server.py");

        let text = TaskResult::from_raw("analyze", "It is a Flask app.");
        assert!(text.structured_output.is_none());
        assert_eq!(text.raw_output, "It is a Flask app.");
        assert_eq!(text.analysis()["rawAnalysis"], "It is a Flask app.");
    }

    #[test]
    fn test_value_roundtrips_exactly() {
        let result = TaskResult::from_raw("analyze", "```json\n{\"a\": 1}\n```");
        let value = result.to_value();
        assert_eq!(value["taskId"], "analyze");
        assert!(value.get("structuredOutput").is_some());
        assert_eq!(value[ANALYSIS], json!({"a": 1}));
        let back: TaskResult = serde_json::from_value(value).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_value_of_prose_carries_fallback() {
        let result = TaskResult::from_raw("analyze", "Use authlib; needs AUTH0_DOMAIN and /callback route.");
        let value = result.to_value();
        assert!(value.get("structuredOutput").is_none());
        assert_eq!(value[ANALYSIS]["rawAnalysis"], "Use authlib; needs AUTH0_DOMAIN and /callback route.");
        assert_eq!(value[ANALYSIS]["filesToModify"], json!([]));
        assert_eq!(value[ANALYSIS]["frameworkConsiderations"], json!([]));
        assert_eq!(value[ANALYSIS]["dependencies"], json!([]));

        let back: TaskResult = serde_json::from_value(value).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_validation_status() {
        let pass = TaskResult::from_raw("validate", r#"{"status": "PASS"}"#);
        assert_eq!(pass.validation_status(), Some(ValidationStatus::Pass));

        let fail = TaskResult::from_raw("validate", r#"{"status": "fail", "issues": ["no logout"]}"#);
        assert_eq!(fail.validation_status(), Some(ValidationStatus::Fail));

        let unknown = TaskResult::from_raw("validate", r#"{"status": "maybe"}"#);
        assert_eq!(unknown.validation_status(), None);
        assert_eq!(TaskResult::from_raw("validate", "looks fine").validation_status(), None);
    }
}
