//! Prompt rendering
//!
//! Task descriptions are handlebars templates over the task's input context,
//! rendered in strict mode so a typo in a variable name fails the task instead
//! of silently sending an empty prompt.

use super::worker::{Agent, ExecutionRequest};
use crate::crew::{InputContext, COMPLETED_OUTPUTS, PRIOR_OUTPUT, REVISION_NOTES};
use handlebars::Handlebars;
use serde::Serialize;
use serde_json::Value;

const SYSTEM_PROMPT_TEMPLATE: &str = r#"You are {{role}}.
Your goal: {{goal}}

{{brief}}

{{#if tools}}You can use these tools:
{{#each tools}}- {{this}}
{{/each}}{{else}}You have no tools; work only from the information in the task.
{{/if}}
When you are done, reply with your final answer as plain text and no tool calls."#;

/// Keys a template may test with `{{#if}}` even when the runner did not set them
const OPTIONAL_KEYS: [&str; 3] = [PRIOR_OUTPUT, REVISION_NOTES, COMPLETED_OUTPUTS];

// Structured context values render as pretty JSON: {{json priorOutput}}
handlebars::handlebars_helper!(json_helper: |v: Json| {
    match v {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
});

/// Holds the handlebars registry
pub struct Templates {
    handlebars: Handlebars<'static>,
}

impl Templates {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.register_helper("json", Box::new(json_helper));
        Self { handlebars }
    }

    /// Render a task description against its input context
    pub fn render_task(&self, template: &str, context: &InputContext) -> Result<String, String> {
        let mut data = context.clone();
        for key in OPTIONAL_KEYS {
            data.entry(key.to_string()).or_insert(Value::Null);
        }
        self.handlebars
            .render_template(template, &data)
            .map_err(|e| format!("failed to render task template: {}", e))
    }

    /// System prompt describing the agent's role and tools
    pub fn system_prompt(&self, agent: &Agent) -> Result<String, String> {
        #[derive(Serialize)]
        struct SystemPrompt<'a> {
            role: &'a str,
            goal: &'a str,
            brief: &'a str,
            tools: Vec<&'a str>,
        }

        let data = SystemPrompt {
            role: &agent.role,
            goal: &agent.goal,
            brief: &agent.brief,
            tools: agent.capabilities().names(),
        };
        self.handlebars
            .render_template(SYSTEM_PROMPT_TEMPLATE, &data)
            .map_err(|e| format!("failed to render system prompt: {}", e))
    }
}

impl std::fmt::Debug for Templates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Templates")
            .field("strict", &self.handlebars.strict_mode())
            .finish()
    }
}

impl Default for Templates {
    fn default() -> Self {
        Self::new()
    }
}

/// First user message for a task attempt
pub fn task_message(request: &ExecutionRequest) -> String {
    format!(
        "{}\n\nExpected output:\n{}",
        request.description.trim_end(),
        request.expected_output.trim_end()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(pairs: &[(&str, Value)]) -> InputContext {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_render_task_with_structured_prior_output() {
        let templates = Templates::new();
        let ctx = context(&[
            ("projectPath", json!("/work/app")),
            ("priorOutput", json!({"taskId": "analyze", "rawOutput": "<b>done</b>"})),
        ]);

        let rendered = templates
            .render_task(
                "Analyze {{projectPath}}.\n{{#if priorOutput}}Previous: {{priorOutput.rawOutput}}{{/if}}",
                &ctx,
            )
            .unwrap();
        assert_eq!(rendered, "Analyze /work/app.\nPrevious: <b>done</b>");
    }

    #[test]
    fn test_optional_keys_absent_are_falsy() {
        let templates = Templates::new();
        let ctx = context(&[("projectPath", json!("/work/app"))]);
        let rendered = templates
            .render_task("{{#if revisionNotes}}Fix: {{json revisionNotes}}{{else}}First pass{{/if}}", &ctx)
            .unwrap();
        assert_eq!(rendered, "First pass");
    }

    #[test]
    fn test_json_helper_pretty_prints() {
        let templates = Templates::new();
        let ctx = context(&[("revisionNotes", json!({"status": "fail"}))]);
        let rendered = templates.render_task("{{json revisionNotes}}", &ctx).unwrap();
        assert_eq!(rendered, "{\n  \"status\": \"fail\"\n}");
    }

    #[test]
    fn test_unknown_variable_is_error() {
        let templates = Templates::new();
        let ctx = context(&[("projectPath", json!("/work/app"))]);
        let err = templates.render_task("Analyze {{projectDir}}", &ctx).unwrap_err();
        assert!(err.contains("render"));
    }

    #[test]
    fn test_system_prompt_lists_tools() {
        let templates = Templates::new();
        let agent = Agent::new("a", "Codebase Analyst", "Map the project", "Be thorough.");
        let prompt = templates.system_prompt(&agent).unwrap();
        assert!(prompt.starts_with("You are Codebase Analyst."));
        assert!(prompt.contains("You have no tools"));
    }
}
