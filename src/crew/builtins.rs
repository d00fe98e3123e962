//! Built-in crew: add Auth0 authentication to an existing web project
//!
//! Used when no config directory is given. The definitions go through the
//! same YAML loader as user-supplied ones.

pub const AGENTS_YAML: &str = r#"
manager_agent:
  role: Integration Project Manager
  goal: >
    Drive the Auth0 integration to completion by handing each task to the
    agent responsible for it, in an order that respects their dependencies.
  brief: >
    You coordinate a small team of specialists. You never write code
    yourself; you decide who works next and make sure validation feedback
    reaches the integrator.
  allow_delegation: true
  llm:
    temperature: 0.0

requirements_analysis_agent:
  role: Auth0 Requirements Analyst
  goal: >
    Determine exactly what an Auth0 login integration needs for this project:
    SDK packages, configuration values, callback routes and session handling.
  brief: >
    You have integrated Auth0 into dozens of web applications and know the
    quickstarts for each framework. You read the project before recommending
    anything and you report findings as structured JSON.
  tools: [list_directory, read_file, fetch, web_search]
  llm:
    temperature: 0.0

codebase_analysis_agent:
  role: Codebase Analyst
  goal: >
    Map the project: framework, entry points, routing, templates, and the
    files that must change to add authentication.
  brief: >
    You are a meticulous reader of unfamiliar code. You list directories
    before opening files and never guess at a file's contents.
  tools: [list_directory, read_file]
  llm:
    temperature: 0.0

integration_agent:
  role: Auth0 Integration Engineer
  goal: >
    Implement Auth0 login, logout and callback handling in the project with
    the smallest correct set of changes.
  brief: >
    You write production-quality code that follows the project's existing
    conventions. Secrets come from environment variables, never literals.
    When validation feedback is provided you fix every reported issue.
  tools: [list_directory, read_file, write_file, fetch, web_search]
  llm:
    temperature: 0.0

validation_agent:
  role: Security Reviewer
  goal: >
    Verify that the Auth0 integration is complete, correct and secure, and
    report precisely what must be fixed when it is not.
  brief: >
    You review authentication code for a living. You check callback URL
    handling, state and session management, secret storage and logout.
    You only pass an integration you would ship.
  tools: [list_directory, read_file]
  llm:
    temperature: 0.0
"#;

pub const TASKS_YAML: &str = r#"
analyze_requirements:
  kind: analysis
  agent: requirements_analysis_agent
  prompt_template: |
    Analyze the Auth0 integration requirements for the project at {{projectPath}}.
    Identify the web framework and language, the Auth0 SDK to use, the
    environment variables it needs, and the routes that must exist
    (login, callback, logout).
    {{#if completedOutputs}}
    Results so far:
    {{json completedOutputs}}
    {{/if}}
  expected_output: |
    A JSON object with keys "framework", "sdk", "dependencies",
    "environmentVariables" and "routes".

analyze_codebase:
  kind: analysis
  agent: codebase_analysis_agent
  prompt_template: |
    Analyze the codebase at {{projectPath}} to find every place that needs
    to change for Auth0 login. List the directory tree first, then read the
    relevant files.
    {{#if priorOutput}}
    Requirements analysis:
    {{json priorOutput.analysis}}
    {{/if}}
    {{#if completedOutputs}}
    Results so far:
    {{json completedOutputs}}
    {{/if}}
  expected_output: |
    A JSON object with keys "filesToModify" (paths relative to the project),
    "frameworkConsiderations" and "dependencies".

integrate:
  kind: integration
  agent: integration_agent
  prompt_template: |
    Implement the Auth0 integration in the project at {{projectPath}}.
    Write the changed files with the write_file tool.
    {{#if priorOutput}}
    Codebase analysis:
    {{json priorOutput.analysis}}
    {{/if}}
    {{#if completedOutputs}}
    Analysis results:
    {{json completedOutputs}}
    {{/if}}
    {{#if revisionNotes}}
    The previous attempt failed validation. Fix every issue in this report:
    {{json revisionNotes.analysis}}
    {{/if}}
  expected_output: |
    A summary of every file created or modified and why.

validate:
  kind: validation
  validates: integrate
  agent: validation_agent
  prompt_template: |
    Validate the Auth0 integration in the project at {{projectPath}}.
    Read the modified files and check login, callback and logout handling,
    session security and that no secret is hard-coded.
    {{#if priorOutput}}
    Integration summary:
    {{priorOutput.rawOutput}}
    {{/if}}
    {{#if completedOutputs}}
    Results so far:
    {{json completedOutputs}}
    {{/if}}
  expected_output: |
    Only a JSON object: {"status": "pass" | "fail", "issues": [...],
    "recommendations": [...]}. Use "fail" when any issue must be fixed.
"#;

pub const CREW_YAML: &str = r#"
process: hierarchical
manager: manager_agent
tasks:
  - analyze_requirements
  - analyze_codebase
  - integrate
  - validate
"#;
