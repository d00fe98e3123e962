//! autocrew CLI
//!
//! Runs a crew of LLM agents against a project directory.

use anyhow::{bail, Context, Result};
use autocrew::config::PolicyOverrides;
use autocrew::crew::{AgentManager, CrewConfig, CrewRunner, Process, RunOutcome};
use autocrew::events::{CrewEvent, EventSink};
use autocrew::provider::{ProviderClient, ProviderConfig};
use autocrew::tools::standard_registry;
use autocrew::{AgentBackend, LlmBackend, Settings, Telemetry};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "autocrew")]
#[command(about = "autocrew - orchestrate a crew of LLM agents over a codebase", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the crew against a project directory
    Run {
        /// Project to work on
        project_path: PathBuf,

        /// Directory with agents.yaml, tasks.yaml and crew.yaml (built-in crew when omitted)
        #[arg(short, long)]
        config_dir: Option<PathBuf>,

        /// Override the process from crew.yaml
        #[arg(short, long)]
        process: Option<Process>,

        /// Maximum validate/revise cycles
        #[arg(long)]
        iteration_cap: Option<u32>,

        /// OpenAI-compatible base URL (e.g. http://localhost:1234/v1); no API key is sent
        #[arg(long)]
        provider_url: Option<String>,

        /// Default model for agents that do not name one
        #[arg(short, long)]
        model: Option<String>,

        /// Wall-clock limit for the run, in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Log to the console and print run events
        #[arg(short, long)]
        verbose: bool,

        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration without running anything
    Check {
        #[arg(short, long)]
        config_dir: Option<PathBuf>,
    },
}

fn load_crew(config_dir: Option<&Path>) -> Result<CrewConfig> {
    match config_dir {
        Some(dir) => CrewConfig::load(dir).with_context(|| format!("invalid crew config in {}", dir.display())),
        None => CrewConfig::builtin().context("built-in crew failed to load"),
    }
}

fn provider_config(settings: &Settings, provider_url: Option<String>, model: Option<String>) -> ProviderConfig {
    let mut config = match provider_url {
        Some(url) => ProviderConfig::local(url, settings.provider.default_model.clone()),
        None => settings.provider.clone(),
    };
    if let Some(model) = model {
        config.default_model = model;
    }
    config
}

fn describe(event: &CrewEvent) -> String {
    match event {
        CrewEvent::RunStart { process, tasks, .. } => format!("run started ({}): {}", process, tasks.join(" -> ")),
        CrewEvent::RunComplete { status, .. } => format!("run finished: {}", status),
        CrewEvent::Cancelled { .. } => "run cancelled".to_string(),
        CrewEvent::Delegated { task, agent } => format!("manager assigned {} to {}", task, agent),
        CrewEvent::TaskStart { task, agent, attempt, cycle } => {
            format!("{} started by {} (attempt {}, cycle {})", task, agent, attempt, cycle)
        }
        CrewEvent::TaskComplete { task, structured, duration_ms, .. } => format!(
            "{} complete in {}ms{}",
            task,
            duration_ms,
            if *structured { "" } else { " (unstructured)" }
        ),
        CrewEvent::TaskFailed { task, error, .. } => format!("{} failed: {}", task, error),
        CrewEvent::FeedbackCycle { integration, cycle, .. } => {
            format!("validation failed, revising {} (cycle {})", integration, cycle)
        }
        CrewEvent::ToolCallStart { agent, tool, arguments, .. } => format!("  {} -> {}({})", agent, tool, arguments),
        CrewEvent::ToolCallEnd { tool, is_error, duration_ms, .. } => format!(
            "  {} {} in {}ms",
            tool,
            if *is_error { "failed" } else { "ok" },
            duration_ms
        ),
    }
}

fn print_summary(outcome: &RunOutcome, report: Option<&Path>) {
    println!("Run {}: {}", outcome.run_id, outcome.status.as_str());
    println!("{:-<80}", "");
    for record in &outcome.history {
        let state = match (&record.result, &record.error) {
            (Some(_), _) => "ok".to_string(),
            (None, Some(e)) => format!("error: {}", e),
            (None, None) => "-".to_string(),
        };
        println!(
            "  {:<28} {:<28} attempt {} cycle {}  {}",
            record.task_id, record.agent_id, record.attempt, record.cycle, state
        );
    }
    for warning in &outcome.warnings {
        println!("warning: {}", warning);
    }
    if let Some(error) = &outcome.error {
        println!("error: {}", error);
    }
    if let Some(result) = &outcome.final_result {
        println!("\nFinal result ({}):\n{}", result.task_id, result.raw_output);
    }
    if let Some(path) = report {
        println!("\nReport: {}", path.display());
    }
}

#[allow(clippy::too_many_arguments)]
async fn run(
    project_path: PathBuf,
    config_dir: Option<PathBuf>,
    process: Option<Process>,
    iteration_cap: Option<u32>,
    provider_url: Option<String>,
    model: Option<String>,
    timeout: Option<u64>,
    verbose: bool,
    json: bool,
) -> Result<bool> {
    let _ = dotenvy::dotenv();
    let settings = Settings::discover(config_dir.as_deref())
        .context("failed to load settings")?
        .with_verbose(verbose);
    let telemetry = Telemetry::init(
        settings.log_dir.clone(),
        settings.verbose,
        settings.otel_endpoint.as_deref(),
    )?;

    let mut crew = load_crew(config_dir.as_deref())?;
    if let Some(process) = process {
        crew = crew.with_process(process);
    }

    let project_path = project_path
        .canonicalize()
        .with_context(|| format!("project path {} does not exist", project_path.display()))?;
    if !project_path.is_dir() {
        bail!("project path {} is not a directory", project_path.display());
    }

    let policy = crew.policy(settings.policy.clone()).apply(&PolicyOverrides {
        iteration_cap,
        max_task_retries: None,
        deadline_secs: timeout,
    });
    policy.validate()?;

    let tools = standard_registry(&project_path, &settings.search_url);
    let workflow = crew.build_workflow(&project_path, &tools)?;

    let provider = ProviderClient::new(provider_config(&settings, provider_url, model))
        .map_err(anyhow::Error::msg)
        .context("failed to set up the LLM provider")?;
    let backend: Arc<dyn AgentBackend> = Arc::new(LlmBackend::new(Arc::new(provider)));

    let (events, mut rx) = EventSink::channel();
    let mut runner = CrewRunner::new(backend.clone(), policy).with_events(events);
    if let Some(manager) = workflow.manager() {
        runner = runner.with_manager(Arc::new(AgentManager::new(manager.clone(), backend)));
    }

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if verbose {
                eprintln!("{}", describe(&event));
            }
        }
    });

    let token = runner.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling after the current task...");
            token.cancel();
        }
    });

    let outcome = runner.run(&workflow).await;
    drop(runner);
    let _ = printer.await;

    let report = match telemetry.save_outcome(&outcome) {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::warn!(error = %e, "could not save run report");
            None
        }
    };

    if json {
        println!("{}", outcome.to_json());
    } else {
        print_summary(&outcome, report.as_deref());
    }
    Ok(outcome.status.is_success())
}

fn check(config_dir: Option<PathBuf>) -> Result<()> {
    let settings = Settings::discover(config_dir.as_deref()).context("failed to load settings")?;
    let crew = load_crew(config_dir.as_deref())?;
    let policy = crew.policy(settings.policy.clone());
    policy.validate()?;

    // Resolves tool names and the workflow rules without touching a real project
    let root = std::env::current_dir().context("no current directory")?;
    let tools = standard_registry(&root, &settings.search_url);
    let workflow = crew.build_workflow(&root, &tools)?;

    println!("Configuration OK");
    println!("  process: {}", workflow.process());
    if let Some(manager) = workflow.manager() {
        println!("  manager: {}", manager.id);
    }
    println!("  agents:  {}", workflow.agents().keys().cloned().collect::<Vec<_>>().join(", "));
    println!("  tasks:   {}", workflow.task_ids().join(" -> "));
    println!(
        "  policy:  iteration_cap={} max_task_retries={} deadline={}",
        policy.iteration_cap,
        policy.max_task_retries,
        policy
            .deadline_secs
            .map(|s| format!("{}s", s))
            .unwrap_or_else(|| "none".to_string())
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            project_path,
            config_dir,
            process,
            iteration_cap,
            provider_url,
            model,
            timeout,
            verbose,
            json,
        } => {
            let success = run(
                project_path,
                config_dir,
                process,
                iteration_cap,
                provider_url,
                model,
                timeout,
                verbose,
                json,
            )
            .await?;
            if !success {
                std::process::exit(1);
            }
        }
        Command::Check { config_dir } => check(config_dir)?,
    }
    Ok(())
}
