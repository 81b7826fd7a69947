//! `toolflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate` — validate a workflow definition JSON file.
//! - `run`      — execute a workflow file against the built-in demo tools.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::info;

use engine::{EngineConfig, StepSpec, WorkflowEngine, WorkflowOptions};
use executor::{ContextPool, ExecutionService, ServiceConfig};

mod demo;

#[derive(Parser)]
#[command(
    name = "toolflow",
    about = "Analysis-tool workflow orchestration engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: std::path::PathBuf,
    },
    /// Execute a workflow file using the built-in demo tools.
    Run {
        /// Path to the workflow JSON file.
        path: std::path::PathBuf,
        /// Record step failures and keep going instead of aborting.
        #[arg(long)]
        continue_on_error: bool,
    },
}

/// On-disk workflow definition.
#[derive(Deserialize)]
struct WorkflowFile {
    name: String,
    steps: Vec<StepSpec>,
}

fn load_workflow(path: &std::path::Path) -> anyhow::Result<WorkflowFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid workflow JSON in {}", path.display()))
}

fn build_engine() -> Arc<WorkflowEngine> {
    let registry = Arc::new(demo::registry());
    let service = Arc::new(ExecutionService::new(
        registry.clone(),
        ContextPool::new(),
        ServiceConfig::default(),
    ));
    WorkflowEngine::new(service, registry, EngineConfig::default())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => {
            let file = load_workflow(&path)?;
            let engine = build_engine();
            let workflow = engine
                .create_workflow(file.name, file.steps)
                .context("workflow failed validation")?;

            let order: Vec<&str> = workflow.steps.iter().map(|s| s.id.as_str()).collect();
            println!("workflow is valid; execution order: {order:?}");
        }

        Command::Run { path, continue_on_error } => {
            let file = load_workflow(&path)?;
            let engine = build_engine();
            let workflow = engine
                .create_workflow(file.name, file.steps)
                .context("workflow failed validation")?;
            let workflow_id = workflow.id;

            info!(%workflow_id, "submitting workflow");
            engine.execute_workflow(
                workflow_id,
                WorkflowOptions { continue_on_error, ..Default::default() },
            )?;

            // Fire-and-forget submission; observe completion by polling.
            let finished = loop {
                let snapshot = engine
                    .get_workflow(workflow_id)
                    .context("workflow disappeared mid-run")?;
                if snapshot.status.is_terminal() {
                    break snapshot;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            };

            for result in &finished.results {
                match &result.error {
                    Some(error) => println!(
                        "step '{}': {:?} [{}] {}",
                        result.step_id, result.status, error.code, error.message
                    ),
                    None => println!(
                        "step '{}': {:?} (retries: {}) {}",
                        result.step_id,
                        result.status,
                        result.retry_count,
                        result
                            .result
                            .as_ref()
                            .map(|v| v.to_string())
                            .unwrap_or_default()
                    ),
                }
            }

            println!(
                "workflow '{}' finished: {:?} in {} ms",
                finished.name,
                finished.status,
                finished.duration_ms().unwrap_or(0)
            );
            if finished.status != engine::WorkflowStatus::Completed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
