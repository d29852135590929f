//! CLI command definitions for ghg-pipeline.
//!
//! The `run` command drives one workflow per input file through the engine
//! using placeholder transform and calculation steps, and reports every
//! terminal state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::lineage::{HttpLineageRecorder, InMemoryLineageLedger, LineageRecord, LineageRecorder};
use crate::metrics::{export_metrics, init_metrics};
use crate::pipeline::{
    CalculationResult, ExecutionContext, StaticBulkTransform, StaticCalculationBackend,
    TerminalState, WorkflowConfig, WorkflowEngine, WorkflowStats, QUALITY_PASS_MARKER,
};

/// Default container for transformed batches.
const DEFAULT_TRANSFORMED_CONTAINER: &str = "transformed";

/// Default container for calculation results.
const DEFAULT_ENRICHED_CONTAINER: &str = "enriched";

/// Greenhouse-gas activity data pipeline orchestrator.
#[derive(Parser)]
#[command(name = "ghg-pipeline")]
#[command(about = "Run the GHG emissions workflow over raw activity files")]
#[command(version)]
#[command(
    long_about = "ghg-pipeline sequences raw activity files through quality gating, bulk transformation, and a bounded parallel emissions calculation, recording lineage around every step.\n\nExample usage:\n  ghg-pipeline run --input s3://raw/activity.csv --batches 5 --json"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the workflow for one or more raw input files.
    Run(RunArgs),
}

/// Arguments for `ghg-pipeline run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Raw file location; repeat for concurrent runs.
    #[arg(short, long = "input", required = true, num_args = 1..)]
    pub inputs: Vec<String>,

    /// Validation result written for each input.
    #[arg(short, long, default_value = QUALITY_PASS_MARKER)]
    pub quality_result: String,

    /// Number of batches the transform step reports.
    #[arg(short, long, default_value = "5")]
    pub batches: usize,

    /// Storage type for lineage events and location scheme (overrides WORKFLOW_STORAGE_TYPE).
    #[arg(long)]
    pub storage_type: Option<String>,

    /// Container the transform step writes batches to.
    #[arg(long, default_value = DEFAULT_TRANSFORMED_CONTAINER)]
    pub transformed_container: String,

    /// Container the calculation step writes results to.
    #[arg(long, default_value = DEFAULT_ENRICHED_CONTAINER)]
    pub enriched_container: String,

    /// Lineage service endpoint. Without one, lineage is kept in memory and
    /// included in the summary.
    #[arg(long, env = "LINEAGE_ENDPOINT")]
    pub lineage_endpoint: Option<String>,

    /// Run deadline in seconds (overrides WORKFLOW_DEADLINE_SECS).
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Maximum concurrent calculations per run (overrides WORKFLOW_MAX_CONCURRENT_CALCULATIONS).
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Output JSON to stdout instead of a human-readable summary.
    #[arg(short = 'j', long)]
    pub json: bool,

    /// Collect Prometheus metrics and print them after the summary.
    #[arg(long)]
    pub metrics: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_workflow_command(args).await,
    }
}

// ============================================================================
// Run Command Implementation
// ============================================================================

/// JSON output structure for a `run` invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub status: String,
    pub runs: Vec<RunOutput>,
    pub stats: WorkflowStats,
    pub total_duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lineage: Option<Vec<LineageRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<String>,
}

/// JSON output structure for one workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub root_id: String,
    pub input: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub final_location: String,
    pub batches: usize,
    pub results: Vec<CalculationResult>,
}

impl RunOutput {
    fn from_terminal(input: String, terminal: &TerminalState) -> Self {
        let context = terminal.context();
        let (outcome, reason, error) = match terminal.reason() {
            None => ("success", None, None),
            Some(reason) => (
                "failure",
                Some(reason.kind().to_string()),
                Some(reason.to_string()),
            ),
        };

        Self {
            root_id: context.root_id.clone(),
            input,
            outcome: outcome.to_string(),
            reason,
            error,
            final_location: context.storage_location.clone(),
            batches: context.batches.len(),
            results: context.batch_results.clone(),
        }
    }
}

/// Builds the engine configuration from the environment and CLI overrides.
fn build_config(args: &RunArgs) -> anyhow::Result<WorkflowConfig> {
    let mut config = WorkflowConfig::from_env()?;

    if let Some(secs) = args.deadline_secs {
        config = config.with_deadline(Duration::from_secs(secs));
    }
    if let Some(concurrency) = args.concurrency {
        config = config.with_max_concurrent_calculations(concurrency);
    }
    if let Some(storage_type) = &args.storage_type {
        config = config.with_storage_type(storage_type.clone());
    }

    config.validate()?;
    Ok(config)
}

async fn run_workflow_command(args: RunArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    if args.metrics {
        init_metrics().map_err(|e| anyhow::anyhow!("Failed to initialize metrics: {}", e))?;
    }

    let config = build_config(&args)?;
    let storage_type = config.storage_type.clone();

    let ledger = Arc::new(InMemoryLineageLedger::new());
    let recorder: Arc<dyn LineageRecorder> = match &args.lineage_endpoint {
        Some(endpoint) => {
            info!(endpoint = %endpoint, "Recording lineage to HTTP endpoint");
            Arc::new(HttpLineageRecorder::new(endpoint.clone())?)
        }
        None => ledger.clone(),
    };

    let engine = WorkflowEngine::new(
        config,
        recorder,
        Arc::new(StaticBulkTransform::new(
            storage_type.clone(),
            args.transformed_container.clone(),
            args.batches,
        )),
        Arc::new(StaticCalculationBackend::new(
            args.enriched_container.clone(),
        )),
    )?;

    let contexts: Vec<ExecutionContext> = args
        .inputs
        .iter()
        .map(|input| {
            engine
                .context_for(input.clone())
                .with_validation_result(args.quality_result.clone())
        })
        .collect();

    info!(runs = contexts.len(), "Starting workflow runs");
    let terminals = engine.run_batch(contexts).await;

    let runs: Vec<RunOutput> = args
        .inputs
        .iter()
        .cloned()
        .zip(terminals.iter())
        .map(|(input, terminal)| RunOutput::from_terminal(input, terminal))
        .collect();
    let failed = runs.iter().filter(|r| r.outcome == "failure").count();

    let summary = RunSummary {
        status: if failed == 0 { "success" } else { "failed" }.to_string(),
        runs,
        stats: engine.stats().await,
        total_duration_ms: start.elapsed().as_millis() as u64,
        lineage: args.lineage_endpoint.is_none().then(|| ledger.records()),
        metrics: args.metrics.then(export_metrics),
    };

    if args.json {
        let json_output = serde_json::to_string_pretty(&summary)
            .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
        println!("{}", json_output);
    } else {
        print_summary(&summary);
    }

    if failed > 0 {
        warn!(failed = failed, total = summary.runs.len(), "Some workflow runs failed");
        anyhow::bail!("{} of {} workflow runs failed", failed, summary.runs.len());
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("Workflow runs: {}", summary.runs.len());
    for run in &summary.runs {
        match &run.error {
            None => println!(
                "  [ok]     {} -> {} ({} batches)",
                run.input, run.final_location, run.batches
            ),
            Some(error) => println!("  [failed] {}: {}", run.input, error),
        }
        for result in &run.results {
            println!("             {}", result.location);
        }
    }

    println!(
        "Succeeded: {}  Failed: {}  Timed out: {}",
        summary.stats.succeeded, summary.stats.failed, summary.stats.timed_out
    );
    println!("Total duration: {} ms", summary.total_duration_ms);

    if let Some(lineage) = &summary.lineage {
        println!("Lineage events: {}", lineage.len());
        for record in lineage {
            println!(
                "  {} {:<22} {} <- {}",
                record.event.timestamp.format("%H:%M:%S%.3f"),
                record.event.action,
                record.node_id,
                record.event.parent_id
            );
        }
    }

    if let Some(metrics) = &summary.metrics {
        println!();
        print!("{}", metrics);
    }
}
