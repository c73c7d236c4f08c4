// src/main.rs
//
// =============================================================================
// FLOWRT: COMMAND-LINE ENTRY POINT (§6.2)
// =============================================================================
//
// Three subcommands, all operating on a flow JSON document:
//   validate  - run the five-pass validator, print a human-readable report
//               (or `--json`), exit non-zero on failure.
//   inputs    - print the flow's declared required input variable ids, so a
//               caller can discover what to supply without running it.
//   run       - execute the flow to completion against supplied inputs,
//               given either repeated `--input key=value` flags or an
//               `--inputs-file` JSON document (or both — flags win).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flowrt::collaborators::Collaborators;
use flowrt::config::{CliOverrides, HostConfig};
use flowrt::executor::{FlowExecutor, NoopHooks};
use flowrt::flow::Flow;
use flowrt::validator::validate;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "flowrt", version, about = "Deterministic workflow flow executor")]
struct Cli {
    /// Optional host config file (YAML or JSON).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a flow document and print a report.
    Validate {
        /// Path to the flow JSON document.
        file: PathBuf,

        /// Print the report as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },

    /// Print the flow's declared required input variable ids.
    Inputs {
        /// Path to the flow JSON document.
        file: PathBuf,
    },

    /// Execute a flow document to completion.
    Run {
        /// Path to the flow JSON document.
        file: PathBuf,

        /// One input variable assignment, as `key=value`; `value` is parsed
        /// as JSON when possible, otherwise taken as a literal string.
        /// Repeatable.
        #[arg(long = "input")]
        inputs: Vec<InputAssignment>,

        /// Path to a JSON object of input variable values, merged under any
        /// `--input key=value` flags given alongside it.
        #[arg(long)]
        inputs_file: Option<PathBuf>,

        /// Override the global concurrency bound for this run.
        #[arg(long)]
        concurrency: Option<usize>,
    },
}

/// A single `--input key=value` flag. `value` is parsed as JSON when
/// possible (so `--input count=3` yields a number), otherwise kept as a
/// literal string (so `--input name=Ada` doesn't need quoting).
#[derive(Debug, Clone)]
struct InputAssignment(String, Value);

impl std::str::FromStr for InputAssignment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (key, raw) = s
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected key=value, got '{s}'"))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        Ok(InputAssignment(key.to_string(), value))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let host_config = HostConfig::load(
        cli.config.as_deref(),
        CliOverrides {
            concurrency: match &cli.command {
                Commands::Run { concurrency, .. } => *concurrency,
                _ => None,
            },
            log_level: None,
        },
    )?;
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(host_config.runtime_log_level.clone()),
    )
    .init();

    match cli.command {
        Commands::Validate { file, json } => run_validate(&file, json),
        Commands::Inputs { file } => run_inputs(&file),
        Commands::Run { file, inputs, inputs_file, .. } => {
            run_flow(&file, &inputs, inputs_file.as_deref(), &host_config).await
        }
    }
}

fn load_flow(path: &std::path::Path) -> Result<Flow> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading flow file {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("parsing flow file {} as JSON", path.display()))?;
    Flow::from_json(&value).with_context(|| format!("flow document {} does not match the flow schema", path.display()))
}

fn run_validate(path: &std::path::Path, as_json: bool) -> Result<()> {
    let flow = load_flow(path)?;
    let report = validate(&flow, None);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&ReportView::from(&report))?);
    } else {
        println!("flow: {} v{}", flow.name, flow.version);
        println!("status: {}", if report.ok { "ok" } else { "invalid" });
        for e in &report.errors {
            println!("  error [{}] {}: {}", e.code, e.path, e.message);
        }
        for w in &report.warnings {
            println!("  warning [{}] {}: {}", w.code, w.path, w.message);
        }
        if report.ok {
            println!("execution order: {}", report.execution_order.join(" -> "));
        }
    }

    if !report.ok {
        std::process::exit(1);
    }
    Ok(())
}

fn run_inputs(path: &std::path::Path) -> Result<()> {
    let flow = load_flow(path)?;
    let types: HashMap<&str, Option<flowrt::flow::VariableType>> =
        flow.variables.iter().map(|v| (v.id.as_str(), v.var_type)).collect();
    let describe = |ids: &[String]| -> Vec<VariableView> {
        ids.iter()
            .map(|id| VariableView {
                id: id.clone(),
                var_type: types.get(id.as_str()).copied().flatten(),
            })
            .collect()
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&InputsView {
            input: describe(&flow.input),
            output: describe(&flow.output),
        })?
    );
    Ok(())
}

/// One declared input/output id alongside its declared type, if any — a flow
/// variable is free to omit `type` entirely.
#[derive(serde::Serialize)]
struct VariableView {
    id: String,
    #[serde(rename = "type")]
    var_type: Option<flowrt::flow::VariableType>,
}

#[derive(serde::Serialize)]
struct InputsView {
    input: Vec<VariableView>,
    output: Vec<VariableView>,
}

async fn run_flow(
    path: &std::path::Path,
    input_flags: &[InputAssignment],
    inputs_file: Option<&std::path::Path>,
    host_config: &HostConfig,
) -> Result<()> {
    let flow = load_flow(path)?;

    let mut inputs: HashMap<String, Value> = match inputs_file {
        Some(p) => {
            let raw = std::fs::read_to_string(p)
                .with_context(|| format!("reading inputs file {}", p.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing inputs file {} as JSON", p.display()))?
        }
        None => HashMap::new(),
    };
    for InputAssignment(key, value) in input_flags {
        inputs.insert(key.clone(), value.clone());
    }

    let executor = FlowExecutor::new(
        host_config.runtime_concurrency,
        Collaborators::noop(),
        Arc::new(NoopHooks),
    );

    let result = executor
        .run_flow(&flow, inputs)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&RunResultView {
            flow_id: &result.flow_id,
            success: result.success,
            execution_time_ms: result.execution_time_ms,
            outputs: &result.outputs,
            error: result.error.as_deref(),
        })?
    );
    Ok(())
}

/// A serializable mirror of `FlowRunResult` — the library type itself
/// stays free of a hard `Serialize` dependency on its own shape.
#[derive(serde::Serialize)]
struct RunResultView<'a> {
    flow_id: &'a str,
    success: bool,
    execution_time_ms: u128,
    outputs: &'a HashMap<String, Value>,
    error: Option<&'a str>,
}

/// A serializable mirror of `ValidationReport` — kept separate so the
/// library type doesn't need a hard `Serialize` dependency on its own shape.
#[derive(serde::Serialize)]
struct ReportView<'a> {
    ok: bool,
    errors: &'a [flowrt::ValidationError],
    warnings: &'a [flowrt::ValidationError],
    execution_order: &'a [String],
}

impl<'a> From<&'a flowrt::ValidationReport> for ReportView<'a> {
    fn from(report: &'a flowrt::ValidationReport) -> Self {
        Self {
            ok: report.ok,
            errors: &report.errors,
            warnings: &report.warnings,
            execution_order: &report.execution_order,
        }
    }
}
