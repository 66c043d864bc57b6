//! Predlock Core - deadlock detection, safe-state prediction, and recovery
//!
//! The `pl-core` binary loads a JSON scenario (or a snapshot list), runs
//! one analysis, and writes the result to stdout. Logs go to stderr.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use pl_common::{
    Config, ConfigPaths, ConfigResolver, Error, OutputFormat, ProcessId, ProcessSnapshot,
    ResourceId, StructuredError,
};
use pl_core::classify::{ClassificationMap, Classifier};
use pl_core::exit_codes::ExitCode;
use pl_core::logging::{
    event_names, generate_run_id, init_logging, LogConfig, LogFormat, LogLevel, Stage,
};
use pl_core::risk::RiskLevel;
use pl_core::scenario::Scenario;
use pl_core::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Predlock Core - resource-allocation graph analysis
#[derive(Parser)]
#[command(name = "pl-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to config.json (overrides PREDLOCK_CONFIG and XDG lookup)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Log level for stderr output
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log line format for stderr output
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect deadlock by graph reduction
    Detect(ScenarioArgs),

    /// Run the Banker's safety check
    Safety(ScenarioArgs),

    /// Evaluate a hypothetical grant without applying it
    WhatIf(WhatIfArgs),

    /// Rank recovery options for a deadlocked scenario
    Recover(RecoverArgs),

    /// Score risk for a list of process snapshots
    Risk(RiskArgs),

    /// Emit the render-ready node/link graph
    Graph(ScenarioArgs),

    /// Validate configuration
    Check,
}

// ============================================================================
// Command argument structs
// ============================================================================

#[derive(Args, Debug)]
struct ScenarioArgs {
    /// Scenario JSON file
    scenario: PathBuf,
}

#[derive(Args, Debug)]
struct WhatIfArgs {
    /// Scenario JSON file
    scenario: PathBuf,

    /// Process that would receive the grant
    #[arg(long)]
    process: String,

    /// Resource to grant
    #[arg(long)]
    resource: String,

    /// Instances to grant
    #[arg(long, default_value = "1", allow_negative_numbers = true)]
    amount: i64,
}

#[derive(Args, Debug)]
struct RecoverArgs {
    /// Scenario JSON file
    scenario: PathBuf,

    /// Apply the top eligible recommendation and report the resulting state
    #[arg(long)]
    apply: bool,
}

#[derive(Args, Debug)]
struct RiskArgs {
    /// Snapshot list (or a scenario with a `snapshots` section)
    snapshots: PathBuf,
}

// ============================================================================
// Errors and output
// ============================================================================

#[derive(Debug, ThisError)]
enum CliError {
    #[error(transparent)]
    Core(#[from] Error),

    #[error("invalid argument: {0}")]
    Args(String),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Core(err) => ExitCode::from(err),
            CliError::Args(_) => ExitCode::ArgsError,
        }
    }

    fn structured(&self) -> StructuredError {
        match self {
            CliError::Core(err) => StructuredError::from(err),
            CliError::Args(message) => StructuredError {
                code: 1,
                category: pl_common::ErrorCategory::Ledger,
                message: message.clone(),
                recoverable: false,
                context: Default::default(),
            },
        }
    }
}

/// Envelope every JSON payload is wrapped in.
#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    command: &'a str,
    run_id: &'a str,
    generated_at: String,
    result: &'a T,
}

struct Context {
    format: OutputFormat,
    run_id: String,
}

impl Context {
    /// Write `payload` as JSON, or the given summary/markdown renderings.
    fn emit<T: Serialize>(
        &self,
        command: &str,
        payload: &T,
        summary: String,
        markdown: impl FnOnce() -> String,
    ) -> Result<(), CliError> {
        match self.format {
            OutputFormat::Json => {
                let envelope = Envelope {
                    command,
                    run_id: &self.run_id,
                    generated_at: chrono::Utc::now().to_rfc3339(),
                    result: payload,
                };
                let text = serde_json::to_string_pretty(&envelope).map_err(Error::from)?;
                println!("{text}");
            }
            OutputFormat::Summary => println!("[{}] {command}: {summary}", self.run_id),
            OutputFormat::Md => println!("{}", markdown()),
        }
        Ok(())
    }
}

fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_env(cli.global.log_level, cli.global.log_format);
    init_logging(&log_config);

    let ctx = Context {
        format: cli.global.format,
        run_id: generate_run_id(),
    };
    tracing::info!(
        event = event_names::RUN_STARTED,
        stage = %Stage::Init,
        run_id = %ctx.run_id,
        "pl-core starting"
    );

    let exit_code = match run(&cli, &ctx) {
        Ok(code) => code,
        Err(err) => {
            let code = err.exit_code();
            if code.is_internal_error() {
                tracing::error!(event = event_names::INTERNAL_ERROR, %err, "command failed");
            }
            output_error(&ctx, &err);
            code
        }
    };

    tracing::info!(
        event = event_names::RUN_FINISHED,
        run_id = %ctx.run_id,
        exit_code = exit_code.as_i32(),
        "pl-core finished"
    );
    std::process::exit(exit_code.as_i32());
}

fn output_error(ctx: &Context, err: &CliError) {
    if ctx.format.is_machine_readable() {
        eprintln!("{}", err.structured().to_json_pretty());
    } else if ctx.format == OutputFormat::Md {
        let headline = match err {
            CliError::Core(e) => e.headline(),
            CliError::Args(_) => "Invalid Argument",
        };
        eprintln!("# {headline}\n\nError: {err}");
    } else {
        eprintln!("[{}] error: {}", ctx.run_id, err);
    }
}

fn run(cli: &Cli, ctx: &Context) -> Result<ExitCode, CliError> {
    let config = load_config(&cli.global)?;
    match &cli.command {
        Commands::Detect(args) => run_detect(ctx, &config, &args.scenario),
        Commands::Safety(args) => run_safety(ctx, &config, &args.scenario),
        Commands::WhatIf(args) => run_what_if(ctx, &config, args),
        Commands::Recover(args) => run_recover(ctx, &config, args),
        Commands::Risk(args) => run_risk(ctx, &config, &args.snapshots),
        Commands::Graph(args) => run_graph(ctx, &config, &args.scenario),
        Commands::Check => run_check(ctx, &config),
    }
}

fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    let resolver = ConfigResolver::new(ConfigPaths {
        config_path: global.config.clone(),
    });
    match Config::load(&resolver) {
        Ok(config) => {
            let event = if config.source.path.is_some() {
                event_names::CONFIG_LOADED
            } else {
                event_names::CONFIG_DEFAULT_USED
            };
            tracing::debug!(
                event,
                stage = %Stage::Init,
                resolution = %config.source.resolution,
                path = ?config.source.path
            );
            Ok(config)
        }
        Err(err) => {
            tracing::warn!(event = event_names::CONFIG_REJECTED, stage = %Stage::Init, %err);
            Err(err.into())
        }
    }
}

fn load_engine(config: &Config, path: &Path) -> Result<(Engine, Scenario), CliError> {
    let scenario = Scenario::load(path)?;
    let ledger = scenario.build()?;
    Ok((Engine::with_ledger(config, ledger)?, scenario))
}

// ============================================================================
// Commands
// ============================================================================

fn run_detect(ctx: &Context, config: &Config, path: &Path) -> Result<ExitCode, CliError> {
    let (engine, _) = load_engine(config, path)?;
    let report = engine.detect_deadlock();
    ctx.emit("detect", &report, report.message.clone(), || {
        let mut md = String::from("# Deadlock detection\n\n");
        md.push_str(&format!("{}\n", report.message));
        if report.deadlocked {
            let ids: Vec<&str> = report.participants.iter().map(ProcessId::as_str).collect();
            md.push_str(&format!("\n- Participants: {}\n", ids.join(", ")));
            let held: Vec<&str> = report.held_resources.iter().map(ResourceId::as_str).collect();
            md.push_str(&format!("- Held resources: {}\n", held.join(", ")));
        }
        md
    })?;
    Ok(ExitCode::from_outcome(report.deadlocked))
}

fn run_safety(ctx: &Context, config: &Config, path: &Path) -> Result<ExitCode, CliError> {
    let (engine, _) = load_engine(config, path)?;
    let report = engine.check_safe_state();
    ctx.emit("safety", &report, report.message.clone(), || {
        let mut md = format!(
            "# Safety check\n\n{}\n\n| Resource | Available |\n|---|---|\n",
            report.message
        );
        for (resource, available) in &report.available {
            md.push_str(&format!("| {resource} | {available} |\n"));
        }
        md
    })?;
    Ok(ExitCode::from_outcome(!report.is_safe))
}

fn run_what_if(ctx: &Context, config: &Config, args: &WhatIfArgs) -> Result<ExitCode, CliError> {
    if args.amount <= 0 {
        return Err(Error::NonPositiveAmount { amount: args.amount }.into());
    }
    let amount = u32::try_from(args.amount)
        .map_err(|_| CliError::Args(format!("amount {} is too large", args.amount)))?;
    let (engine, _) = load_engine(config, &args.scenario)?;
    let report = engine.what_if(
        &ProcessId::new(args.process.as_str()),
        &ResourceId::new(args.resource.as_str()),
        amount,
    )?;
    ctx.emit("what-if", &report, report.message.clone(), || {
        format!(
            "# What-if: {} × {} → {}\n\n{}\n",
            amount, args.resource, args.process, report.message
        )
    })?;
    Ok(ExitCode::from_outcome(!report.is_safe))
}

#[derive(Serialize)]
struct RecoverOutput {
    deadlock: pl_core::detect::DeadlockReport,
    recommendations: Vec<pl_core::recovery::RecoveryRecommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    applied: Option<pl_core::apply::RecoveryOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    after: Option<pl_core::detect::DeadlockReport>,
}

fn run_recover(ctx: &Context, config: &Config, args: &RecoverArgs) -> Result<ExitCode, CliError> {
    let (engine, scenario) = load_engine(config, &args.scenario)?;
    let classifier = Classifier::new(&config.classification)?;
    let classes: ClassificationMap = scenario.classifications(Some(&classifier));

    let deadlock = engine.detect_deadlock();
    let recommendations = engine.recommend_with(&classes, &scenario.snapshots);

    let mut output = RecoverOutput {
        deadlock,
        recommendations,
        applied: None,
        after: None,
    };
    if args.apply {
        if let Some(top) = output.recommendations.iter().find(|r| r.eligible) {
            output.applied = Some(engine.apply(top, None)?);
            output.after = Some(engine.detect_deadlock());
        }
    }

    let still_deadlocked = output
        .after
        .as_ref()
        .map_or(output.deadlock.deadlocked, |after| after.deadlocked);
    let summary = match output.recommendations.first() {
        Some(top) => format!(
            "{} option(s); top: {} {} (unblocks {})",
            output.recommendations.len(),
            top.action,
            top.target,
            top.estimated_unblocked
        ),
        None => "no deadlock, nothing to recover".to_string(),
    };
    ctx.emit("recover", &output, summary, || {
        let mut md = format!("# Recovery options\n\n{}\n\n", output.deadlock.message);
        md.push_str("| Target | Action | Class | Unblocks | Impact | Eligible |\n|---|---|---|---|---|---|\n");
        for rec in &output.recommendations {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {:.2} | {} |\n",
                rec.target,
                rec.action,
                rec.classification,
                rec.estimated_unblocked,
                rec.impact_score,
                if rec.eligible { "yes" } else { "no" }
            ));
        }
        if let Some(applied) = &output.applied {
            md.push_str(&format!("\nApplied: {}\n", applied.message));
        }
        md
    })?;
    Ok(ExitCode::from_outcome(still_deadlocked))
}

/// Accepted shapes for `risk` input.
#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotFile {
    List(Vec<ProcessSnapshot>),
    Scenario(Scenario),
}

fn run_risk(ctx: &Context, config: &Config, path: &Path) -> Result<ExitCode, CliError> {
    let text = std::fs::read_to_string(path).map_err(Error::from)?;
    let snapshots = match serde_json::from_str::<SnapshotFile>(&text).map_err(Error::from)? {
        SnapshotFile::List(list) => list,
        SnapshotFile::Scenario(scenario) => scenario.snapshots,
    };
    let engine = Engine::new(config)?;
    let classes = engine.classify(&snapshots);
    let records = engine.score_all(&snapshots);
    let recommendations: Vec<_> = records
        .iter()
        .filter(|r| r.level != RiskLevel::Low)
        .filter_map(|r| engine.recommend_for_risk(r, &classes))
        .collect();

    let high = records.iter().filter(|r| r.level == RiskLevel::High).count();
    let summary = format!("{} process(es) scored, {high} HIGH", records.len());
    let payload = serde_json::json!({
        "records": records,
        "classifications": classes,
        "recommendations": recommendations,
    });
    ctx.emit("risk", &payload, summary, || {
        let mut md = String::from("# Risk scores\n\n| Process | Score | Level |\n|---|---|---|\n");
        for record in &records {
            md.push_str(&format!(
                "| {} | {:.1} | {} |\n",
                record.process, record.score, record.level
            ));
        }
        md
    })?;
    Ok(ExitCode::from_outcome(high > 0))
}

fn run_graph(ctx: &Context, config: &Config, path: &Path) -> Result<ExitCode, CliError> {
    let (engine, _) = load_engine(config, path)?;
    let graph = engine.graph();
    let summary = format!("{} node(s), {} link(s)", graph.nodes.len(), graph.links.len());
    ctx.emit("graph", &graph, summary, || {
        let mut md = String::from("# Resource allocation graph\n\n");
        for link in &graph.links {
            md.push_str(&format!(
                "- {} → {} ({:?}, {})\n",
                link.source, link.target, link.kind, link.amount
            ));
        }
        md
    })?;
    Ok(ExitCode::Clean)
}

fn run_check(ctx: &Context, config: &Config) -> Result<ExitCode, CliError> {
    config.validate()?;
    Classifier::new(&config.classification)?;
    let payload = serde_json::json!({
        "status": "ok",
        "source": config.source,
        "risk": config.risk,
    });
    let summary = format!("config ok ({})", config.source.resolution);
    ctx.emit("check", &payload, summary, || {
        format!(
            "# pl-core check\n\n✓ config: ok\n  Source: {}\n",
            config.source.path.as_deref().unwrap_or("built-in defaults")
        )
    })?;
    Ok(ExitCode::Clean)
}
