//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use tiebreak_guard::canary::router::canary_bucket;
use tiebreak_guard::core::config_store::ConfigStore;
use tiebreak_guard::core::mode::Mode;
use tiebreak_guard::core::settings::GuardSettings;
use tiebreak_guard::logger::jsonl::{JsonlWriter, TelemetrySink};
use tiebreak_guard::pipeline::{GuardPipeline, RerankRequest};

/// Guarded tie-break reranking: fail-closed reordering of near-tie results.
#[derive(Debug, Parser)]
#[command(
    name = "gtb",
    author,
    version,
    about = "Guarded Tie-Break - fail-closed near-tie reranking",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Load settings and both artifacts; report what the guard would see.
    CheckConfig(CheckConfigArgs),
    /// Print the canary bucket for a request key.
    Bucket(BucketArgs),
    /// Run one rerank request through the guard.
    Evaluate(EvaluateArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct CheckConfigArgs {
    /// Evaluate artifacts as this mode would (enforce rejects draft thresholds).
    #[arg(long, value_name = "MODE")]
    mode: Option<Mode>,
}

#[derive(Debug, Clone, Args)]
struct BucketArgs {
    /// Request key to hash.
    key: String,
}

#[derive(Debug, Clone, Args, Default)]
struct EvaluateArgs {
    /// Request JSON file; stdin when omitted or `-`.
    #[arg(long, short, value_name = "PATH")]
    input: Option<PathBuf>,
    /// Override the configured mode.
    #[arg(long, value_name = "MODE")]
    mode: Option<Mode>,
    /// Override the top-K window for this request.
    #[arg(long, value_name = "N")]
    k: Option<usize>,
    /// Also append the telemetry record to the configured JSONL log.
    #[arg(long)]
    record: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure (including fail-closed configuration).
    #[error("{0}")]
    Runtime(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::CheckConfig(args) => run_check_config(cli, args),
        Command::Bucket(args) => run_bucket(cli, args),
        Command::Evaluate(args) => run_evaluate(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn load_settings(cli: &Cli) -> Result<GuardSettings, CliError> {
    GuardSettings::load(cli.config.as_deref()).map_err(|e| CliError::Runtime(e.to_string()))
}

// ──────────────────────── check-config ────────────────────────

fn run_check_config(cli: &Cli, args: &CheckConfigArgs) -> Result<(), CliError> {
    let settings = load_settings(cli)?;
    let mode = args.mode.unwrap_or(settings.mode);
    let store = ConfigStore::new(settings.artifact_paths());

    let thresholds = store.load_thresholds_for(mode);
    let canary = store.load_canary_config();
    let settings_hash = settings
        .stable_hash()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    let thresholds_json = match &thresholds {
        Ok(t) => json!({
            "status": "ok",
            "path": settings.artifacts.thresholds_file.to_string_lossy(),
            "schema_version": t.schema_version,
            "frozen": t.frozen,
            "frozen_at": t.frozen_at.map(|ts| ts.to_rfc3339()),
            "fingerprint": t.fingerprint(),
        }),
        Err(reason) => {
            let detail = store.thresholds_failure(mode).map(|f| f.detail);
            json!({
                "status": "failclosed",
                "path": settings.artifacts.thresholds_file.to_string_lossy(),
                "reason_code": reason,
                "detail": detail,
            })
        }
    };
    let canary_json = match &canary {
        Ok(c) => json!({
            "status": "ok",
            "path": settings.artifacts.canary_file.to_string_lossy(),
            "source": c.source,
            "canary_percent": c.canary_percent,
            "kill_switch": c.kill_switch,
        }),
        Err(reason) => {
            let detail = store.canary_failure().map(|f| f.detail);
            json!({
                "status": "failclosed",
                "path": settings.artifacts.canary_file.to_string_lossy(),
                "reason_code": reason,
                "detail": detail,
            })
        }
    };

    match output_mode(cli) {
        OutputMode::Json => {
            let payload = json!({
                "command": "check-config",
                "mode": mode,
                "settings_hash": settings_hash,
                "config_file": settings.config_file.to_string_lossy(),
                "thresholds": thresholds_json,
                "canary": canary_json,
            });
            write_json_line(&payload)?;
        }
        OutputMode::Human if !cli.quiet => {
            println!("mode: {mode}  settings: {settings_hash}");
            match &thresholds {
                Ok(t) => println!(
                    "thresholds {} {} (schema {}, {})",
                    "ok".green(),
                    t.short_fingerprint(),
                    t.schema_version,
                    if t.frozen { "frozen" } else { "draft" },
                ),
                Err(reason) => {
                    println!("thresholds {} {reason}", "FAIL".red().bold());
                    if cli.verbose
                        && let Some(failure) = store.thresholds_failure(mode)
                    {
                        println!("  {}", failure.detail);
                    }
                }
            }
            match &canary {
                Ok(c) => println!(
                    "canary     {} {}% kill_switch={} ({})",
                    "ok".green(),
                    c.canary_percent,
                    c.kill_switch,
                    c.source,
                ),
                Err(reason) => {
                    println!("canary     {} {reason}", "FAIL".red().bold());
                    if cli.verbose
                        && let Some(failure) = store.canary_failure()
                    {
                        println!("  {}", failure.detail);
                    }
                }
            }
        }
        OutputMode::Human => {}
    }

    match (thresholds, canary) {
        (Ok(_), Ok(_)) => Ok(()),
        (Err(reason), _) | (_, Err(reason)) => Err(CliError::Runtime(format!(
            "configuration fails closed: {reason}"
        ))),
    }
}

// ──────────────────────── bucket ────────────────────────

fn run_bucket(cli: &Cli, args: &BucketArgs) -> Result<(), CliError> {
    let bucket = canary_bucket(&args.key);
    match output_mode(cli) {
        OutputMode::Json => write_json_line(&json!({"command": "bucket", "canary_bucket": bucket})),
        OutputMode::Human => {
            println!("{bucket}");
            Ok(())
        }
    }
}

// ──────────────────────── evaluate ────────────────────────

fn run_evaluate(cli: &Cli, args: &EvaluateArgs) -> Result<(), CliError> {
    let mut settings = load_settings(cli)?;
    if let Some(mode) = args.mode {
        settings.mode = mode;
    }

    let raw = match &args.input {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .map_err(|e| CliError::User(format!("cannot read {}: {e}", path.display())))?,
        _ => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let mut request: RerankRequest = serde_json::from_str(&raw)
        .map_err(|e| CliError::User(format!("invalid rerank request: {e}")))?;
    if let Some(k) = args.k {
        if k == 0 {
            return Err(CliError::User("--k must be at least 1".to_string()));
        }
        request.k = Some(k);
    }

    let pipeline = GuardPipeline::from_settings(&settings);
    let outcome = pipeline.process(&request);

    if args.record && settings.telemetry.enabled {
        let mut writer = JsonlWriter::open(settings.jsonl_config());
        writer
            .emit(&outcome.telemetry)
            .map_err(|e| CliError::Runtime(e.to_string()))?;
        writer.flush();
    }

    let ids: Vec<&str> = outcome.ranking.iter().map(|c| c.doc_id.as_str()).collect();
    match output_mode(cli) {
        OutputMode::Json => {
            let payload = json!({
                "command": "evaluate",
                "ranking": ids,
                "telemetry": serde_json::to_value(&outcome.telemetry)?,
            });
            write_json_line(&payload)?;
        }
        OutputMode::Human if !cli.quiet => {
            let t = &outcome.telemetry;
            let outcome_label = t.outcome_reason_code.to_string();
            let outcome_label = if t.changed {
                outcome_label.green().bold()
            } else {
                outcome_label.normal()
            };
            println!(
                "{outcome_label}  guard={} route={} mode={}",
                t.guard_state, t.route_reason_code, t.mode
            );
            if cli.verbose {
                if let Some(shadow) = &t.shadow {
                    println!(
                        "  shadow: groups={} proposed={} up={} down={} budget_hit={}",
                        shadow.near_tie_group_count,
                        shadow.proposed_swap_count,
                        shadow.moved_up_count,
                        shadow.moved_down_count,
                        shadow.budget_hit
                    );
                }
                println!(
                    "  canary: bucket={} applied={}",
                    t.canary.canary_bucket, t.canary.applied
                );
            }
            for (rank, id) in ids.iter().enumerate() {
                println!("{:>4}  {id}", rank + 1);
            }
        }
        OutputMode::Human => {}
    }
    Ok(())
}

// ──────────────────────── output ────────────────────────

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("GTB_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
