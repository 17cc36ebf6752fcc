use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use litfetch_core::{AppConfig, CoreError, ExitCode, read_identifiers_csv, write_records_csv};
use litfetch_science::acquisition::BackendGuesser;
use litfetch_science::identifiers::{dedup_identifiers, split_identifier_list};
use litfetch_science::{AcquisitionReport, AggregationReport, AggregationRequest, Aggregator, Scheduler, ScienceError};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "litfetch",
    about = "Aggregate literature metadata across providers and acquire full texts",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format. Also enabled by setting LITFETCH_JSON=1.
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of the standard location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Query every enabled provider and write the merged records as CSV.
    Metadata {
        /// Search query; the configured default is used when omitted.
        query: Option<String>,
        #[arg(long)]
        max_results: Option<usize>,
        /// CSV destination (defaults to export.metadata_csv).
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Download full texts for a list of identifiers.
    Fulltext {
        /// Metadata CSV with an identifier column.
        #[arg(long, conflicts_with = "doi")]
        input: Option<PathBuf>,
        /// Comma or whitespace separated identifiers.
        #[arg(long)]
        doi: Option<String>,
        /// Try this backend first for every identifier.
        #[arg(long)]
        backend: Option<String>,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List registered fetch backends in fallback order.
    Backends,

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the config file path.
    Path,
    /// Print the effective configuration.
    Show,
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let json_output = cli.json || std::env::var("LITFETCH_JSON").as_deref() == Ok("1");
    let code = match run(cli, json_output).await {
        Ok(code) => code,
        Err(err) => {
            let code = exit_code_for(&err);
            if json_output {
                let body = serde_json::json!({"status": "error", "message": format!("{err:#}")});
                println!("{body}");
            } else {
                eprintln!("error: {err:#}");
            }
            code
        }
    };
    std::process::exit(code as i32);
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli, json_output: bool) -> Result<ExitCode> {
    let start = Instant::now();
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::config_path);
    let config = AppConfig::load_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    match cli.command {
        Commands::Metadata {
            query,
            max_results,
            output,
        } => {
            let registry = litfetch_science::sources::build_default_registry(&config)?;
            let aggregator = Aggregator::new(registry, config.metadata.clone());
            let report = aggregator.run(AggregationRequest { query, max_results }).await?;

            let output = output.unwrap_or_else(|| config.metadata_csv_path());
            write_records_csv(&output, &report.records, &config.export.columns)?;

            let dur = start.elapsed().as_millis();
            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": {
                        "output": output,
                        "records": report.records.len(),
                        "requested_cap": report.requested_cap,
                        "effective_cap": report.effective_cap,
                        "cap_raised": report.cap_raised,
                        "trimmed": report.trimmed,
                        "providers": report.providers,
                    },
                    "meta": {"duration_ms": dur}
                }))?;
            } else {
                print_metadata_summary(&report, &output);
            }

            let all_failed = !report.providers.is_empty()
                && report.failed_providers().count() == report.providers.len();
            Ok(if all_failed { ExitCode::NetworkError } else { ExitCode::Success })
        }

        Commands::Fulltext {
            input,
            doi,
            backend,
            output,
        } => {
            let identifiers = match doi {
                Some(list) => split_identifier_list(&list),
                None => {
                    let path = input.unwrap_or_else(|| config.metadata_csv_path());
                    read_identifiers_csv(&path).with_context(|| format!("reading {}", path.display()))?
                }
            };
            let identifiers = dedup_identifiers(identifiers);
            if identifiers.is_empty() {
                eprintln!("No identifiers to fetch.");
                return Ok(ExitCode::NotFound);
            }

            let registry = litfetch_science::fetchers::build_default_registry(&config)?;
            if let Some(name) = backend.as_deref()
                && !registry.contains(name)
            {
                bail!(ScienceError::Configuration(format!(
                    "backend {name} is not registered (available: {})",
                    registry.names().join(", ")
                )));
            }

            let output_dir = output.unwrap_or_else(|| config.fulltext_dir());
            let cancel = CancellationToken::new();
            spawn_ctrl_c(cancel.clone());

            let scheduler =
                Scheduler::from_config(registry, &config.fulltext, &output_dir).with_cancellation(cancel);
            let plan = BackendGuesser::from_config(&config.fulltext)
                .force(backend.as_deref())
                .plan(&identifiers);
            let report = scheduler.run(plan).await?;

            let dur = start.elapsed().as_millis();
            if json_output {
                print_json(&serde_json::json!({
                    "status": if report.is_complete() { "ok" } else { "partial" },
                    "data": report,
                    "meta": {"duration_ms": dur, "output_dir": output_dir}
                }))?;
            } else {
                print_fulltext_summary(&report, &output_dir);
            }

            Ok(if report.is_complete() { ExitCode::Success } else { ExitCode::PartialFailure })
        }

        Commands::Backends => {
            let registry = litfetch_science::fetchers::build_default_registry(&config)?;
            let last_resort = config
                .fulltext
                .last_resort
                .as_deref()
                .filter(|name| registry.contains(name))
                .map(str::to_owned);
            let order = registry.fallback_order(&config.fulltext.backend_order, last_resort.as_deref());

            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": {
                        "backends": registry.describe(),
                        "fallback_order": order,
                        "last_resort": last_resort,
                    }
                }))?;
            } else {
                for info in registry.describe() {
                    let position = match order.iter().position(|name| *name == info.name) {
                        Some(i) => format!("#{}", i + 1),
                        None if last_resort.as_deref() == Some(info.name.as_str()) => "last resort".to_string(),
                        None => "-".to_string(),
                    };
                    println!(
                        "{:<12} {:<5} {:<6} {}",
                        info.name, info.content_type.as_str(), info.output_suffix, position
                    );
                }
            }
            Ok(ExitCode::Success)
        }

        Commands::Config { action } => {
            match action {
                ConfigAction::Path => {
                    if json_output {
                        print_json(&serde_json::json!({"status": "ok", "data": {"path": config_path}}))?;
                    } else {
                        println!("{}", config_path.display());
                    }
                }
                ConfigAction::Show => {
                    if json_output {
                        print_json(&serde_json::json!({"status": "ok", "data": config}))?;
                    } else {
                        print!("{}", toml::to_string_pretty(&config)?);
                    }
                }
            }
            Ok(ExitCode::Success)
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn spawn_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current batch");
            token.cancel();
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    if let Some(science) = err.downcast_ref::<ScienceError>() {
        return match science {
            ScienceError::Configuration(_) | ScienceError::InvalidDoi(_) => ExitCode::InvalidArgs,
            ScienceError::Http(_) | ScienceError::RateLimit(..) => ExitCode::NetworkError,
            ScienceError::Io(_) => ExitCode::FileSystemError,
            _ => ExitCode::GeneralError,
        };
    }
    if let Some(core) = err.downcast_ref::<CoreError>() {
        return match core {
            CoreError::Io(_) | CoreError::Csv(_) => ExitCode::FileSystemError,
            CoreError::MissingColumn { .. } | CoreError::UnknownColumn(_) | CoreError::ConfigError(_) => {
                ExitCode::InvalidArgs
            }
            CoreError::TomlParse(_) | CoreError::TomlSerialize(_) => ExitCode::InvalidArgs,
        };
    }
    ExitCode::GeneralError
}

fn print_metadata_summary(report: &AggregationReport, output: &Path) {
    for outcome in &report.providers {
        match &outcome.error {
            Some(err) => println!("  ✗ {:<10} {}", outcome.provider, err),
            None => println!("  ✓ {:<10} {} records (cap {})", outcome.provider, outcome.fetched, outcome.cap),
        }
    }
    if report.cap_raised {
        println!("cap raised from {} to {}", report.requested_cap, report.effective_cap);
    }
    println!("{} records written to {}", report.records.len(), output.display());
    info!(records = report.records.len(), trimmed = report.trimmed, "metadata run finished");
}

fn print_fulltext_summary(report: &AcquisitionReport, output_dir: &Path) {
    println!(
        "{}/{} identifiers resolved into {}",
        report.resolved.len(),
        report.total(),
        output_dir.display()
    );
    for (identifier, resolution) in &report.resolved {
        println!("  ✓ {identifier} [{}] {}", resolution.backend, resolution.path.display());
    }
    for item in &report.unresolved {
        let reason = item
            .last_error
            .as_deref()
            .or(item.terminal_error.as_deref())
            .unwrap_or("no backend attempted");
        println!("  ✗ {} ({:?}): {reason}", item.identifier, item.reason);
    }
    if report.cancelled {
        println!("run cancelled before completion");
    }
}
