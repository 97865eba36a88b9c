//! Binary entry point for stratacog.
//!
//! This binary provides the CLI interface for the context layering and
//! enhancement decision core.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr/print_stdout in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::process::ExitCode;
use std::sync::Arc;
use stratacog::cli::{LayerCount, ProviderStatus, StatusReport, to_json};
use stratacog::config::{StorageKind, StratacogConfig};
use stratacog::coordinator::CircuitState;
use stratacog::models::Layer;
use stratacog::observability::{self, InitOptions};
use stratacog::orchestrator::DecisionOrchestrator;
use stratacog::storage::{MemoryBackend, SqliteBackend, StorageBackend};
use stratacog::{Error, cli};

/// Stratacog - context layering and enhancement decision core.
#[derive(Parser)]
#[command(name = "stratacog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "STRATACOG_CONFIG_PATH")]
    config: Option<String>,

    /// Emit JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run one orchestrated request for a session.
    Handle {
        /// Session identifier.
        #[arg(short, long)]
        session: String,

        /// The request text.
        #[arg(required = true, trailing_var_arg = true)]
        request: Vec<String>,
    },

    /// Show the aggregated context blob for a session.
    Context {
        /// Session identifier.
        #[arg(short, long)]
        session: String,

        /// Layers to aggregate (comma-separated; default all).
        #[arg(short, long, value_delimiter = ',')]
        layers: Option<Vec<String>>,

        /// Character budget override.
        #[arg(short, long)]
        budget: Option<usize>,
    },

    /// Show provider circuit health and session counts.
    Status {
        /// Include per-layer entry counts for this session.
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Show recent audit records for a session.
    Audit {
        /// Session identifier.
        #[arg(short, long)]
        session: String,

        /// Maximum records to show.
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Enumerate known sessions.
    Sessions,

    /// Show the effective configuration.
    Config {
        /// Show current configuration.
        #[arg(long)]
        show: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli_args = Cli::parse();

    if let Commands::Completions { shell } = &cli_args.command {
        let mut command = Cli::command();
        clap_complete::generate(*shell, &mut command, "stratacog", &mut std::io::stdout());
        return ExitCode::SUCCESS;
    }

    let config = match load_config(cli_args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init(
        &config.logging,
        InitOptions {
            verbose: cli_args.verbose,
        },
    ) {
        eprintln!("Failed to initialize observability: {e}");
        return ExitCode::FAILURE;
    }

    let result = match config.storage.backend {
        StorageKind::Memory => {
            run_command(cli_args, &config, Arc::new(MemoryBackend::new())).await
        },
        StorageKind::Sqlite => {
            let db_path = config.storage.resolved_db_path();
            if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    eprintln!("Failed to create data directory {}: {e}", parent.display());
                    return ExitCode::FAILURE;
                }
            }
            match SqliteBackend::new(db_path) {
                Ok(backend) => run_command(cli_args, &config, Arc::new(backend)).await,
                Err(e) => Err(e.into()),
            }
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Loads configuration from an explicit path or the default locations.
fn load_config(path: Option<&str>) -> Result<StratacogConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(config_path) => StratacogConfig::load_from_file(std::path::Path::new(config_path))?,
        None => StratacogConfig::load_default(),
    };
    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Dispatches the selected command over the chosen backend.
async fn run_command<B: StorageBackend>(
    cli_args: Cli,
    config: &StratacogConfig,
    backend: Arc<B>,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = cli_args.json;
    match cli_args.command {
        Commands::Handle { session, request } => {
            let orchestrator = config.build_orchestrator(backend)?;
            cmd_handle(&orchestrator, &session, &request.join(" "), json).await
        },

        Commands::Context {
            session,
            layers,
            budget,
        } => {
            let orchestrator = config.build_orchestrator(backend)?;
            cmd_context(&orchestrator, config, &session, layers, budget)
        },

        Commands::Status { session } => {
            let orchestrator = config.build_orchestrator(backend)?;
            cmd_status(&orchestrator, session.as_deref(), json)
        },

        Commands::Audit { session, limit } => {
            let orchestrator = config.build_orchestrator(backend)?;
            cmd_audit(&orchestrator, &session, limit, json)
        },

        Commands::Sessions => {
            let orchestrator = config.build_orchestrator(backend)?;
            cmd_sessions(&orchestrator, json)
        },

        Commands::Config { show } => cmd_config(config, show, json),

        // Handled before config loading.
        Commands::Completions { .. } => Ok(()),
    }
}

/// Handle command: run one request through the full decision flow.
async fn cmd_handle<B: StorageBackend>(
    orchestrator: &DecisionOrchestrator<B>,
    session: &str,
    request: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if request.trim().is_empty() {
        return Err(Box::new(Error::InvalidInput(
            "request text must not be empty".to_string(),
        )));
    }

    let (response, record) = orchestrator.handle_request(session, request).await?;

    if json {
        println!(
            "{}",
            to_json(&serde_json::json!({
                "response": response,
                "audit": record,
            }))?
        );
    } else {
        print!("{}", cli::render_response(&response, &record));
    }
    Ok(())
}

/// Context command: print the aggregated context blob.
fn cmd_context<B: StorageBackend>(
    orchestrator: &DecisionOrchestrator<B>,
    config: &StratacogConfig,
    session: &str,
    layers: Option<Vec<String>>,
    budget: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let layers = match layers {
        Some(names) => {
            let mut parsed = Vec::with_capacity(names.len());
            for name in &names {
                parsed.push(Layer::from_name(name)?);
            }
            parsed
        },
        None => config.context.layers.clone(),
    };
    let budget = budget.unwrap_or(config.context.budget_chars);

    let blob = orchestrator
        .store()
        .aggregate_context(session, &layers, budget)?;
    if blob.is_empty() {
        println!("(no context)");
    } else {
        println!("{blob}");
    }
    Ok(())
}

/// Status command: provider circuits plus session and layer counts.
fn cmd_status<B: StorageBackend>(
    orchestrator: &DecisionOrchestrator<B>,
    session: Option<&str>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let circuits = orchestrator.coordinator().circuit_states();
    let mut providers = Vec::new();
    for provider_id in orchestrator.coordinator().registry().provider_ids() {
        // Providers that have never been invoked have no breaker entry yet.
        let state = circuits.iter().find(|(id, _)| *id == provider_id).map_or(
            CircuitState::Closed {
                consecutive_failures: 0,
            },
            |(_, state)| *state,
        );
        providers.push(ProviderStatus {
            healthy: orchestrator
                .coordinator()
                .is_provider_healthy(&provider_id),
            provider_id,
            state,
        });
    }

    let session_layers = match session {
        Some(session_id) => Some(
            orchestrator
                .store()
                .layer_counts(session_id)?
                .into_iter()
                .map(|(layer, entries)| LayerCount { layer, entries })
                .collect(),
        ),
        None => None,
    };

    let report = StatusReport {
        providers,
        sessions: orchestrator.sessions()?.len(),
        session_layers,
    };

    if json {
        println!("{}", to_json(&report)?);
    } else {
        print!("{}", cli::render_status(&report));
    }
    Ok(())
}

/// Audit command: recent audit records, newest first.
fn cmd_audit<B: StorageBackend>(
    orchestrator: &DecisionOrchestrator<B>,
    session: &str,
    limit: usize,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let records = orchestrator.audit().recent(session, limit)?;
    if json {
        println!("{}", to_json(&records)?);
    } else {
        print!("{}", cli::render_audit(&records));
    }
    Ok(())
}

/// Sessions command: enumerate known sessions.
fn cmd_sessions<B: StorageBackend>(
    orchestrator: &DecisionOrchestrator<B>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let sessions = orchestrator.sessions()?;
    if json {
        println!("{}", to_json(&sessions)?);
    } else {
        print!("{}", cli::render_sessions(&sessions));
    }
    Ok(())
}

/// Config command: print the effective configuration.
fn cmd_config(
    config: &StratacogConfig,
    _show: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let summary = serde_json::json!({
        "classifier": {
            "simple_max": config.classifier.simple_max,
            "moderate_max": config.classifier.moderate_max,
            "complex_max": config.classifier.complex_max,
        },
        "coordinator": {
            "failure_threshold": config.coordinator.failure_threshold,
            "cooldown_ms": config.coordinator.cooldown_ms,
            "call_timeout_ms": config.coordinator.call_timeout_ms,
        },
        "layers": Layer::all()
            .iter()
            .map(|layer| {
                let bounds = config.retention.bounds_for(*layer);
                serde_json::json!({
                    "layer": layer.as_str(),
                    "max_entries": bounds.max_entries,
                    "max_age_ms": bounds.max_age_ms,
                })
            })
            .collect::<Vec<_>>(),
        "detector": {
            "min_confidence": config.detector.min_confidence,
            "max_matches": config.detector.max_matches,
        },
        "patterns": config.patterns,
        "capabilities": config.capabilities,
        "providers": config.providers.iter().map(|p| p.id.clone()).collect::<Vec<_>>(),
        "storage": {
            "backend": match config.storage.backend {
                StorageKind::Memory => "memory",
                StorageKind::Sqlite => "sqlite",
            },
            "db_path": config.storage.resolved_db_path(),
        },
        "context": {
            "layers": config.context.layers.iter().map(Layer::as_str).collect::<Vec<_>>(),
            "budget_chars": config.context.budget_chars,
        },
    });

    if json {
        println!("{}", to_json(&summary)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}
