//! Observability and telemetry.
//!
//! One-shot process initialization: a `tracing` registry with a pretty or
//! JSON fmt layer behind an `EnvFilter`, plus an optional Prometheus
//! exporter for long-lived processes. Components emit through the
//! `tracing` and `metrics` facades everywhere else; nothing outside this
//! module touches subscriber or recorder installation.

use std::net::SocketAddr;
use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{LogFormat, LoggingSettings};
use crate::{Error, Result};

/// Options for initialization that come from the CLI rather than config.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// Whether verbose output was requested via CLI.
    pub verbose: bool,
}

static OBSERVABILITY_INIT: OnceLock<()> = OnceLock::new();

/// Initializes logging and metrics for the process.
///
/// The log filter resolves from `STRATACOG_LOG`, then `RUST_LOG`, then
/// the configured level (with `--verbose` bumping the default to debug).
/// A Prometheus exporter is installed only when `metrics_listen` is set.
///
/// # Errors
///
/// Returns an error if observability has already been initialized, the
/// metrics listen address is malformed, or the exporter fails to bind.
pub fn init(settings: &LoggingSettings, options: InitOptions) -> Result<()> {
    if OBSERVABILITY_INIT.get().is_some() {
        return Err(Error::OperationFailed {
            operation: "observability_init".to_string(),
            cause: "observability already initialized".to_string(),
        });
    }

    let filter = build_filter(settings, options);

    match settings.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_target(true),
                )
                .with(filter)
                .try_init()
                .map_err(init_error)?;
        },
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true),
                )
                .with(filter)
                .try_init()
                .map_err(init_error)?;
        },
    }

    if let Some(listen) = &settings.metrics_listen {
        install_prometheus(listen)?;
    }

    OBSERVABILITY_INIT
        .set(())
        .map_err(|()| Error::OperationFailed {
            operation: "observability_init".to_string(),
            cause: "failed to mark observability initialized".to_string(),
        })?;

    Ok(())
}

/// Builds the env filter from the environment and settings fallback chain.
fn build_filter(settings: &LoggingSettings, options: InitOptions) -> EnvFilter {
    for var in ["STRATACOG_LOG", "RUST_LOG"] {
        if let Ok(directives) = std::env::var(var) {
            if !directives.trim().is_empty() {
                if let Ok(filter) = EnvFilter::try_new(&directives) {
                    return filter;
                }
            }
        }
    }

    let default = if options.verbose {
        "stratacog=debug".to_string()
    } else {
        settings
            .level
            .clone()
            .unwrap_or_else(|| "stratacog=info".to_string())
    };
    EnvFilter::try_new(&default).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the Prometheus recorder with an HTTP scrape listener.
fn install_prometheus(listen: &str) -> Result<()> {
    let addr: SocketAddr = listen.parse().map_err(|e| {
        Error::Config(format!("invalid metrics_listen address '{listen}': {e}"))
    })?;

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| Error::OperationFailed {
            operation: "install_prometheus".to_string(),
            cause: e.to_string(),
        })?;

    tracing::info!(listen = %addr, "Prometheus exporter listening");
    Ok(())
}

/// Helper to convert init errors.
#[allow(clippy::needless_pass_by_value)]
fn init_error(e: tracing_subscriber::util::TryInitError) -> Error {
    Error::OperationFailed {
        operation: "observability_init".to_string(),
        cause: e.to_string(),
    }
}
