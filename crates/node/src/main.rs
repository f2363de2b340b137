//! btc-monitor - Bitcoin node metrics collector
//!
//! Polls a Bitcoin Core node over JSON-RPC on two cadences, optionally listens
//! to its ZMQ notification streams, and writes the derived measurements to an
//! InfluxDB v2 compatible store.
//!
//! Usage:
//!   btc-monitor --config btc-monitor.toml
//!
//! Every configuration value can also be supplied through the environment
//! (`BITCOIN_RPC_HOST`, `INFLUX_URL`, `SCRAPE_INTERVAL_FAST`, ...). The
//! process runs until Ctrl+C is received.

mod runtime;

use anyhow::{Context, Result};
use btc_monitor_config::{detect_rpc_credentials, CollectorConfig, LoggingSection};
use chrono::Local;
use clap::Parser;
use std::{
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard};
use tracing_subscriber::{fmt, EnvFilter};

const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "btc-monitor", about = "Bitcoin node metrics collector", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short = 'c', env = "BTC_MONITOR_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Overrides the configured log level (trace, debug, info, warn, error).
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Overrides the log format (text, json, pretty).
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<String>,

    /// Writes logs to this file or directory.
    #[arg(long, value_name = "PATH")]
    log_path: Option<PathBuf>,

    /// Run without console output.
    #[arg(long, short = 'd')]
    daemon: bool,

    /// Load and validate the configuration, then exit.
    #[arg(long)]
    healthcheck: bool,

    /// Like --healthcheck, and print the resolved RPC endpoint.
    #[arg(long)]
    check_config: bool,
}

impl Cli {
    fn apply_logging_overrides(&self, logging: &mut LoggingSection) {
        if let Some(level) = &self.log_level {
            logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            logging.format = format.clone();
        }
        if let Some(path) = &self.log_path {
            logging.file_path = Some(path.display().to_string());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = CollectorConfig::load(cli.config.as_deref())
        .with_context(|| match &cli.config {
            Some(path) => format!("failed to load configuration from {}", path.display()),
            None => "failed to load default configuration".to_string(),
        })?;
    config
        .apply_process_env()
        .context("invalid environment override")?;
    cli.apply_logging_overrides(&mut config.logging);

    let _log_guard = init_tracing(&config.logging, cli.daemon)?;

    config.validate().context("invalid configuration")?;

    if cli.healthcheck || cli.check_config {
        info!(
            target: "btc_monitor",
            network = %config.bitcoin.network,
            "configuration ok"
        );
        if cli.check_config {
            println!("rpc endpoint: {}", config.rpc_url());
            println!("metrics store: {}", config.influx.url);
        }
        return Ok(());
    }

    info!(
        target: "btc_monitor",
        network = %config.bitcoin.network,
        rpc = %config.rpc_url(),
        influx = %config.influx.url,
        fast_secs = config.scrape.interval_fast,
        slow_secs = config.scrape.interval_slow,
        "starting btc-monitor"
    );

    let credentials =
        detect_rpc_credentials(&config).context("failed to resolve RPC credentials")?;
    if credentials.is_none() {
        warn!(target: "btc_monitor", "no RPC credentials found, calling the node unauthenticated");
    }

    let rpc = Arc::new(runtime::build_rpc_client(&config, credentials)?);
    match rpc.get_network_info().await {
        Ok(info) => info!(
            target: "btc_monitor",
            version = info.version,
            subversion = %info.subversion,
            connections = info.connections,
            "connected to node"
        ),
        Err(err) => warn!(
            target: "btc_monitor",
            error = %err,
            "node not reachable yet, collection will retry"
        ),
    }

    let service = runtime::build_service(&config, rpc)?;
    service.start();

    if let Err(err) = signal::ctrl_c().await {
        error!(target: "btc_monitor", error = %err, "failed to wait for shutdown signal");
    } else {
        info!(target: "btc_monitor", "shutdown signal received (Ctrl+C)");
    }

    service.stop(SHUTDOWN_JOIN_TIMEOUT).await;
    info!(target: "btc_monitor", "shutdown complete");
    Ok(())
}

struct LoggingHandles {
    guard: Option<WorkerGuard>,
}

fn init_tracing(logging: &LoggingSection, daemon_mode: bool) -> Result<LoggingHandles> {
    use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

    let level = logging.level.trim();
    let level = if level.is_empty() { "info" } else { level };
    let filter_spec = format!("{level},btc_monitor={level}");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_spec));

    let mut guard = None;
    let file_writer = match logging
        .file_path
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        Some(path) => {
            let (writer, file_guard) = create_file_writer(path)?;
            guard = Some(file_guard);
            Some(writer)
        }
        None => None,
    };

    let has_file = file_writer.is_some();
    let console_enabled = logging.console_output && !daemon_mode;

    let writer: BoxMakeWriter = match (file_writer, console_enabled) {
        (Some(file), true) => BoxMakeWriter::new(io::stderr.and(file)),
        (Some(file), false) => BoxMakeWriter::new(file),
        (None, true) => BoxMakeWriter::new(io::stderr),
        (None, false) => BoxMakeWriter::new(io::sink),
    };

    let builder = fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_ansi(console_enabled && !has_file);

    match logging.format.to_ascii_lowercase().as_str() {
        "json" => {
            let _ = builder.json().try_init();
        }
        "pretty" => {
            let _ = builder.pretty().try_init();
        }
        _ => {
            let _ = builder.try_init();
        }
    }
    Ok(LoggingHandles { guard })
}

fn create_file_writer(path: &str) -> Result<(non_blocking::NonBlocking, WorkerGuard)> {
    let file_path = resolve_log_file(Path::new(path))?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&file_path)
        .with_context(|| format!("failed to open log file {}", file_path.display()))?;
    Ok(non_blocking(file))
}

/// A path with an extension is a file; anything else is a directory that
/// receives a dated log file.
fn resolve_log_file(provided: &Path) -> Result<PathBuf> {
    let file_path = if provided.is_file() || provided.extension().is_some() {
        provided.to_path_buf()
    } else {
        fs::create_dir_all(provided)
            .with_context(|| format!("failed to create log directory {}", provided.display()))?;
        provided.join(default_log_name())
    };

    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory {}", parent.display()))?;
        }
    }
    Ok(file_path)
}

fn default_log_name() -> String {
    format!("btc-monitor-{}.log", Local::now().format("%Y-%m-%d"))
}
