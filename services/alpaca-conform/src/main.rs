//! Alpaca Conform CLI
//!
//! Runs the protocol conformance test against one Alpaca device and exits
//! with the number of errors plus issues found.

use std::path::PathBuf;

use alpaca_conform::device::DeviceType;
use alpaca_conform::report::{print_summary, write_report};
use alpaca_conform::{load_config, Config, ConformBuilder, ABORT_RETURN_CODE};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "alpaca-conform")]
#[command(about = "ASCOM Alpaca protocol conformance checker")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device host (overrides config file)
    #[arg(long)]
    host: Option<String>,

    /// Device port (overrides config file)
    #[arg(long)]
    port: Option<u16>,

    /// Device type, e.g. telescope or covercalibrator (overrides config file)
    #[arg(long)]
    device_type: Option<DeviceType>,

    /// Device number (overrides config file)
    #[arg(long)]
    device_number: Option<u32>,

    /// Report every ambiguous outcome as an issue
    #[arg(long)]
    strict: bool,

    /// Write a JSON report to this path (overrides config file)
    #[arg(long)]
    report: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!(
        "Parsed command line arguments: config={:?}, host={:?}, port={:?}, device_type={:?}, device_number={:?}, strict={}, log_level={:?}",
        args.config,
        args.host,
        args.port,
        args.device_type,
        args.device_number,
        args.strict,
        args.log_level
    );

    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("Conformance run aborted: {}", e);
            ABORT_RETURN_CODE
        }
    };
    std::process::exit(code);
}

async fn run(args: Args) -> alpaca_conform::Result<i32> {
    let mut config = if let Some(config_path) = &args.config {
        tracing::debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        tracing::debug!("Using default configuration");
        Config::default()
    };

    if let Some(host) = args.host {
        config.device.host = host;
    }
    if let Some(port) = args.port {
        config.device.port = port;
    }
    if let Some(device_type) = args.device_type {
        config.device.device_type = device_type;
    }
    if let Some(device_number) = args.device_number {
        config.device.device_number = device_number;
    }
    if args.strict {
        config.protocol.strict_mode = true;
    }
    if let Some(report) = args.report {
        config.report.path = Some(report);
    }
    let report_path = config.report.path.clone();

    let cancel = CancellationToken::new();
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Stop requested, finishing with a disconnect");
            cancel_for_signal.cancel();
        }
    });

    let runner = ConformBuilder::new(config).with_cancel(cancel).build()?;
    let summary = runner.run().await;

    print_summary(&summary);
    if let Some(path) = report_path {
        if let Err(e) = write_report(&summary, &path) {
            tracing::error!("Unable to write report to {:?}: {}", path, e);
        }
    }
    Ok(summary.return_code)
}
