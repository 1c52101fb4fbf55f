//! TFT bridge: entry point.
//!
//! Connects a touchscreen controller on a serial port to a Moonraker host.
//!
//! # Usage
//!
//! ```text
//! tft-bridge [OPTIONS]
//!
//! Options:
//!   -p, --serial-port <PATH>      Touchscreen serial device
//!   -b, --baud-rate <BAUD>        Serial baud rate [default: 250000]
//!   -m, --moonraker-host <HOST>   Host address [default: localhost]
//!   -P, --moonraker-port <PORT>   Host port [default: 7125]
//!   -t, --timeout <SECS>          Request timeout [default: 5]
//!   -r, --max-retries <N>         Attempts per request [default: 5]
//!       --retry-delay <SECS>      Base retry delay [default: 1]
//!   -l, --log-level <LEVEL>       Log filter when RUST_LOG is unset [default: info]
//!   -T, --test-mode               Acknowledge everything, execute nothing
//!   -S, --standalone              Permissive config, auto-detect the port
//!       --list-macros             Print the host's macros and exit
//!   -c, --config <FILE>           TOML file with any of the settings above
//! ```
//!
//! # Configuration layering
//!
//! Built-in defaults, then the TOML file, then `TFT_*` environment variables,
//! then command-line flags.  The result is validated once; in standalone mode
//! invalid values fall back to defaults instead of aborting.
//!
//! | Variable              | Flag                 |
//! |-----------------------|----------------------|
//! | `TFT_SERIAL_PORT`     | `--serial-port`      |
//! | `TFT_BAUD_RATE`       | `--baud-rate`        |
//! | `TFT_MOONRAKER_HOST`  | `--moonraker-host`   |
//! | `TFT_MOONRAKER_PORT`  | `--moonraker-port`   |
//! | `TFT_TIMEOUT`         | `--timeout`          |
//! | `TFT_MAX_RETRIES`     | `--max-retries`      |
//! | `TFT_RETRY_DELAY`     | `--retry-delay`      |
//! | `TFT_LOG_LEVEL`       | `--log-level`        |
//! | `TFT_TEST_MODE`       | `--test-mode`        |
//! | `TFT_STANDALONE`      | `--standalone`       |
//! | `TFT_CONFIG`          | `--config`           |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tft_bridge::application::TranslationEngine;
use tft_bridge::infrastructure::device::serial::detect_port;
use tft_bridge::infrastructure::device::{PortOpener, SystemPortOpener};
use tft_bridge::infrastructure::host::ApiClient;
use tft_bridge::infrastructure::orchestrator::Bridge;
use tft_core::config::DEFAULT_SERIAL_PORT;
use tft_core::{validate, RawConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Bridge between a touchscreen controller and a Moonraker host.
#[derive(Debug, Parser)]
#[command(name = "tft-bridge", version)]
struct Cli {
    /// Serial device the touchscreen is attached to.
    ///
    /// Required unless `--standalone` is given, in which case the first USB
    /// serial adapter is used.
    #[arg(short = 'p', long, env = "TFT_SERIAL_PORT")]
    serial_port: Option<String>,

    #[arg(short = 'b', long, env = "TFT_BAUD_RATE")]
    baud_rate: Option<u32>,

    #[arg(short = 'm', long, env = "TFT_MOONRAKER_HOST")]
    moonraker_host: Option<String>,

    #[arg(short = 'P', long, env = "TFT_MOONRAKER_PORT", allow_negative_numbers = true)]
    moonraker_port: Option<i64>,

    /// Per-request timeout in seconds.
    #[arg(short = 't', long, env = "TFT_TIMEOUT", allow_negative_numbers = true)]
    timeout: Option<f64>,

    /// Attempts per host request before giving up.
    #[arg(short = 'r', long, env = "TFT_MAX_RETRIES", allow_negative_numbers = true)]
    max_retries: Option<i64>,

    /// Base delay in seconds between retries; doubles per attempt.
    #[arg(long, env = "TFT_RETRY_DELAY", allow_negative_numbers = true)]
    retry_delay: Option<f64>,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(short = 'l', long, default_value = "info", env = "TFT_LOG_LEVEL")]
    log_level: String,

    /// Acknowledge and log commands without executing them on the printer.
    #[arg(short = 'T', long, env = "TFT_TEST_MODE")]
    test_mode: bool,

    /// Run without installation: lenient config and port auto-detection.
    #[arg(short = 'S', long, env = "TFT_STANDALONE")]
    standalone: bool,

    /// Print the macros the host defines, grouped by category, and exit.
    #[arg(long)]
    list_macros: bool,

    /// TOML configuration file.
    #[arg(short = 'c', long, env = "TFT_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Layers the config file and the command line over the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed.
    fn raw_config(&self) -> anyhow::Result<RawConfig> {
        let mut raw = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("cannot read config file {}", path.display()))?;
                RawConfig::from_toml_str(&text)
                    .with_context(|| format!("invalid config file {}", path.display()))?
            }
            None => RawConfig::default(),
        };

        if let Some(v) = &self.serial_port {
            raw.serial_port = v.clone();
        }
        if let Some(v) = self.baud_rate {
            raw.baud_rate = v;
        }
        if let Some(v) = &self.moonraker_host {
            raw.host = v.clone();
        }
        if let Some(v) = self.moonraker_port {
            raw.port = v;
        }
        if let Some(v) = self.timeout {
            raw.timeout_secs = v;
        }
        if let Some(v) = self.max_retries {
            raw.max_retries = v;
        }
        if let Some(v) = self.retry_delay {
            raw.retry_delay_secs = v;
        }
        raw.test_mode |= self.test_mode || self.list_macros;
        raw.standalone_mode |= self.standalone;

        if raw.serial_port.is_empty() {
            if self.list_macros {
                // The device is never opened when listing macros.
                raw.serial_port = DEFAULT_SERIAL_PORT.to_string();
            } else if raw.standalone_mode {
                raw.serial_port = match detect_port() {
                    Some(port) => {
                        info!("auto-detected serial port {port}");
                        port
                    }
                    None => {
                        warn!("no USB serial port found, using {DEFAULT_SERIAL_PORT}");
                        DEFAULT_SERIAL_PORT.to_string()
                    }
                };
            }
        }

        Ok(raw)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let raw = cli.raw_config()?;
    let mode = raw.mode();
    let config = Arc::new(validate(raw, mode).context("invalid configuration")?);

    let client = Arc::new(ApiClient::new(Arc::clone(&config)));

    if cli.list_macros {
        return list_macros(&client).await;
    }

    let opener: Arc<dyn PortOpener> = Arc::new(SystemPortOpener);
    let bridge = Arc::new(Bridge::new(config, client, opener));

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    bridge.run(cancel).await;
    Ok(())
}

/// Loads the host's macros once and prints them by category.
async fn list_macros(client: &Arc<ApiClient>) -> anyhow::Result<()> {
    client.start().await;
    let reachable = client.get_info().await;
    let groups = match reachable {
        Ok(_) => {
            let engine = TranslationEngine::new(Arc::clone(client));
            engine.ensure_macros_loaded().await;
            engine.list_macros_by_category().await
        }
        Err(_) => Vec::new(),
    };
    client.stop().await;

    reachable.context("could not reach the host to list macros")?;

    if groups.is_empty() {
        println!("No macros defined on the host.");
        return Ok(());
    }
    println!("Available macros:");
    for (category, names) in groups {
        println!();
        println!("{category}:");
        for name in names {
            println!("  - {name}");
        }
    }
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, initiating shutdown"),
        _ = terminate => info!("received SIGTERM, initiating shutdown"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
