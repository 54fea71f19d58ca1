//! focusd - The focus session service
//!
//! Reads JSON-line commands on stdin and writes JSON-line events on stdout.
//! It wires together:
//! - Configuration loading
//! - Logging (stderr, so stdout stays machine-readable)
//! - The session service and its timer tasks

use anyhow::{Context, Result};
use clap::Parser;
use focus_api::{Command, Event, EventPayload};
use focus_config::{Settings, load_config_or_default};
use focus_core::SessionService;
use focus_util::{
    FOCUS_CONFIG_ENV, FocusError, SystemClock, default_config_path, is_mock_time_active,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// focusd - Focus and rest session tracker
#[derive(Parser, Debug)]
#[command(name = "focusd")]
#[command(about = "Focus and rest session tracker", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/focusd/config.toml)
    #[arg(short, long, env = FOCUS_CONFIG_ENV, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Daemon {
    service: SessionService,
}

impl Daemon {
    fn new(settings: Settings) -> Self {
        info!(
            tick_ms = settings.timing.tick_interval.as_millis() as u64,
            breathe_ms = settings.timing.breathe_delay.as_millis() as u64,
            focus_secs = settings.defaults.focus_secs,
            rest_secs = settings.defaults.rest_secs,
            "Configuration loaded"
        );

        Self {
            service: SessionService::spawn(settings, Arc::new(SystemClock)),
        }
    }

    async fn run(self) -> Result<()> {
        let writer = tokio::spawn(write_events(self.service.subscribe()));

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                line = lines.next_line() => {
                    match line.context("Failed to read stdin")? {
                        Some(line) => self.handle_line(&line)?,
                        None => {
                            info!("Input closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        self.service
            .shutdown()
            .await
            .context("Session service did not shut down cleanly")?;

        writer.await.context("Event writer panicked")??;

        info!("Shutdown complete");
        Ok(())
    }

    fn handle_line(&self, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        match serde_json::from_str::<Command>(line) {
            Ok(command) => {
                debug!(command = ?command, "Command received");
                self.service.send(command)?;
            }
            Err(e) => {
                warn!(error = %e, "Malformed command");
                self.service.announce(EventPayload::Error {
                    message: FocusError::invalid_command(e.to_string()).to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Copy events to stdout, one JSON object per line, until shutdown
async fn write_events(mut events: broadcast::Receiver<Event>) -> Result<()> {
    let mut stdout = tokio::io::stdout();

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event writer fell behind");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let done = matches!(event.payload, EventPayload::Shutdown);

        let mut line = serde_json::to_vec(&event).context("Failed to encode event")?;
        line.push(b'\n');
        stdout
            .write_all(&line)
            .await
            .context("Failed to write event")?;
        stdout.flush().await.context("Failed to flush stdout")?;

        if done {
            break;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "focusd starting");

    if is_mock_time_active() {
        warn!("Mock time is active; timestamps are shifted");
    }

    let settings = load_config_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    Daemon::new(settings).run().await
}
