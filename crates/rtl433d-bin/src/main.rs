//! rtl433d daemon: bridges an rtl_433 capture process to subscribers.
//!
//! Stands in for the hosting application: builds a [`BridgeConfig`] from CLI
//! flags and an optional TOML file, spawns the coordinator, logs discovery
//! and update notifications, refreshes a state summary on a fixed interval,
//! and shuts the bridge down cleanly on ctrl-c.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rtl433d_core::config::BridgeConfig;
use rtl433d_core::store::StateEvent;
use rtl433d_engine::Coordinator;

/// Seconds between state-summary refreshes.
const DEFAULT_REFRESH_SECS: u64 = 30;

#[derive(Parser, Debug)]
#[command(name = "rtl433d", about = "RTL-SDR sensor bridge daemon")]
struct Args {
    /// RTL-SDR device index.
    #[arg(long)]
    device: Option<String>,

    /// Center frequency, e.g. 433.92M.
    #[arg(long)]
    frequency: Option<String>,

    /// Tuner gain (0-50).
    #[arg(long)]
    gain: Option<u32>,

    /// Comma-separated model allow-list, e.g. "Acurite-Tower,Nexus-TH".
    #[arg(long)]
    protocols: Option<String>,

    /// Refresh interval in seconds for the state summary.
    #[arg(long, default_value_t = DEFAULT_REFRESH_SECS)]
    interval: u64,

    /// Optional TOML configuration file; CLI flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    /// Merge the config file (if any) with CLI overrides.
    fn to_config(&self) -> anyhow::Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => BridgeConfig::default(),
        };

        if let Some(device) = &self.device {
            config.device_id = device.clone();
        }
        if let Some(frequency) = &self.frequency {
            config.frequency = frequency.clone();
        }
        if let Some(gain) = self.gain {
            config.gain = gain;
        }
        if let Some(protocols) = &self.protocols {
            config.set_protocols_from_str(protocols);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = args.to_config()?;
    info!(
        device = config.device_id.as_str(),
        frequency = config.frequency.as_str(),
        gain = config.gain,
        filter = config.protocol_filter.join(",").as_str(),
        "starting rtl433d"
    );

    // Configuration errors block startup with an actionable message.
    let handle = Coordinator::spawn(&config).context("invalid configuration")?;

    // Log the notifications a hosting application would consume.
    let mut events = handle.subscribe();
    let event_logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(StateEvent::Discovered {
                    key,
                    model,
                    available_fields,
                    ..
                }) => {
                    info!(
                        device = key.as_str(),
                        model = model.as_str(),
                        sensors = available_fields.join(",").as_str(),
                        "new device"
                    );
                }
                Ok(StateEvent::Updated { key, grade, .. }) => {
                    info!(device = key.as_str(), %grade, "sensor update");
                }
                Ok(StateEvent::Degraded { key, consecutive }) => {
                    warn!(
                        device = key.as_str(),
                        consecutive, "sustained poor signal quality"
                    );
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                match handle.refresh().await {
                    Ok(snapshot) => {
                        info!(devices = snapshot.len(), "state refresh");
                    }
                    Err(err) => {
                        error!(error = %err, "state refresh failed");
                    }
                }
            }
        }
    }

    handle.shutdown().await;
    event_logger.abort();
    Ok(())
}
