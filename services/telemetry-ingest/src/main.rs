use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use telemetry_ingest::config::EngineConfig;
use telemetry_ingest::engine::TelemetryEngine;
use telemetry_ingest::events::LiveMessage;
use telemetry_ingest::source;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "telemetry-ingest", version, about = "Telemetry ingestion and merge engine")]
struct Args {
    /// Engine configuration (TOML)
    #[arg(long, default_value = "config/channels.toml")]
    config: PathBuf,

    /// Fetch the historical dataset from this URL
    #[arg(long, conflicts_with = "history_file")]
    history_url: Option<String>,

    /// Read the historical dataset from this file
    #[arg(long)]
    history_file: Option<PathBuf>,

    /// Skip the historical load
    #[arg(long)]
    no_history: bool,

    /// Ignore the live feed on stdin
    #[arg(long)]
    no_live: bool,

    /// Downsampling bucket width in seconds
    #[arg(long)]
    bucket_width: Option<std::num::NonZeroU64>,
}

impl Args {
    fn apply(&self, config: &mut EngineConfig) {
        if let Some(url) = &self.history_url {
            config.history.url = Some(url.clone());
            config.history.path = None;
        }
        if let Some(path) = &self.history_file {
            config.history.path = Some(path.clone());
            config.history.url = None;
        }
        if self.no_history {
            config.history.enabled = false;
        }
        if self.no_live {
            config.live.enabled = false;
        }
        if let Some(width) = self.bucket_width {
            config.history.bucket_width_secs = width;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Logs go to stderr; stdout carries the update stream
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = EngineConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    args.apply(&mut config);
    config.validate()?;

    tracing::info!(version = telemetry_ingest::SERVICE_VERSION, "Starting telemetry ingest");

    let engine = TelemetryEngine::from_config(&config)?;

    let registry = engine.registry();
    for id in registry.ids() {
        let label = registry.display(id).and_then(|d| d.label.as_deref());
        tracing::debug!(channel = %id, label, "Channel registered");
    }
    let topics: Vec<&str> = registry.topics().collect();
    tracing::info!(?topics, "Live topics to subscribe");

    let updates = engine.store().subscribe();
    let printer = tokio::spawn(print_updates(updates));

    let history = config
        .history
        .enabled
        .then(|| source::from_history_config(&config.history))
        .flatten();

    let feed = if config.live.enabled {
        let (tx, rx) = mpsc::channel(1024);
        tokio::spawn(read_stdin(tx));
        Some(rx)
    } else {
        None
    };

    let summary = engine.run(history, feed).await;
    tracing::info!(
        history = ?summary.history.report().map(|r| r.total_seeded()),
        replayed = summary.replay.replayed,
        live_messages = summary.live_messages,
        "Ingest finished"
    );

    for (name, value) in engine.metrics().export() {
        tracing::info!(metric = %name, value, "final");
    }

    // Closing the store ends the update stream
    drop(engine);
    printer.await?;

    Ok(())
}

/// Forward `<channel_key> <payload>` lines from stdin.
async fn read_stdin(tx: mpsc::Sender<LiveMessage>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let Some((key, payload)) = line.split_once(char::is_whitespace) else {
                    tracing::warn!(line, "Expected '<channel_key> <payload>'");
                    continue;
                };
                if tx.send(LiveMessage::new(key, payload.trim())).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read live feed");
                break;
            }
        }
    }
}

/// Write each delta as one JSON line.
async fn print_updates(mut updates: broadcast::Receiver<telemetry_ingest::events::SeriesUpdate>) {
    loop {
        match updates.recv().await {
            Ok(update) => match serde_json::to_string(&update) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::error!(error = %e, "Failed to encode update"),
            },
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "Update consumer lagging");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
