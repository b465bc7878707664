//! Ingestion engine
//!
//! Wires the registry, the series store, the optional historical loader and
//! the optional live path (dispatcher behind the gate) into one object.
//! Which collaborators exist is decided by configuration: history-only,
//! live-only and combined deployments are the same engine.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use types::errors::IngestError;

use crate::config::{ConfigError, EngineConfig};
use crate::events::LiveMessage;
use crate::gate::{Admission, IngestGate, ReplaySummary};
use crate::historical::{HistoricalLoader, LoadReport, LoaderConfig};
use crate::live::LiveDispatcher;
use crate::metrics::{IngestMetrics, LoadOutcome};
use crate::registry::ChannelRegistry;
use crate::series::SeriesStore;
use crate::source::RecordSource;

/// How the historical phase ended.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryOutcome {
    Loaded(LoadReport),
    /// Fetch or parse failed; channels start empty.
    Failed(IngestError),
    /// History disabled or no source given.
    Skipped,
}

impl HistoryOutcome {
    pub fn report(&self) -> Option<&LoadReport> {
        match self {
            HistoryOutcome::Loaded(report) => Some(report),
            _ => None,
        }
    }
}

/// Summary of a `run`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub history: HistoryOutcome,
    pub replay: ReplaySummary,
    /// Messages taken off the live feed.
    pub live_messages: u64,
}

pub struct TelemetryEngine {
    registry: Arc<ChannelRegistry>,
    store: Arc<SeriesStore>,
    metrics: Arc<IngestMetrics>,
    loader: Option<HistoricalLoader>,
    gate: Option<IngestGate>,
}

impl TelemetryEngine {
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let registry = Arc::new(ChannelRegistry::from_config(&config.channels)?);
        let store = Arc::new(SeriesStore::from_registry(&registry));
        let metrics = Arc::new(IngestMetrics::new());

        let loader = config.history.enabled.then(|| {
            HistoricalLoader::new(
                registry.clone(),
                LoaderConfig::from_engine(config),
                metrics.clone(),
            )
        });

        let gate = config.live.enabled.then(|| {
            let dispatcher =
                LiveDispatcher::new(registry.clone(), store.clone(), config.time, metrics.clone());
            IngestGate::new(dispatcher, config.live.queue_capacity, metrics.clone())
        });

        info!(
            channels = registry.len(),
            history = loader.is_some(),
            live = gate.is_some(),
            offset_seconds = config.time.offset_seconds,
            "TelemetryEngine initialized"
        );

        Ok(Self {
            registry,
            store,
            metrics,
            loader,
            gate,
        })
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<SeriesStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<IngestMetrics> {
        &self.metrics
    }

    pub fn has_history(&self) -> bool {
        self.loader.is_some()
    }

    pub fn has_live(&self) -> bool {
        self.gate.is_some()
    }

    /// Feed one live message through the gate.
    ///
    /// `Ok(None)` when the live path is disabled.
    pub fn submit(&self, message: LiveMessage) -> Result<Option<Admission>, IngestError> {
        match &self.gate {
            Some(gate) => gate.submit(message).map(Some),
            None => {
                debug!(key = %message.channel_key, "Live path disabled; message ignored");
                Ok(None)
            }
        }
    }

    /// Run the historical phase. Does not open the gate.
    pub async fn load_history(&self, source: Option<&dyn RecordSource>) -> HistoryOutcome {
        let (loader, source) = match (&self.loader, source) {
            (Some(loader), Some(source)) => (loader, source),
            (Some(_), None) => {
                warn!("History enabled but no source configured; starting live-only");
                self.metrics.record_load(LoadOutcome::Skipped, 0);
                return HistoryOutcome::Skipped;
            }
            (None, _) => {
                debug!("History disabled");
                self.metrics.record_load(LoadOutcome::Skipped, 0);
                return HistoryOutcome::Skipped;
            }
        };

        match loader.load(source, &self.store).await {
            Ok(report) => HistoryOutcome::Loaded(report),
            Err(e) => HistoryOutcome::Failed(e),
        }
    }

    /// Release queued live messages. Call once the historical phase is over.
    pub fn open_gate(&self) -> ReplaySummary {
        self.gate
            .as_ref()
            .map(IngestGate::open)
            .unwrap_or_default()
    }

    /// Drive the startup merge and the live feed to completion.
    ///
    /// The load and the feed are polled together; messages arriving
    /// during the load are queued and replayed once it finishes, whatever
    /// its outcome. Returns when the load is done and the feed has closed.
    pub async fn run(
        &self,
        source: Option<Box<dyn RecordSource>>,
        feed: Option<mpsc::Receiver<LiveMessage>>,
    ) -> RunSummary {
        let mut feed = feed;
        let mut history: Option<HistoryOutcome> = None;
        let mut replay = ReplaySummary::default();
        let mut live_messages = 0u64;

        let load = self.load_history(source.as_deref());
        tokio::pin!(load);

        loop {
            tokio::select! {
                outcome = &mut load, if history.is_none() => {
                    history = Some(outcome);
                    replay = self.open_gate();
                }
                message = next_message(&mut feed) => match message {
                    Some(message) => {
                        live_messages += 1;
                        // rejections are logged and counted downstream
                        let _ = self.submit(message);
                    }
                    None => {
                        debug!("Live feed closed");
                        feed = None;
                    }
                },
            }

            if feed.is_none() {
                if let Some(history) = history.take() {
                    info!(
                        live_messages,
                        samples = self.store.total_samples(),
                        rejected = self.metrics.total_rejected(),
                        "Engine run finished"
                    );
                    return RunSummary {
                        history,
                        replay,
                        live_messages,
                    };
                }
            }
        }
    }
}

async fn next_message(feed: &mut Option<mpsc::Receiver<LiveMessage>>) -> Option<LiveMessage> {
    match feed {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
