//! Ingest gate
//!
//! Holds back live messages until the historical load has finished, so that
//! no channel sees an append before its seed. While gated, messages are
//! queued in arrival order up to a fixed capacity. `open` replays the
//! queue through the dispatcher and from then on messages go straight
//! through.
//!
//! The state lock is held across replay, so a message submitted during
//! `open` waits until the queue has drained and is never reordered ahead
//! of older ones.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};
use types::errors::IngestError;
use types::sample::Sample;

use crate::events::LiveMessage;
use crate::live::LiveDispatcher;
use crate::metrics::IngestMetrics;

#[derive(Debug)]
enum GateState {
    Gated(VecDeque<LiveMessage>),
    Open,
}

/// What happened to a submitted message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// Held until the gate opens; `depth` is the queue length after push.
    Queued { depth: usize },
    /// Dispatched and appended.
    Accepted(Sample),
}

/// Result of draining the queue on `open`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub replayed: usize,
    pub accepted: usize,
    pub rejected: usize,
}

pub struct IngestGate {
    state: Mutex<GateState>,
    capacity: usize,
    dispatcher: LiveDispatcher,
    metrics: Arc<IngestMetrics>,
}

impl IngestGate {
    /// A gate in the closed state.
    pub fn new(dispatcher: LiveDispatcher, capacity: usize, metrics: Arc<IngestMetrics>) -> Self {
        Self {
            state: Mutex::new(GateState::Gated(VecDeque::new())),
            capacity: capacity.max(1),
            dispatcher,
            metrics,
        }
    }

    /// Submit one live message.
    pub fn submit(&self, message: LiveMessage) -> Result<Admission, IngestError> {
        self.metrics.record_received();
        let mut state = self.lock();

        match &mut *state {
            GateState::Gated(queue) => {
                if queue.len() >= self.capacity {
                    let err = IngestError::QueueFull {
                        capacity: self.capacity,
                    };
                    self.metrics.record_rejection(&err);
                    error!(
                        key = %message.channel_key,
                        capacity = self.capacity,
                        "Live queue full; message rejected"
                    );
                    return Err(err);
                }
                queue.push_back(message);
                self.metrics.record_queued();
                Ok(Admission::Queued { depth: queue.len() })
            }
            GateState::Open => self.dispatcher.dispatch(&message).map(Admission::Accepted),
        }
    }

    /// Replay queued messages in arrival order and switch to pass-through.
    ///
    /// A second call is a no-op.
    pub fn open(&self) -> ReplaySummary {
        let mut state = self.lock();

        let queue = match std::mem::replace(&mut *state, GateState::Open) {
            GateState::Gated(queue) => queue,
            GateState::Open => {
                warn!("IngestGate already open");
                return ReplaySummary::default();
            }
        };

        let mut summary = ReplaySummary::default();
        for message in &queue {
            summary.replayed += 1;
            match self.dispatcher.dispatch(message) {
                Ok(_) => summary.accepted += 1,
                Err(_) => summary.rejected += 1,
            }
        }
        self.metrics.record_replayed(summary.replayed as u64);

        if summary.replayed > 0 {
            info!(
                replayed = summary.replayed,
                accepted = summary.accepted,
                rejected = summary.rejected,
                "Live queue replayed; gate open"
            );
        } else {
            debug!("Gate open with empty queue");
        }

        summary
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.lock(), GateState::Open)
    }

    /// Messages currently held.
    pub fn queued(&self) -> usize {
        match &*self.lock() {
            GateState::Gated(queue) => queue.len(),
            GateState::Open => 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
