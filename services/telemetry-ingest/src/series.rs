//! Per-channel series store
//!
//! Holds one time-ordered buffer of samples per registered channel and is
//! the only shared mutable state of the engine. Two writers use it: the
//! historical loader (`seed`, once per channel at startup) and the live
//! dispatcher (`append`, for the rest of the process lifetime).
//!
//! Invariant: within a channel, timestamps are non-decreasing in read
//! order. `append` enforces it by rejecting anything older than the tail;
//! `seed` enforces it by sorting its batch and, when the series already has
//! live data, clipping the batch to the tail.
//!
//! Observers get deltas over a broadcast channel. Deltas are sent while the
//! store lock is held, so their order matches the order of mutations. An
//! observer that lags behind the channel capacity misses deltas and should
//! resynchronize from `current_view`.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use types::errors::RejectReason;
use types::ids::ChannelId;
use types::sample::{is_time_ordered, Sample};

use crate::events::SeriesUpdate;
use crate::registry::ChannelRegistry;

/// Deltas buffered per observer before it is considered lagging.
pub const DEFAULT_UPDATE_CAPACITY: usize = 4096;

/// Outcome of a seed call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Points that made it into the series.
    pub accepted: usize,
    /// Points older than the existing tail (late seed only).
    pub clipped: usize,
    /// Points dropped for a non-finite value or negative timestamp.
    pub invalid: usize,
    /// Whether the batch had to be sorted.
    pub resorted: bool,
    /// Whether the series already held samples when seeded.
    pub late: bool,
}

#[derive(Debug, Default)]
struct Series {
    samples: Vec<Sample>,
    seeded: bool,
}

impl Series {
    fn tail(&self) -> Option<&Sample> {
        self.samples.last()
    }
}

/// Time-ordered sample buffers keyed by channel.
pub struct SeriesStore {
    series: Mutex<BTreeMap<ChannelId, Series>>,
    updates: broadcast::Sender<SeriesUpdate>,
}

impl SeriesStore {
    /// Create an empty series for each channel.
    pub fn new(channels: impl IntoIterator<Item = ChannelId>) -> Self {
        Self::with_update_capacity(channels, DEFAULT_UPDATE_CAPACITY)
    }

    pub fn with_update_capacity(
        channels: impl IntoIterator<Item = ChannelId>,
        capacity: usize,
    ) -> Self {
        let series: BTreeMap<ChannelId, Series> = channels
            .into_iter()
            .map(|id| (id, Series::default()))
            .collect();
        let (updates, _) = broadcast::channel(capacity.max(1));

        debug!(channels = series.len(), "SeriesStore initialized");

        Self {
            series: Mutex::new(series),
            updates,
        }
    }

    /// One series per registered channel.
    pub fn from_registry(registry: &ChannelRegistry) -> Self {
        Self::new(registry.ids().cloned())
    }

    /// Register an observer. It receives every delta published after this
    /// call.
    pub fn subscribe(&self) -> broadcast::Receiver<SeriesUpdate> {
        self.updates.subscribe()
    }

    /// Seed a channel with a historical batch.
    ///
    /// On an empty series the batch replaces it wholesale. If live samples
    /// were already appended, points older than the tail are clipped and
    /// the rest are appended behind it.
    pub fn seed(
        &self,
        channel: &ChannelId,
        points: Vec<Sample>,
    ) -> Result<SeedReport, RejectReason> {
        let mut guard = self.lock();
        let series = guard
            .get_mut(channel)
            .ok_or(RejectReason::UnknownChannel)?;

        let mut report = SeedReport::default();

        let offered = points.len();
        let mut points: Vec<Sample> = points.into_iter().filter(Sample::is_valid).collect();
        report.invalid = offered - points.len();
        if report.invalid > 0 {
            warn!(
                channel = %channel,
                dropped = report.invalid,
                "Seed batch contained invalid samples"
            );
        }

        if !is_time_ordered(&points) {
            points.sort_by_key(|s| s.timestamp);
            report.resorted = true;
            warn!(channel = %channel, "Seed batch was not time-ordered; sorted");
        }

        match series.tail().copied() {
            Some(tail) => {
                report.late = true;
                let keep_from = points.partition_point(|p| p.timestamp < tail.timestamp);
                report.clipped = keep_from;
                points.drain(..keep_from);

                if report.clipped > 0 {
                    warn!(
                        channel = %channel,
                        clipped = report.clipped,
                        tail = tail.timestamp,
                        "Late seed clipped to series tail"
                    );
                }
                series.samples.extend_from_slice(&points);
            }
            None => {
                series.samples = points.clone();
            }
        }
        series.seeded = true;
        report.accepted = points.len();

        info!(
            channel = %channel,
            accepted = report.accepted,
            series_len = series.samples.len(),
            "Series seeded"
        );

        // Observers only hear about points that changed the series
        if !points.is_empty() {
            let _ = self.updates.send(SeriesUpdate::Seeded {
                channel: channel.clone(),
                points,
            });
        }

        Ok(report)
    }

    /// Append one sample to the tail.
    ///
    /// Accepted iff the value is finite, the timestamp is non-negative and
    /// not older than the current tail. Rejection leaves the store
    /// untouched.
    pub fn append(&self, channel: &ChannelId, sample: Sample) -> Result<(), RejectReason> {
        if !sample.value.is_finite() {
            return Err(RejectReason::InvalidValue {
                value: sample.value,
            });
        }
        if sample.timestamp < 0 {
            return Err(RejectReason::InvalidTimestamp {
                timestamp: sample.timestamp,
            });
        }

        let mut guard = self.lock();
        let series = guard
            .get_mut(channel)
            .ok_or(RejectReason::UnknownChannel)?;

        if let Some(tail) = series.tail() {
            if sample.timestamp < tail.timestamp {
                return Err(RejectReason::OutOfOrder {
                    timestamp: sample.timestamp,
                    tail: tail.timestamp,
                });
            }
        }

        series.samples.push(sample);

        let _ = self.updates.send(SeriesUpdate::Appended {
            channel: channel.clone(),
            sample,
        });

        Ok(())
    }

    /// Full series for initial rendering or resynchronization.
    ///
    /// `None` if the channel has no series.
    pub fn current_view(&self, channel: &ChannelId) -> Option<Vec<Sample>> {
        self.lock().get(channel).map(|s| s.samples.clone())
    }

    /// Most recent accepted sample.
    pub fn latest(&self, channel: &ChannelId) -> Option<Sample> {
        self.lock().get(channel).and_then(|s| s.tail().copied())
    }

    /// Number of samples held for a channel.
    pub fn series_len(&self, channel: &ChannelId) -> usize {
        self.lock().get(channel).map_or(0, |s| s.samples.len())
    }

    /// Whether `seed` has run for a channel.
    pub fn is_seeded(&self, channel: &ChannelId) -> bool {
        self.lock().get(channel).is_some_and(|s| s.seeded)
    }

    pub fn contains(&self, channel: &ChannelId) -> bool {
        self.lock().contains_key(channel)
    }

    /// Channel ids in sorted order.
    pub fn channels(&self) -> Vec<ChannelId> {
        self.lock().keys().cloned().collect()
    }

    /// Samples held across all channels.
    pub fn total_samples(&self) -> usize {
        self.lock().values().map(|s| s.samples.len()).sum()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ChannelId, Series>> {
        self.series.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokio::sync::broadcast::error::TryRecvError;

    fn s(timestamp: i64, value: f64) -> Sample {
        Sample { timestamp, value }
    }

    fn ch(id: &str) -> ChannelId {
        ChannelId::new(id)
    }

    fn store() -> SeriesStore {
        SeriesStore::new([ch("a"), ch("b")])
    }

    #[test]
    fn test_new_series_empty() {
        let store = store();
        assert_eq!(store.current_view(&ch("a")), Some(vec![]));
        assert!(store.latest(&ch("a")).is_none());
        assert!(!store.is_seeded(&ch("a")));
        assert_eq!(store.channels(), vec![ch("a"), ch("b")]);
    }

    #[test]
    fn test_seed_replaces_empty_series() {
        let store = store();
        let report = store
            .seed(&ch("a"), vec![s(0, 1.0), s(10, 2.0)])
            .unwrap();

        assert_eq!(report.accepted, 2);
        assert!(!report.late);
        assert!(store.is_seeded(&ch("a")));
        assert_eq!(store.current_view(&ch("a")).unwrap(), vec![s(0, 1.0), s(10, 2.0)]);
        assert_eq!(store.latest(&ch("a")), Some(s(10, 2.0)));
    }

    #[test]
    fn test_seed_sorts_unordered_batch() {
        let store = store();
        let report = store
            .seed(&ch("a"), vec![s(10, 2.0), s(0, 1.0), s(10, 3.0)])
            .unwrap();

        assert!(report.resorted);
        // stable sort keeps equal timestamps in input order
        assert_eq!(
            store.current_view(&ch("a")).unwrap(),
            vec![s(0, 1.0), s(10, 2.0), s(10, 3.0)]
        );
    }

    #[test]
    fn test_seed_drops_invalid_points() {
        let store = store();
        let report = store
            .seed(&ch("a"), vec![s(0, 1.0), s(1, f64::NAN), s(-5, 1.0)])
            .unwrap();
        assert_eq!(report.invalid, 2);
        assert_eq!(report.accepted, 1);
    }

    #[test]
    fn test_late_seed_clips_to_tail() {
        let store = store();
        store.append(&ch("a"), s(100, 9.0)).unwrap();

        let report = store
            .seed(&ch("a"), vec![s(0, 1.0), s(50, 2.0), s(100, 3.0), s(150, 4.0)])
            .unwrap();

        assert!(report.late);
        assert_eq!(report.clipped, 2);
        assert_eq!(report.accepted, 2);
        assert_eq!(
            store.current_view(&ch("a")).unwrap(),
            vec![s(100, 9.0), s(100, 3.0), s(150, 4.0)]
        );
    }

    #[test]
    fn test_append_accepts_non_decreasing() {
        let store = store();
        store.append(&ch("a"), s(5, 1.0)).unwrap();
        store.append(&ch("a"), s(5, 2.0)).unwrap();
        store.append(&ch("a"), s(6, 3.0)).unwrap();
        assert_eq!(store.series_len(&ch("a")), 3);
        assert_eq!(store.latest(&ch("a")), Some(s(6, 3.0)));
    }

    #[test]
    fn test_append_rejects_out_of_order() {
        let store = store();
        store.append(&ch("a"), s(10, 1.0)).unwrap();

        let result = store.append(&ch("a"), s(9, 2.0));
        assert_eq!(
            result,
            Err(RejectReason::OutOfOrder {
                timestamp: 9,
                tail: 10
            })
        );
        assert_eq!(store.current_view(&ch("a")).unwrap(), vec![s(10, 1.0)]);
    }

    #[test]
    fn test_append_rejects_invalid_value() {
        let store = store();
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let result = store.append(&ch("a"), s(1, value));
            assert!(matches!(result, Err(RejectReason::InvalidValue { .. })));
        }
        assert_eq!(store.series_len(&ch("a")), 0);
    }

    #[test]
    fn test_append_unknown_channel_creates_nothing() {
        let store = store();
        let result = store.append(&ch("zzz"), s(1, 1.0));
        assert_eq!(result, Err(RejectReason::UnknownChannel));
        assert!(!store.contains(&ch("zzz")));
        assert!(store.current_view(&ch("zzz")).is_none());
    }

    #[test]
    fn test_channels_independent() {
        let store = store();
        store.append(&ch("a"), s(100, 1.0)).unwrap();
        store.append(&ch("b"), s(1, 1.0)).unwrap();
        assert_eq!(store.total_samples(), 2);
    }

    #[test]
    fn test_observers_receive_deltas_only() {
        let store = store();
        let mut rx = store.subscribe();

        store.seed(&ch("a"), vec![s(0, 1.0), s(1, 2.0)]).unwrap();
        store.append(&ch("a"), s(2, 3.0)).unwrap();
        let _ = store.append(&ch("a"), s(0, 4.0)); // rejected

        assert_eq!(
            rx.try_recv().unwrap(),
            SeriesUpdate::Seeded {
                channel: ch("a"),
                points: vec![s(0, 1.0), s(1, 2.0)],
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            SeriesUpdate::Appended {
                channel: ch("a"),
                sample: s(2, 3.0),
            }
        );
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_empty_seed_publishes_nothing() {
        let store = store();
        let mut rx = store.subscribe();

        store.append(&ch("a"), s(100, 9.0)).unwrap();
        assert!(matches!(
            rx.try_recv(),
            Ok(SeriesUpdate::Appended { .. })
        ));

        // every point older than the tail
        let report = store.seed(&ch("a"), vec![s(0, 1.0), s(50, 2.0)]).unwrap();
        assert_eq!(report.clipped, 2);
        assert_eq!(report.accepted, 0);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        // every point invalid
        store.seed(&ch("b"), vec![s(1, f64::NAN)]).unwrap();
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert!(store.is_seeded(&ch("b")));
        assert_eq!(store.current_view(&ch("a")).unwrap(), vec![s(100, 9.0)]);
    }

    #[test]
    fn test_lagging_observer_can_resync() {
        let store = SeriesStore::with_update_capacity([ch("a")], 2);
        let mut rx = store.subscribe();

        for t in 0..5 {
            store.append(&ch("a"), s(t, t as f64)).unwrap();
        }

        assert!(matches!(rx.try_recv(), Err(TryRecvError::Lagged(_))));
        assert_eq!(store.current_view(&ch("a")).unwrap().len(), 5);
    }

    proptest! {
        #[test]
        fn prop_series_always_ordered(ops in prop::collection::vec((0i64..1_000, -100.0f64..100.0), 0..200)) {
            let store = SeriesStore::new([ch("a")]);
            for (t, v) in ops {
                let before = store.current_view(&ch("a")).unwrap();
                match store.append(&ch("a"), s(t, v)) {
                    Ok(()) => {
                        let after = store.current_view(&ch("a")).unwrap();
                        prop_assert_eq!(after.len(), before.len() + 1);
                        prop_assert_eq!(after.last().copied(), Some(s(t, v)));
                    }
                    Err(reason) => {
                        let is_out_of_order = matches!(reason, RejectReason::OutOfOrder { .. });
                        prop_assert!(is_out_of_order);
                        prop_assert_eq!(store.current_view(&ch("a")).unwrap(), before);
                    }
                }
                prop_assert!(is_time_ordered(&store.current_view(&ch("a")).unwrap()));
            }
        }

        #[test]
        fn prop_seed_then_appends_keeps_everything(
            seed_steps in prop::collection::vec(0i64..100, 0..50),
            append_steps in prop::collection::vec(0i64..100, 0..50),
        ) {
            let store = SeriesStore::new([ch("a")]);

            let mut t = 0i64;
            let batch: Vec<Sample> = seed_steps.iter().map(|dt| { t += dt; s(t, 1.0) }).collect();
            store.seed(&ch("a"), batch.clone()).unwrap();

            let mut appended = Vec::new();
            for dt in &append_steps {
                t += dt;
                store.append(&ch("a"), s(t, 2.0)).unwrap();
                appended.push(s(t, 2.0));
            }

            let view = store.current_view(&ch("a")).unwrap();
            prop_assert_eq!(view.len(), batch.len() + appended.len());
            prop_assert_eq!(&view[..batch.len()], &batch[..]);
            prop_assert_eq!(&view[batch.len()..], &appended[..]);
        }
    }
}
