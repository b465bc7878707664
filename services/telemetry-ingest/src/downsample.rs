//! Time-bucket downsampler
//!
//! Reduces a time-ordered batch of samples to one averaged sample per
//! fixed-width bucket, bounding the size of a historical seed regardless
//! of how long the dataset is.
//!
//! Buckets are not aligned to the epoch: a bucket opens at the first point
//! that falls outside the previous one, and the emitted sample carries that
//! opening timestamp. Keeping the bucket start (rather than a midpoint)
//! guarantees that the last seeded point never sits later than any point
//! it summarizes.

use std::num::NonZeroU64;

use types::sample::Sample;

/// Default bucket width for historical seeds: 30 minutes.
pub const DEFAULT_BUCKET_WIDTH_SECS: u64 = 30 * 60;

/// Running aggregate of one bucket.
#[derive(Debug, Clone, Copy)]
struct Bucket {
    start: i64,
    sum: f64,
    /// Incremental mean, used only if `sum` overflows.
    running_mean: f64,
    count: u64,
}

impl Bucket {
    fn open(first: &Sample) -> Self {
        Self {
            start: first.timestamp,
            sum: first.value,
            running_mean: first.value,
            count: 1,
        }
    }

    fn update(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        // Scale before adding: `value - running_mean` overflows for
        // opposite-sign extremes.
        let n = self.count as f64;
        self.running_mean = self.running_mean - self.running_mean / n + value / n;
    }

    fn close(self) -> Sample {
        let mean = if self.sum.is_finite() {
            self.sum / self.count as f64
        } else {
            self.running_mean
        };
        Sample {
            timestamp: self.start,
            value: mean,
        }
    }
}

/// Downsample `points` into buckets of `bucket_width` seconds.
///
/// `points` must already be sorted ascending by timestamp. A new bucket
/// starts whenever the elapsed time since the current bucket's first point
/// reaches `bucket_width`. The trailing partial bucket is emitted. The
/// input is not modified.
pub fn downsample(points: &[Sample], bucket_width: NonZeroU64) -> Vec<Sample> {
    let width = i64::try_from(bucket_width.get()).unwrap_or(i64::MAX);

    let mut out = Vec::new();
    let mut current: Option<Bucket> = None;

    for point in points {
        match current.as_mut() {
            Some(bucket) if point.timestamp.saturating_sub(bucket.start) < width => {
                bucket.update(point.value);
            }
            _ => {
                if let Some(done) = current.take() {
                    out.push(done.close());
                }
                current = Some(Bucket::open(point));
            }
        }
    }

    if let Some(done) = current {
        out.push(done.close());
    }

    out
}
