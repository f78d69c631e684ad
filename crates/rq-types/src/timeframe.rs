use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A half-open (by default) or closed time interval used both to gate the
/// event channel (C2) and to carve up a feed for walk-forward/Monte-Carlo
/// runs (C11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeframe {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub inclusive: bool,
}

impl Timeframe {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, inclusive: bool) -> Self {
        Self { start, end, inclusive }
    }

    /// A timeframe spanning the full representable range.
    pub fn infinite() -> Self {
        Self {
            start: DateTime::<Utc>::MIN_UTC,
            end: DateTime::<Utc>::MAX_UTC,
            inclusive: true,
        }
    }

    /// A degenerate, empty timeframe: `start == end`, non-inclusive.
    pub fn empty() -> Self {
        let now = DateTime::<Utc>::UNIX_EPOCH;
        Self { start: now, end: now, inclusive: false }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains_time(&self, time: DateTime<Utc>) -> bool {
        if self.inclusive {
            time >= self.start && time <= self.end
        } else {
            time >= self.start && time < self.end
        }
    }

    pub fn contains(&self, other: &Timeframe) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// Elapsed span of this timeframe expressed in (365.25-day) years.
    pub fn to_years(&self) -> f64 {
        self.duration().num_seconds() as f64 / (365.25 * 86_400.0)
    }

    /// Splits into contiguous windows of `period` length, each subsequent
    /// window starting `period - overlap` after the previous one's start.
    /// The final window is clipped to `self.end`. `overlap` must be smaller
    /// than `period` or the split never terminates (returns empty instead).
    pub fn split(&self, period: Duration, overlap: Duration) -> Vec<Timeframe> {
        let step = period - overlap;
        if step <= Duration::zero() || self.is_empty() {
            return Vec::new();
        }
        let mut windows = Vec::new();
        let mut cur = self.start;
        while cur < self.end {
            let window_end = (cur + period).min(self.end);
            windows.push(Timeframe::new(cur, window_end, self.inclusive));
            cur += step;
        }
        windows
    }

    /// Draws `n` timeframes of `period` length, with starts sampled
    /// uniformly from `[start, end - period]`.
    pub fn sample<R: Rng + ?Sized>(&self, period: Duration, n: usize, rng: &mut R) -> Vec<Timeframe> {
        let latest_start = self.end - period;
        if latest_start < self.start {
            return Vec::new();
        }
        let span_secs = (latest_start - self.start).num_seconds().max(0);
        (0..n)
            .map(|_| {
                let offset = if span_secs == 0 { 0 } else { rng.gen_range(0..=span_secs) };
                let start = self.start + Duration::seconds(offset);
                Timeframe::new(start, start + period, self.inclusive)
            })
            .collect()
    }
}
