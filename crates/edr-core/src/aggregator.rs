//! Tumbling one-minute aggregation of per-hop estimates
//!
//! Every processed hop contributes one value (explicit zeros included). Once
//! a full minute has elapsed since the last boundary, the contributions are
//! averaged into a [`MinuteRecord`] and the accumulator starts over. Minutes
//! never overlap.

extern crate alloc;
use alloc::vec::Vec;

use embassy_time::{Duration, Instant};
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// One completed aggregation minute.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct MinuteRecord {
    /// Boundary instant that opened this minute (seconds since boot)
    pub started_at_secs: u64,
    /// Average respiration rate after clamping (breaths/min)
    pub mean_bpm: f64,
    /// Number of hop contributions averaged
    pub hop_count: u32,
    /// Whether a small positive average was forced to zero
    pub clamped: bool,
}

impl MinuteRecord {
    /// Average `contributions`, forcing averages at or below `clamp_floor` to 0.
    ///
    /// Returns `None` if there is nothing to average.
    pub fn from_contributions(
        started_at_secs: u64,
        contributions: &[f64],
        clamp_floor: f64,
    ) -> Option<Self> {
        if contributions.is_empty() {
            return None;
        }

        let mean = contributions.iter().sum::<f64>() / contributions.len() as f64;
        let (mean_bpm, clamped) = if mean <= clamp_floor {
            (0.0, mean != 0.0)
        } else {
            (mean, false)
        };

        Some(Self {
            started_at_secs,
            mean_bpm,
            hop_count: contributions.len() as u32,
            clamped,
        })
    }
}

/// Accumulates hop contributions between minute boundaries.
pub struct MinuteAggregator {
    contributions: Vec<f64>,
    started_at: Instant,
    length: Duration,
    clamp_floor: f64,
}

impl MinuteAggregator {
    pub fn new(started_at: Instant, length: Duration, clamp_floor: f64) -> Self {
        Self {
            contributions: Vec::with_capacity(8),
            started_at,
            length,
            clamp_floor,
        }
    }

    pub fn push(&mut self, contribution: f64) {
        self.contributions.push(contribution);
    }

    /// Close the minute if it has elapsed.
    ///
    /// An empty minute resets the boundary without producing a record.
    pub fn poll(&mut self, now: Instant) -> Option<MinuteRecord> {
        if now.saturating_duration_since(self.started_at) < self.length {
            return None;
        }

        let record = MinuteRecord::from_contributions(
            self.started_at.as_secs(),
            &self.contributions,
            self.clamp_floor,
        );
        match &record {
            Some(r) => info!(
                "Minute rollup: {:.2} bpm over {} hops{}",
                r.mean_bpm,
                r.hop_count,
                if r.clamped { " (clamped)" } else { "" }
            ),
            None => debug!("Minute closed with no hop contributions"),
        }

        self.reset(now);
        record
    }

    /// Discard pending contributions and open a new minute at `now`.
    pub fn reset(&mut self, now: Instant) {
        self.contributions.clear();
        self.started_at = now;
    }

    pub fn pending(&self) -> &[f64] {
        &self.contributions
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator() -> MinuteAggregator {
        MinuteAggregator::new(Instant::from_secs(0), Duration::from_secs(60), 5.0)
    }

    #[test]
    fn record_is_plain_mean() {
        let record = MinuteRecord::from_contributions(10, &[12.0, 14.0, 16.0], 5.0).unwrap();
        assert_eq!(record.started_at_secs, 10);
        assert_eq!(record.mean_bpm, 14.0);
        assert_eq!(record.hop_count, 3);
        assert!(!record.clamped);
    }

    #[test]
    fn averages_at_or_below_floor_become_zero() {
        let record = MinuteRecord::from_contributions(0, &[5.0, 5.0], 5.0).unwrap();
        assert_eq!(record.mean_bpm, 0.0);
        assert!(record.clamped);

        let record = MinuteRecord::from_contributions(0, &[0.0, 0.0, 9.0], 5.0).unwrap();
        assert_eq!(record.mean_bpm, 0.0, "mean 3.0 is below the floor");
        assert!(record.clamped);
    }

    #[test]
    fn all_zero_minute_is_zero_but_not_clamped() {
        let record = MinuteRecord::from_contributions(0, &[0.0, 0.0], 5.0).unwrap();
        assert_eq!(record.mean_bpm, 0.0);
        assert!(!record.clamped);
    }

    #[test]
    fn empty_minute_produces_nothing() {
        assert!(MinuteRecord::from_contributions(0, &[], 5.0).is_none());

        let mut agg = aggregator();
        assert_eq!(agg.poll(Instant::from_secs(61)), None);
        assert_eq!(agg.started_at(), Instant::from_secs(61), "boundary still resets");
    }

    #[test]
    fn minute_closes_only_after_full_length() {
        let mut agg = aggregator();
        for (t, value) in [(10, 14.0), (20, 16.0), (30, 15.0), (40, 0.0), (50, 15.0)] {
            agg.push(value);
            assert_eq!(agg.poll(Instant::from_secs(t)), None);
        }
        agg.push(18.0);
        let record = agg.poll(Instant::from_secs(60)).expect("minute elapsed");
        assert_eq!(record.hop_count, 6);
        assert_eq!(record.mean_bpm, 13.0);
        assert!(agg.pending().is_empty());
        assert_eq!(agg.started_at(), Instant::from_secs(60));
    }

    #[test]
    fn consecutive_minutes_do_not_overlap() {
        let mut agg = aggregator();
        agg.push(10.0);
        assert!(agg.poll(Instant::from_secs(60)).is_some());

        agg.push(20.0);
        assert_eq!(agg.poll(Instant::from_secs(100)), None);
        let second = agg.poll(Instant::from_secs(120)).unwrap();
        assert_eq!(second.mean_bpm, 20.0);
        assert_eq!(second.hop_count, 1);
        assert_eq!(second.started_at_secs, 60);
    }
}
