//! Bounded raw sample buffer
//!
//! Samples are appended in arrival order. When an append pushes the buffer
//! past its capacity, the oldest `eviction_batch` samples are dropped in a
//! single compaction instead of shifting one sample at a time.

extern crate alloc;
use alloc::vec::Vec;

use embassy_time::Instant;

/// Raw ECG samples plus the instant of the most recent ingestion.
///
/// The staleness clock lives next to the samples so that a staleness check
/// and an append can never interleave.
#[derive(Debug)]
pub struct SampleBuffer {
    samples: Vec<f64>,
    capacity: usize,
    eviction_batch: usize,
    last_ingest: Option<Instant>,
    /// Set once a stale buffer has been cleared, re-armed by the next ingest
    stale_cleared: bool,
    /// Bumped on every clear so readers can tell their snapshot was discarded
    epoch: u32,
}

impl SampleBuffer {
    pub fn new(capacity: usize, eviction_batch: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            eviction_batch: eviction_batch.clamp(1, capacity.max(1)),
            last_ingest: None,
            stale_cleared: false,
            epoch: 0,
        }
    }

    /// Append samples and stamp the staleness clock.
    ///
    /// Values are stored untouched; negative sentinels are resolved when a
    /// window is cleaned.
    pub fn append(&mut self, values: &[f64], now: Instant) {
        self.samples.extend_from_slice(values);
        self.last_ingest = Some(now);
        self.stale_cleared = false;

        if self.samples.len() > self.capacity {
            // Drop whole batches until the remainder fits. A single oversized
            // append may need more than one batch.
            let excess = self.samples.len() - self.capacity;
            let batches = excess.div_ceil(self.eviction_batch);
            let evict = (batches * self.eviction_batch).min(self.samples.len());
            self.samples.drain(..evict);
        }
    }

    /// Copy of the last `n` samples (fewer if not available), oldest first.
    pub fn snapshot(&self, n: usize) -> Vec<f64> {
        let start = self.samples.len().saturating_sub(n);
        self.samples[start..].to_vec()
    }

    /// Drop every sample. The staleness clock is kept, but the cleared buffer
    /// has nothing left to expire until the next append.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.stale_cleared = true;
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Clear the buffer if nothing has been ingested for longer than `timeout`.
    ///
    /// Returns `true` only on the check that performs the clear; later checks
    /// during the same dropout return `false`.
    pub fn clear_if_stale(&mut self, now: Instant, timeout: embassy_time::Duration) -> bool {
        let Some(last) = self.last_ingest else {
            return false;
        };
        if self.stale_cleared || now.saturating_duration_since(last) <= timeout {
            return false;
        }
        self.clear();
        true
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last_ingest(&self) -> Option<Instant> {
        self.last_ingest
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }
}
