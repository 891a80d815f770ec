//! Values published to the transport layer
//!
//! Written by the hop worker and cleared by the staleness monitor or an
//! administrative reset. Readers always receive copies.

extern crate alloc;
use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::aggregator::MinuteRecord;

pub struct PublishedState {
    latest_rate: Option<f64>,
    /// Completed minutes, oldest first
    history: VecDeque<MinuteRecord>,
    history_capacity: usize,
    /// Raw window processed by the most recent hop
    latest_window: Vec<f64>,
}

impl PublishedState {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            latest_rate: None,
            history: VecDeque::with_capacity(history_capacity.min(1440)),
            history_capacity: history_capacity.max(1),
            latest_window: Vec::new(),
        }
    }

    /// Append a completed minute and make it the latest rate.
    pub fn record_minute(&mut self, record: MinuteRecord) {
        if self.history.len() >= self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(record);
        self.latest_rate = Some(record.mean_bpm);
    }

    pub fn set_latest_window(&mut self, window: Vec<f64>) {
        self.latest_window = window;
    }

    /// Forget everything derived from the current device session.
    ///
    /// History survives so past valid readings remain available after a
    /// dropout.
    pub fn clear_session(&mut self) {
        self.latest_rate = None;
        self.latest_window.clear();
    }

    pub fn clear_all(&mut self) {
        self.clear_session();
        self.history.clear();
    }

    pub fn latest_rate(&self) -> Option<f64> {
        self.latest_rate
    }

    pub fn rate_history(&self) -> Vec<f64> {
        self.history.iter().map(|r| r.mean_bpm).collect()
    }

    pub fn records(&self) -> Vec<MinuteRecord> {
        self.history.iter().copied().collect()
    }

    pub fn latest_window(&self) -> Vec<f64> {
        self.latest_window.clone()
    }
}
