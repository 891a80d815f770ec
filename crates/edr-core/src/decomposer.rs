//! Respiration decomposition capability
//!
//! The core does not own the EDR mathematics. Anything that can turn a clean
//! ECG window into a derived respiration signal, and that signal into an
//! instantaneous rate series, plugs in through [`SignalDecomposer`].
//!
//! [`ZeroCrossingDecomposer`] is a small deterministic implementation used by
//! the simulator and tests: a cardiac-cycle moving average removes the QRS
//! complexes and leaves baseline respiration, and the spacing of upward zero
//! crossings gives the rate.

extern crate alloc;
use alloc::vec::Vec;

use crate::error::DecomposeError;

/// Trait for swappable EDR algorithms.
///
/// Both stages must return a series the same length as their input. Either
/// may fail or be slow; the hop worker bounds and absorbs both.
pub trait SignalDecomposer {
    /// Derive a respiration signal from a gap-filled ECG window.
    fn decompose(
        &mut self,
        window: &[f64],
        sample_rate_hz: f64,
    ) -> impl Future<Output = Result<Vec<f64>, DecomposeError>>;

    /// Estimate the instantaneous respiration rate (breaths/min) per sample.
    ///
    /// Positions without an estimate are NaN.
    fn estimate_rate(
        &mut self,
        derived: &[f64],
        sample_rate_hz: f64,
    ) -> impl Future<Output = Result<Vec<f64>, DecomposeError>>;
}

/// Moving-average EDR with zero-crossing rate estimation.
#[derive(Debug, Clone, Copy)]
pub struct ZeroCrossingDecomposer {
    /// Averaging span, ideally one cardiac cycle (s)
    pub smoothing_secs: f64,
}

impl Default for ZeroCrossingDecomposer {
    fn default() -> Self {
        Self {
            smoothing_secs: 1.0,
        }
    }
}

impl ZeroCrossingDecomposer {
    /// Centered moving average with edges held at the nearest full average,
    /// minus its own mean.
    fn smooth(&self, window: &[f64], sample_rate_hz: f64) -> Result<Vec<f64>, DecomposeError> {
        let n = window.len();
        let span = libm::round(self.smoothing_secs * sample_rate_hz) as usize;
        if span == 0 || span > n {
            return Err(DecomposeError::failed("window shorter than smoothing span"));
        }

        let mut averaged = alloc::vec![0.0; n];
        let mut sum: f64 = window[..span].iter().sum();
        let half = span / 2;
        averaged[half] = sum / span as f64;
        for start in 1..=(n - span) {
            sum += window[start + span - 1] - window[start - 1];
            averaged[start + half] = sum / span as f64;
        }

        let first = averaged[half];
        let last_index = n - span + half;
        let last = averaged[last_index];
        averaged[..half].fill(first);
        averaged[last_index + 1..].fill(last);

        let mean = averaged.iter().sum::<f64>() / n as f64;
        for value in averaged.iter_mut() {
            *value -= mean;
        }
        Ok(averaged)
    }
}

/// Indices where the signal crosses zero going upward.
pub fn upward_crossings(signal: &[f64]) -> Vec<usize> {
    signal
        .windows(2)
        .enumerate()
        .filter(|(_, w)| w[0] < 0.0 && w[1] >= 0.0)
        .map(|(i, _)| i + 1)
        .collect()
}

/// Per-sample rate from the spacing of consecutive upward crossings.
///
/// Samples before the second crossing take the first period's rate and
/// samples after the last crossing take the last period's rate. Fewer than
/// two crossings leaves every sample NaN.
pub fn crossing_rates(signal: &[f64], sample_rate_hz: f64) -> Vec<f64> {
    let mut rates = alloc::vec![f64::NAN; signal.len()];
    let crossings = upward_crossings(signal);
    if crossings.len() < 2 {
        return rates;
    }

    for (k, pair) in crossings.windows(2).enumerate() {
        let bpm = 60.0 * sample_rate_hz / (pair[1] - pair[0]) as f64;
        let start = if k == 0 { 0 } else { pair[0] };
        let end = if k + 2 == crossings.len() {
            signal.len()
        } else {
            pair[1]
        };
        rates[start..end].fill(bpm);
    }

    rates
}

impl SignalDecomposer for ZeroCrossingDecomposer {
    async fn decompose(
        &mut self,
        window: &[f64],
        sample_rate_hz: f64,
    ) -> Result<Vec<f64>, DecomposeError> {
        self.smooth(window, sample_rate_hz)
    }

    async fn estimate_rate(
        &mut self,
        derived: &[f64],
        sample_rate_hz: f64,
    ) -> Result<Vec<f64>, DecomposeError> {
        Ok(crossing_rates(derived, sample_rate_hz))
    }
}
