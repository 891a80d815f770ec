//! Intensity gating of instantaneous respiration rates
//!
//! Breathing intensity is the centered rolling standard deviation of the
//! derived respiration signal. Rate samples only count where the intensity
//! reaches the threshold and the rate itself is positive.

extern crate alloc;
use alloc::vec::Vec;

/// Outcome of gating one hop's rate series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GatedEstimate {
    /// Mean of the rates that passed the intensity gate
    Gated(f64),
    /// Nothing passed the gate; mean of every non-NaN rate instead
    Fallback(f64),
    /// No usable rate at all
    NoEstimate,
}

impl GatedEstimate {
    /// Value appended to the minute accumulator. `NoEstimate` counts as zero.
    pub fn contribution(self) -> f64 {
        match self {
            Self::Gated(bpm) | Self::Fallback(bpm) => bpm,
            Self::NoEstimate => 0.0,
        }
    }
}

/// Centered rolling sample standard deviation (ddof = 1) over `span` samples.
///
/// Index `i` uses the samples `[i + offset + 1 - span, i + offset]` with
/// `offset = (span - 1) / 2`. Positions without a full window are 0.
pub fn rolling_intensity(signal: &[f64], span: usize) -> Vec<f64> {
    let n = signal.len();
    let mut intensity = alloc::vec![0.0; n];
    if span < 2 || span > n {
        return intensity;
    }

    let offset = (span - 1) / 2;
    // Prefix sums keep this linear in the window length. They are taken
    // around the signal mean so a large DC offset cannot swamp the variance.
    let center = crate::window::mean(signal);
    let mut sum = Vec::with_capacity(n + 1);
    let mut sum_sq = Vec::with_capacity(n + 1);
    sum.push(0.0);
    sum_sq.push(0.0);
    for &v in signal {
        let d = v - center;
        sum.push(sum[sum.len() - 1] + d);
        sum_sq.push(sum_sq[sum_sq.len() - 1] + d * d);
    }

    let k = span as f64;
    for (i, out) in intensity.iter_mut().enumerate() {
        let end = i + offset + 1;
        if end < span || end > n {
            continue;
        }
        let start = end - span;
        let s = sum[end] - sum[start];
        let sq = sum_sq[end] - sum_sq[start];
        let variance = ((sq - s * s / k) / (k - 1.0)).max(0.0);
        *out = libm::sqrt(variance);
    }

    intensity
}

/// Gate `rates` against the intensity of `derived`.
///
/// Series of different lengths are compared over their common prefix.
pub fn gate(derived: &[f64], rates: &[f64], span: usize, threshold: f64) -> GatedEstimate {
    let intensity = rolling_intensity(derived, span);

    let mut sum = 0.0;
    let mut count = 0usize;
    for (&rate, &level) in rates.iter().zip(intensity.iter()) {
        if level >= threshold && rate > 0.0 {
            sum += rate;
            count += 1;
        }
    }
    if count > 0 {
        return GatedEstimate::Gated(sum / count as f64);
    }

    let (sum, count) = rates
        .iter()
        .filter(|r| !r.is_nan())
        .fold((0.0, 0usize), |(s, c), &r| (s + r, c + 1));
    if count > 0 {
        GatedEstimate::Fallback(sum / count as f64)
    } else {
        GatedEstimate::NoEstimate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_std(values: &[f64]) -> f64 {
        let n = values.len() as f64;
        let m = values.iter().sum::<f64>() / n;
        (values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (n - 1.0)).sqrt()
    }

    #[test]
    fn rolling_intensity_edges_are_zero() {
        let signal: Vec<f64> = (0..10).map(|i| (i * i) as f64).collect();
        let intensity = rolling_intensity(&signal, 4);
        // span 4, offset 1: index i covers [i - 2, i + 1]
        assert_eq!(intensity[0], 0.0);
        assert_eq!(intensity[1], 0.0);
        assert_eq!(intensity[9], 0.0);
        for i in 2..9 {
            let expected = naive_std(&signal[i - 2..=i + 1]);
            assert!(
                (intensity[i] - expected).abs() < 1e-9,
                "index {i}: {} vs {expected}",
                intensity[i]
            );
        }
    }

    #[test]
    fn rolling_intensity_odd_span_is_symmetric() {
        let signal = [1.0, 5.0, 2.0, 8.0, 3.0];
        let intensity = rolling_intensity(&signal, 3);
        assert_eq!(intensity[0], 0.0);
        assert_eq!(intensity[4], 0.0);
        assert!((intensity[2] - naive_std(&signal[1..4])).abs() < 1e-9);
    }

    #[test]
    fn dc_offset_does_not_inflate_intensity() {
        // True rolling std is ~0.001 regardless of the offset.
        for offset in [0.0, 1e5, 1e6] {
            let signal: Vec<f64> = (0..1500)
                .map(|i| if i % 2 == 0 { offset + 0.001 } else { offset - 0.001 })
                .collect();
            let intensity = rolling_intensity(&signal, 150);
            for (i, &level) in intensity.iter().enumerate().take(1426).skip(75) {
                assert!(
                    (level - 0.001).abs() < 1e-5,
                    "offset {offset}, index {i}: intensity {level}"
                );
            }

            let rates = vec![15.0; signal.len()];
            assert_eq!(
                gate(&signal, &rates, 150, 0.01),
                GatedEstimate::Fallback(15.0),
                "offset {offset}: a 0.001 ripple must not clear a 0.01 gate"
            );
        }
    }

    #[test]
    fn span_longer_than_signal_gives_zeros() {
        assert_eq!(rolling_intensity(&[1.0, 2.0], 5), vec![0.0, 0.0]);
    }

    #[test]
    fn gated_mean_uses_only_intense_positive_rates() {
        // Quiet first half, oscillating second half.
        let mut derived = vec![0.0; 8];
        derived.extend([1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0]);
        let mut rates = vec![40.0; 8];
        rates.extend([12.0, 14.0, -3.0, 16.0, 0.0, 18.0, 20.0, 22.0]);

        let intensity = rolling_intensity(&derived, 2);
        let expected: Vec<f64> = rates
            .iter()
            .zip(&intensity)
            .filter(|&(&r, &i)| i >= 0.5 && r > 0.0)
            .map(|(&r, _)| r)
            .collect();
        assert!(!expected.contains(&40.0), "quiet region must be gated out");

        let mean = expected.iter().sum::<f64>() / expected.len() as f64;
        assert_eq!(gate(&derived, &rates, 2, 0.5), GatedEstimate::Gated(mean));
    }

    #[test]
    fn falls_back_to_unfiltered_mean() {
        let derived = vec![0.0; 6];
        let rates = [10.0, f64::NAN, 20.0, 30.0, f64::NAN, 40.0];
        assert_eq!(
            gate(&derived, &rates, 3, 0.01),
            GatedEstimate::Fallback(25.0)
        );
    }

    #[test]
    fn all_nan_rates_give_no_estimate() {
        let derived = [1.0, -1.0, 1.0, -1.0];
        let rates = [f64::NAN; 4];
        let estimate = gate(&derived, &rates, 2, 0.01);
        assert_eq!(estimate, GatedEstimate::NoEstimate);
        assert_eq!(estimate.contribution(), 0.0);
    }

    #[test]
    fn empty_rates_give_no_estimate() {
        assert_eq!(gate(&[1.0, 2.0], &[], 2, 0.01), GatedEstimate::NoEstimate);
    }
}
