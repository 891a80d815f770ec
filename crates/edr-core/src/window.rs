//! Window cleaning and the flatness guard
//!
//! A raw window may contain negative sentinels (lead-off, dropped packets).
//! Those positions are treated as missing and filled: interior gaps by linear
//! interpolation, a trailing gap by holding the last valid value, and a
//! leading gap by back-filling from the first valid value.

extern crate alloc;
use alloc::vec::Vec;

/// Result of cleaning a raw window.
#[derive(Debug, Clone, PartialEq)]
pub enum CleanWindow {
    /// Gap-filled samples, same length as the raw window
    Signal(Vec<f64>),
    /// No valid sample, or standard deviation below the flatness epsilon
    Flat,
}

fn is_valid(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

/// Replace invalid samples with interpolated values.
///
/// Returns `None` when the window has no valid sample to interpolate from.
pub fn fill_gaps(raw: &[f64]) -> Option<Vec<f64>> {
    let first = raw.iter().position(|&v| is_valid(v))?;
    let mut filled = raw.to_vec();

    // Leading gap: back-fill.
    for value in filled.iter_mut().take(first) {
        *value = raw[first];
    }

    let mut prev = first;
    for i in (first + 1)..raw.len() {
        if !is_valid(raw[i]) {
            continue;
        }
        let gap = i - prev;
        if gap > 1 {
            let (a, b) = (raw[prev], raw[i]);
            for (step, value) in filled[prev + 1..i].iter_mut().enumerate() {
                let t = (step + 1) as f64 / gap as f64;
                *value = a + (b - a) * t;
            }
        }
        prev = i;
    }

    // Trailing gap: hold the last valid value.
    let last = raw[prev];
    for value in filled.iter_mut().skip(prev + 1) {
        *value = last;
    }

    Some(filled)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    libm::sqrt(variance)
}

/// Gap-fill `raw` and apply the flatness guard.
pub fn clean(raw: &[f64], flat_epsilon: f64) -> CleanWindow {
    match fill_gaps(raw) {
        Some(signal) if std_dev(&signal) >= flat_epsilon => CleanWindow::Signal(signal),
        _ => CleanWindow::Flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_window_is_unchanged() {
        let raw = [1.0, 2.0, 3.0];
        assert_eq!(fill_gaps(&raw), Some(raw.to_vec()));
    }

    #[test]
    fn interior_gap_is_interpolated() {
        let raw = [1.0, -1.0, -1.0, 4.0];
        assert_eq!(fill_gaps(&raw), Some(vec![1.0, 2.0, 3.0, 4.0]));
    }

    #[test]
    fn leading_gap_is_back_filled() {
        let raw = [-1.0, -5.0, 2.0, 3.0];
        assert_eq!(fill_gaps(&raw), Some(vec![2.0, 2.0, 2.0, 3.0]));
    }

    #[test]
    fn trailing_gap_holds_last_value() {
        let raw = [2.0, 3.0, -1.0, f64::NAN];
        assert_eq!(fill_gaps(&raw), Some(vec![2.0, 3.0, 3.0, 3.0]));
    }

    #[test]
    fn all_invalid_has_nothing_to_fill() {
        assert_eq!(fill_gaps(&[-1.0, -1.0]), None);
        assert_eq!(clean(&[-1.0, -1.0], 1e-3), CleanWindow::Flat);
    }

    #[test]
    fn zero_is_a_valid_sample() {
        assert_eq!(fill_gaps(&[0.0, -1.0, 2.0]), Some(vec![0.0, 1.0, 2.0]));
    }

    #[test]
    fn constant_window_is_flat() {
        let raw = vec![512.0; 100];
        assert_eq!(clean(&raw, 1e-3), CleanWindow::Flat);
    }

    #[test]
    fn constant_after_interpolation_is_flat() {
        let raw = [7.0, -1.0, 7.0, -1.0, -1.0, 7.0];
        assert_eq!(clean(&raw, 1e-3), CleanWindow::Flat);
    }

    #[test]
    fn varying_window_passes_guard() {
        let raw = [1.0, 2.0, -1.0, 4.0];
        assert_eq!(
            clean(&raw, 1e-3),
            CleanWindow::Signal(vec![1.0, 2.0, 3.0, 4.0])
        );
    }

    #[test]
    fn population_std_dev() {
        let sd = std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((sd - 2.0).abs() < 1e-12);
    }
}
