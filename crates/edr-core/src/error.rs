//! Error types for the EDR core

use thiserror_no_std::Error;

/// Rejected configuration values, reported once at startup.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("sampling rate must be non-zero")]
    ZeroSampleRate,
    #[error("{field} must be non-zero")]
    ZeroDuration { field: &'static str },
    #[error("buffer capacity {capacity} cannot hold a {window}-sample window")]
    CapacityBelowWindow { capacity: usize, window: usize },
    #[error("eviction batch {batch} must be within 1..={capacity}")]
    EvictionBatch { batch: usize, capacity: usize },
    #[error("{field} must be a finite, non-negative number")]
    InvalidThreshold { field: &'static str },
}

/// Failure reported by (or on behalf of) a [`SignalDecomposer`](crate::SignalDecomposer).
///
/// The hop worker never propagates these; each one degrades the hop to a zero
/// contribution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecomposeError {
    #[error("decomposition failed: {0}")]
    Failed(heapless::String<64>),
    #[error("{stage} returned {actual} samples, expected {expected}")]
    LengthMismatch {
        stage: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("decomposition did not finish within {timeout_ms} ms")]
    Timeout { timeout_ms: u32 },
}

impl DecomposeError {
    /// Build a [`DecomposeError::Failed`], truncating `details` to fit.
    pub fn failed(details: &str) -> Self {
        let mut message = heapless::String::<64>::new();
        for c in details.chars() {
            if message.push(c).is_err() {
                break;
            }
        }
        Self::Failed(message)
    }
}

/// Encoding failures for persisted records and configuration.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("encoding failed: {0:?}")]
    Encode(postcard::Error),
    #[error("decoding failed: {0:?}")]
    Decode(postcard::Error),
}

/// Top-level error for fallible construction and loading.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(ConfigError),
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<ConfigError> for Error {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<StorageError> for Error {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}
