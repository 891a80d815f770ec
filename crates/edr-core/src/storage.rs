//! Persistence encoding for minute records
//!
//! Records are appended to history files as COBS-framed postcard messages,
//! so a file is a plain concatenation of zero-terminated frames and a torn
//! final write only loses the last record.

extern crate alloc;
use alloc::vec::Vec;

use log::warn;

use crate::aggregator::MinuteRecord;
use crate::error::StorageError;

/// Encode one record as a self-delimiting frame.
pub fn encode_record(record: &MinuteRecord) -> Result<Vec<u8>, StorageError> {
    postcard::to_allocvec_cobs(record).map_err(StorageError::Encode)
}

/// Decode every complete frame in `bytes`.
///
/// An unterminated trailing frame is skipped; a corrupt terminated frame is
/// an error.
pub fn decode_records(bytes: &[u8]) -> Result<Vec<MinuteRecord>, StorageError> {
    let mut records = Vec::new();
    let mut scratch = Vec::new();

    for frame in bytes.split_inclusive(|&b| b == 0) {
        if frame.last() != Some(&0) {
            warn!("Skipping {} bytes of unterminated record data", frame.len());
            break;
        }
        scratch.clear();
        scratch.extend_from_slice(frame);
        let record = postcard::from_bytes_cobs(&mut scratch).map_err(StorageError::Decode)?;
        records.push(record);
    }

    Ok(records)
}
