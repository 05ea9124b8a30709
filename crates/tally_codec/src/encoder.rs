//! Snapshot document encoder.

use crate::document::SnapshotDocument;
use crate::error::{CodecError, CodecResult};

/// Encodes a document to its canonical byte form.
///
/// The output is compact JSON with fields in declaration order and
/// settings sorted by key, so equal documents always encode to equal
/// bytes.
///
/// # Errors
///
/// Returns an error if a value cannot be represented (non-finite floats).
pub fn encode(document: &SnapshotDocument) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(document).map_err(|e| CodecError::encoding_failed(e.to_string()))
}

/// Encodes a document as indented JSON, for human inspection.
///
/// # Errors
///
/// Returns an error if a value cannot be represented.
pub fn encode_pretty(document: &SnapshotDocument) -> CodecResult<Vec<u8>> {
    serde_json::to_vec_pretty(document).map_err(|e| CodecError::encoding_failed(e.to_string()))
}
