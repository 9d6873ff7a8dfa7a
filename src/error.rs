//! Error types for blockjournal
//!
//! Provides a unified error type for all journal operations.

use thiserror::Error;

use crate::layout::RecordHandle;

/// Result type alias using JournalError
pub type Result<T> = std::result::Result<T, JournalError>;

/// Unified error type for journal operations
#[derive(Debug, Error)]
pub enum JournalError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Structural Errors
    // -------------------------------------------------------------------------
    /// An on-disk or in-memory structure violates an invariant: a free
    /// list that does not cycle, a segment chain that leaves the file, a
    /// header that fails its CRC. Never repaired silently.
    #[error("journal corruption detected: {0}")]
    Corruption(String),

    /// Whole-record checksum verification failed in paranoid mode.
    #[error("checksum mismatch for record {handle}: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        handle: RecordHandle,
        stored: u32,
        computed: u32,
    },

    // -------------------------------------------------------------------------
    // Resource Errors
    // -------------------------------------------------------------------------
    #[error("out of space: {requested} blocks requested, {available} available")]
    OutOfSpace { requested: usize, available: u64 },

    #[error("record of {size} bytes exceeds the maximum record size")]
    RecordTooLarge { size: u64 },

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("record {0} not found")]
    NotFound(RecordHandle),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    /// The file was created with different parameters than the ones given
    /// to `open`. Fatal at open time.
    #[error("journal parameter mismatch: {0}")]
    ParameterMismatch(String),

    #[error("invalid journal parameters: {0}")]
    InvalidParameters(String),
}
