//! Segment headers
//!
//! A record is a chain of segments; each segment is a physically
//! contiguous run of blocks on one page. The first block of every run
//! starts with a segment header:
//!
//! ```text
//! ┌───────────────┬────────────┬──────────┬────────────┬──────────────┐
//! │ Remaining (4) │ Length (4) │ Next (4) │ Handle (4) │ Checksum (4) │
//! └───────────────┴────────────┴──────────┴────────────┴──────────────┘
//!                                                       head segment,
//!                                                       paranoid only
//! ```
//!
//! - `Remaining`: payload bytes from this segment to the end of the chain;
//!   in the head segment this is the full record length
//! - `Length`: payload bytes stored in this segment
//! - `Next`: global block index of the next segment's first block, NIL at
//!   the end of the chain
//! - `Handle`: the owning record's handle, stored redundantly in every
//!   segment so a damaged chain can be attributed during recovery
//! - `Checksum`: CRC32 of the whole record payload

use crate::error::{JournalError, Result};
use crate::layout::NIL;

/// Encoded segment header size without a checksum field
pub const SEGMENT_HEADER_LEN: usize = 16;

/// Encoded segment header size with the head-only checksum field
pub const SEGMENT_HEADER_LEN_CHECKSUMMED: usize = 20;

/// Header size for a segment, given its position and the journal mode
pub fn segment_header_len(is_head: bool, paranoid: bool) -> usize {
    if is_head && paranoid {
        SEGMENT_HEADER_LEN_CHECKSUMMED
    } else {
        SEGMENT_HEADER_LEN
    }
}

/// Number of blocks a segment spans, given its payload and header sizes
pub fn blocks_spanned(payload_len: u32, header_len: usize, block_size: u32) -> u32 {
    let total = payload_len as u64 + header_len as u64;
    let spanned = total.div_ceil(block_size as u64) as u32;
    spanned.max(1)
}

/// Decoded segment header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub remaining: u32,
    pub length: u32,
    pub next_segment: u32,
    pub record_handle: u32,

    /// Present only in the head segment of a paranoid-mode journal
    pub checksum: Option<u32>,
}

impl SegmentHeader {
    pub fn encoded_len(&self) -> usize {
        if self.checksum.is_some() {
            SEGMENT_HEADER_LEN_CHECKSUMMED
        } else {
            SEGMENT_HEADER_LEN
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&self.remaining.to_be_bytes());
        out.extend_from_slice(&self.length.to_be_bytes());
        out.extend_from_slice(&self.next_segment.to_be_bytes());
        out.extend_from_slice(&self.record_handle.to_be_bytes());
        if let Some(checksum) = self.checksum {
            out.extend_from_slice(&checksum.to_be_bytes());
        }
        out
    }

    /// Decode a segment header, sanity-checking the size fields
    pub fn decode(bytes: &[u8], is_head: bool, paranoid: bool) -> Result<Self> {
        let expected = segment_header_len(is_head, paranoid);
        if bytes.len() < expected {
            return Err(JournalError::Corruption(format!(
                "segment header truncated: expected {} bytes, got {}",
                expected,
                bytes.len()
            )));
        }

        let read_u32 = |at: usize| {
            u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };

        let header = Self {
            remaining: read_u32(0),
            length: read_u32(4),
            next_segment: read_u32(8),
            record_handle: read_u32(12),
            checksum: (is_head && paranoid).then(|| read_u32(16)),
        };

        if header.length > header.remaining {
            return Err(JournalError::Corruption(format!(
                "segment of record {} stores {} bytes but only {} remain in the chain",
                header.record_handle, header.length, header.remaining
            )));
        }
        if header.record_handle == NIL {
            return Err(JournalError::Corruption(
                "segment header carries a NIL record handle".to_string(),
            ));
        }

        Ok(header)
    }
}
