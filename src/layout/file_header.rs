//! File-level headers
//!
//! Two fixed 64-byte regions at the start of every journal file:
//!
//! ```text
//! FileHeader (offset 0, written once at creation)
//! ┌──────────┬───────────┬──────────┬────────────┬─────────┬─────────┬───────────┬─────────┐
//! │Magic (4) │Version (2)│Flags (2) │BlockSz (4) │ Bpp (4) │ Pps (4) │Threshold 1│ CRC (4) │
//! └──────────┴───────────┴──────────┴────────────┴─────────┴─────────┴───────────┴─────────┘
//!
//! StateHeader (offset 64, rewritten on every synchronize)
//! ┌──────────┬────────────┬─────────────┬──────────────┬───────────────┬─────────┐
//! │Magic (4) │ConfHead (4)│ConfCount (4)│UnconfHead (4)│UnconfCount (4)│ CRC (4) │
//! └──────────┴────────────┴─────────────┴──────────────┴───────────────┴─────────┘
//! ```
//!
//! The page count is never stored; it is derived from the file length so
//! that growth does not rewrite the header.

use crate::config::JournalParameters;
use crate::error::{JournalError, Result};
use crate::layout::NIL;

/// Size of the file header region in bytes
pub const FILE_HEADER_REGION: usize = 64;

/// Size of the state header region in bytes
pub const STATE_HEADER_REGION: usize = 64;

/// Byte offset where page data begins
pub const DATA_REGION_START: u64 = (FILE_HEADER_REGION + STATE_HEADER_REGION) as u64;

/// Current on-disk format version
pub const FORMAT_VERSION: u16 = 1;

const FILE_MAGIC: [u8; 4] = *b"BJRN";
const STATE_MAGIC: [u8; 4] = *b"BJST";

const FLAG_PARANOID: u16 = 0x0001;
const FLAG_AUTO_COMMIT: u16 = 0x0002;

const FILE_HEADER_BODY: usize = 21;
const STATE_HEADER_BODY: usize = 20;

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

// =============================================================================
// FileHeader
// =============================================================================

/// Immutable file-level header: format version plus the parameters the
/// journal was created with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u16,
    pub parameters: JournalParameters,
}

impl FileHeader {
    /// Build the header for a freshly created journal
    pub fn new(parameters: JournalParameters) -> Self {
        Self {
            version: FORMAT_VERSION,
            parameters,
        }
    }

    /// Encode into the fixed 64-byte region (unused tail is zeroed)
    pub fn encode(&self) -> [u8; FILE_HEADER_REGION] {
        let mut out = [0u8; FILE_HEADER_REGION];
        let p = &self.parameters;

        let mut flags: u16 = 0;
        if p.paranoid {
            flags |= FLAG_PARANOID;
        }
        if p.auto_commit {
            flags |= FLAG_AUTO_COMMIT;
        }

        out[0..4].copy_from_slice(&FILE_MAGIC);
        out[4..6].copy_from_slice(&self.version.to_be_bytes());
        out[6..8].copy_from_slice(&flags.to_be_bytes());
        out[8..12].copy_from_slice(&p.block_size.to_be_bytes());
        out[12..16].copy_from_slice(&p.blocks_per_page.to_be_bytes());
        out[16..20].copy_from_slice(&p.pages_per_set.to_be_bytes());
        out[20] = p.free_block_threshold;

        let crc = crc32fast::hash(&out[..FILE_HEADER_BODY]);
        out[FILE_HEADER_BODY..FILE_HEADER_BODY + 4].copy_from_slice(&crc.to_be_bytes());
        out
    }

    /// Decode and verify the header region of an existing file
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FILE_HEADER_REGION {
            return Err(JournalError::Corruption(format!(
                "file header region truncated: expected {} bytes, got {}",
                FILE_HEADER_REGION,
                bytes.len()
            )));
        }
        if bytes[0..4] != FILE_MAGIC {
            return Err(JournalError::Corruption(
                "bad file magic: not a journal file".to_string(),
            ));
        }

        let stored_crc = read_u32(bytes, FILE_HEADER_BODY);
        let computed_crc = crc32fast::hash(&bytes[..FILE_HEADER_BODY]);
        if stored_crc != computed_crc {
            return Err(JournalError::Corruption(format!(
                "file header CRC mismatch: stored {:#010x}, computed {:#010x}",
                stored_crc, computed_crc
            )));
        }

        let version = read_u16(bytes, 4);
        if version != FORMAT_VERSION {
            return Err(JournalError::Corruption(format!(
                "unsupported journal format version {}",
                version
            )));
        }

        let flags = read_u16(bytes, 6);
        let parameters = JournalParameters {
            block_size: read_u32(bytes, 8),
            blocks_per_page: read_u32(bytes, 12),
            pages_per_set: read_u32(bytes, 16),
            free_block_threshold: bytes[20],
            paranoid: flags & FLAG_PARANOID != 0,
            auto_commit: flags & FLAG_AUTO_COMMIT != 0,
        };
        parameters.validate().map_err(|e| {
            JournalError::Corruption(format!("file header carries invalid parameters: {}", e))
        })?;

        Ok(Self {
            version,
            parameters,
        })
    }
}

// =============================================================================
// StateHeader
// =============================================================================

/// Mutable journal state: the anchors of the confirmed and unconfirmed
/// record lists. Rewritten on every synchronize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHeader {
    pub confirmed_head: u32,
    pub confirmed_count: u32,
    pub unconfirmed_head: u32,
    pub unconfirmed_count: u32,
}

impl StateHeader {
    /// State of an empty journal
    pub fn empty() -> Self {
        Self {
            confirmed_head: NIL,
            confirmed_count: 0,
            unconfirmed_head: NIL,
            unconfirmed_count: 0,
        }
    }

    /// Encode into the fixed 64-byte region (unused tail is zeroed)
    pub fn encode(&self) -> [u8; STATE_HEADER_REGION] {
        let mut out = [0u8; STATE_HEADER_REGION];
        out[0..4].copy_from_slice(&STATE_MAGIC);
        out[4..8].copy_from_slice(&self.confirmed_head.to_be_bytes());
        out[8..12].copy_from_slice(&self.confirmed_count.to_be_bytes());
        out[12..16].copy_from_slice(&self.unconfirmed_head.to_be_bytes());
        out[16..20].copy_from_slice(&self.unconfirmed_count.to_be_bytes());

        let crc = crc32fast::hash(&out[..STATE_HEADER_BODY]);
        out[STATE_HEADER_BODY..STATE_HEADER_BODY + 4].copy_from_slice(&crc.to_be_bytes());
        out
    }

    /// Decode and verify the state region of an existing file
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < STATE_HEADER_REGION {
            return Err(JournalError::Corruption(format!(
                "state header region truncated: expected {} bytes, got {}",
                STATE_HEADER_REGION,
                bytes.len()
            )));
        }
        if bytes[0..4] != STATE_MAGIC {
            return Err(JournalError::Corruption(
                "bad state header magic".to_string(),
            ));
        }

        let stored_crc = read_u32(bytes, STATE_HEADER_BODY);
        let computed_crc = crc32fast::hash(&bytes[..STATE_HEADER_BODY]);
        if stored_crc != computed_crc {
            return Err(JournalError::Corruption(format!(
                "state header CRC mismatch: stored {:#010x}, computed {:#010x}",
                stored_crc, computed_crc
            )));
        }

        let state = Self {
            confirmed_head: read_u32(bytes, 4),
            confirmed_count: read_u32(bytes, 8),
            unconfirmed_head: read_u32(bytes, 12),
            unconfirmed_count: read_u32(bytes, 16),
        };

        // A NIL head with a nonzero count (or the inverse) cannot describe
        // any list.
        if (state.confirmed_head == NIL) != (state.confirmed_count == 0) {
            return Err(JournalError::Corruption(format!(
                "confirmed list anchor is inconsistent: head {:#010x}, count {}",
                state.confirmed_head, state.confirmed_count
            )));
        }
        if (state.unconfirmed_head == NIL) != (state.unconfirmed_count == 0) {
            return Err(JournalError::Corruption(format!(
                "unconfirmed list anchor is inconsistent: head {:#010x}, count {}",
                state.unconfirmed_head, state.unconfirmed_count
            )));
        }

        Ok(state)
    }
}
