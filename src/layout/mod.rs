//! On-Disk Layout Module
//!
//! Fixed-layout, big-endian codecs for everything the journal persists.
//!
//! ## Responsibilities
//! - Global block index addressing
//! - File header and mutable state header
//! - Per-page header with the block slot table
//! - Segment headers for record chains
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ FileHeader   (64 bytes, immutable after creation)           │
//! │ StateHeader  (64 bytes, rewritten on synchronize)           │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Page 0                                                      │
//! │ ┌─────────┬─────────┬─────┬──────────────┬───────────────┐  │
//! │ │ Block 0 │ Block 1 │ ... │ Block bpp-1  │  PageHeader   │  │
//! │ └─────────┴─────────┴─────┴──────────────┴───────────────┘  │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Page 1                                                      │
//! │ ...          (the file grows by whole page sets)            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All multi-byte integers are big-endian for on-disk portability.

mod file_header;
mod page_header;
mod segment;

pub use file_header::{FileHeader, StateHeader, DATA_REGION_START, FILE_HEADER_REGION, FORMAT_VERSION, STATE_HEADER_REGION};
pub use page_header::{BlockSlot, BlockTag, FreeAnchor, PageHeader};
pub use segment::{blocks_spanned, segment_header_len, SegmentHeader, SEGMENT_HEADER_LEN, SEGMENT_HEADER_LEN_CHECKSUMMED};

/// Identity of a record: the global block index of its head block.
///
/// Stable while the record is occupied; once the record is removed and its
/// blocks committed, the same handle may denote an unrelated future record.
pub type RecordHandle = u32;

/// Sentinel for "no block" / "no record" in every on-disk link field
pub const NIL: u32 = u32::MAX;

/// A global block index resolved to its page and in-page position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLocation {
    /// Index of the page holding the block
    pub page: u32,

    /// Position of the block within its page
    pub offset: u32,
}

/// Map a global block index to (page, in-page offset)
///
/// Pure function; every other component uses it to translate logical block
/// indices into I/O positions.
pub fn block_location(global: u32, blocks_per_page: u32) -> BlockLocation {
    debug_assert!(blocks_per_page > 0);
    BlockLocation {
        page: global / blocks_per_page,
        offset: global % blocks_per_page,
    }
}

/// Inverse of [`block_location`]
pub fn global_index(location: BlockLocation, blocks_per_page: u32) -> u32 {
    location.page * blocks_per_page + location.offset
}
