//! Per-page header
//!
//! Every page ends with a header describing the state and linkage of each
//! of its blocks, plus the anchors of the page's two free lists.
//!
//! ## Layout
//! ```text
//! ┌──────────┬───────────┬───────────┬────────────┬──────────┬───────────┐
//! │Magic (4) │PageIdx (4)│AvailHd (4)│AvailCnt (4)│RelHd (4) │RelCnt (4) │
//! ├──────────┴───────────┴───────────┴────────────┴──────────┴───────────┤
//! │ Slot 0 .. Slot bpp-1, 9 bytes each:                                  │
//! │ ┌─────────┬──────────┬──────────┐                                    │
//! │ │ Tag (1) │ Next (4) │ Prev (4) │                                    │
//! │ └─────────┴──────────┴──────────┘                                    │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │ CRC32 over all preceding header bytes (4)                            │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The meaning of a slot's next/prev depends on its tag:
//! - `Available` / `Released`: in-page offsets in the page's cyclic free list
//! - `HeadConfirmed` / `HeadUnconfirmed`: global record handles in the
//!   cyclic confirmed or unconfirmed record list
//! - `Body`: unused, both NIL

use crate::error::{JournalError, Result};
use crate::layout::NIL;

const PAGE_MAGIC: [u8; 4] = *b"BJPG";

/// Encoded size of one block slot
pub const SLOT_ENCODED_LEN: usize = 9;

const FIXED_PREFIX: usize = 24;
const TRAILER: usize = 4;

/// State of a block, as recorded in its slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    /// Free and ready for allocation
    Available,

    /// Free but pending commit; not allocatable yet
    Released,

    /// Occupied, not a record's head block
    Body,

    /// Occupied head block of a record on the unconfirmed list
    HeadUnconfirmed,

    /// Occupied head block of a record on the confirmed list
    HeadConfirmed,
}

impl BlockTag {
    pub fn is_free(self) -> bool {
        matches!(self, BlockTag::Available | BlockTag::Released)
    }

    pub fn is_head(self) -> bool {
        matches!(self, BlockTag::HeadUnconfirmed | BlockTag::HeadConfirmed)
    }

    pub fn is_occupied(self) -> bool {
        !self.is_free()
    }

    fn to_u8(self) -> u8 {
        match self {
            BlockTag::Available => 0,
            BlockTag::Released => 1,
            BlockTag::Body => 2,
            BlockTag::HeadUnconfirmed => 3,
            BlockTag::HeadConfirmed => 4,
        }
    }

    fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(BlockTag::Available),
            1 => Ok(BlockTag::Released),
            2 => Ok(BlockTag::Body),
            3 => Ok(BlockTag::HeadUnconfirmed),
            4 => Ok(BlockTag::HeadConfirmed),
            other => Err(JournalError::Corruption(format!(
                "unknown block tag {:#04x}",
                other
            ))),
        }
    }
}

/// Per-block metadata entry in the page header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSlot {
    pub tag: BlockTag,
    pub next: u32,
    pub prev: u32,
}

impl BlockSlot {
    /// An occupied non-head slot with no list linkage
    pub fn body() -> Self {
        Self {
            tag: BlockTag::Body,
            next: NIL,
            prev: NIL,
        }
    }
}

/// Anchor of one per-page cyclic free list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeAnchor {
    /// In-page offset of the first list member, NIL when empty
    pub head: u32,

    /// Number of blocks on the list
    pub count: u32,
}

impl FreeAnchor {
    pub fn empty() -> Self {
        Self { head: NIL, count: 0 }
    }
}

/// In-memory form of a page's header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHeader {
    pub page_index: u32,
    pub available: FreeAnchor,
    pub released: FreeAnchor,
    pub slots: Vec<BlockSlot>,
}

impl PageHeader {
    /// Encoded size of a page header for the given geometry
    pub fn encoded_len(blocks_per_page: u32) -> usize {
        FIXED_PREFIX + SLOT_ENCODED_LEN * blocks_per_page as usize + TRAILER
    }

    /// Header of a brand-new page: every block available, linked in
    /// ascending order
    pub fn new_fresh(page_index: u32, blocks_per_page: u32) -> Self {
        let bpp = blocks_per_page;
        let slots = (0..bpp)
            .map(|i| BlockSlot {
                tag: BlockTag::Available,
                next: (i + 1) % bpp,
                prev: (i + bpp - 1) % bpp,
            })
            .collect();
        Self {
            page_index,
            available: FreeAnchor { head: 0, count: bpp },
            released: FreeAnchor::empty(),
            slots,
        }
    }

    /// Encode into the fixed on-disk layout
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::encoded_len(self.slots.len() as u32));
        out.extend_from_slice(&PAGE_MAGIC);
        out.extend_from_slice(&self.page_index.to_be_bytes());
        out.extend_from_slice(&self.available.head.to_be_bytes());
        out.extend_from_slice(&self.available.count.to_be_bytes());
        out.extend_from_slice(&self.released.head.to_be_bytes());
        out.extend_from_slice(&self.released.count.to_be_bytes());
        for slot in &self.slots {
            out.push(slot.tag.to_u8());
            out.extend_from_slice(&slot.next.to_be_bytes());
            out.extend_from_slice(&slot.prev.to_be_bytes());
        }
        let crc = crc32fast::hash(&out);
        out.extend_from_slice(&crc.to_be_bytes());
        out
    }

    /// Decode and verify a page header read from disk
    ///
    /// Validation here is local to the page: magic, CRC, tag values, free
    /// anchors against the page geometry. Cross-page consistency (record
    /// list closure, chain reachability) requires global context and is
    /// the journal's `validate` job.
    pub fn decode(bytes: &[u8], expected_page: u32, blocks_per_page: u32) -> Result<Self> {
        let expected_len = Self::encoded_len(blocks_per_page);
        if bytes.len() < expected_len {
            return Err(JournalError::Corruption(format!(
                "page {} header truncated: expected {} bytes, got {}",
                expected_page,
                expected_len,
                bytes.len()
            )));
        }
        if bytes[0..4] != PAGE_MAGIC {
            return Err(JournalError::Corruption(format!(
                "page {} header has bad magic",
                expected_page
            )));
        }

        let body_len = expected_len - TRAILER;
        let stored_crc = u32::from_be_bytes([
            bytes[body_len],
            bytes[body_len + 1],
            bytes[body_len + 2],
            bytes[body_len + 3],
        ]);
        let computed_crc = crc32fast::hash(&bytes[..body_len]);
        if stored_crc != computed_crc {
            return Err(JournalError::Corruption(format!(
                "page {} header CRC mismatch: stored {:#010x}, computed {:#010x}",
                expected_page, stored_crc, computed_crc
            )));
        }

        let read_u32 = |at: usize| {
            u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };

        let page_index = read_u32(4);
        if page_index != expected_page {
            return Err(JournalError::Corruption(format!(
                "page header at position {} claims page index {}",
                expected_page, page_index
            )));
        }

        let available = FreeAnchor {
            head: read_u32(8),
            count: read_u32(12),
        };
        let released = FreeAnchor {
            head: read_u32(16),
            count: read_u32(20),
        };
        for (name, anchor) in [("available", &available), ("released", &released)] {
            if anchor.count > blocks_per_page {
                return Err(JournalError::Corruption(format!(
                    "page {} {} count {} exceeds blocks per page {}",
                    page_index, name, anchor.count, blocks_per_page
                )));
            }
            if (anchor.head == NIL) != (anchor.count == 0) {
                return Err(JournalError::Corruption(format!(
                    "page {} {} anchor is inconsistent: head {:#010x}, count {}",
                    page_index, name, anchor.head, anchor.count
                )));
            }
            if anchor.head != NIL && anchor.head >= blocks_per_page {
                return Err(JournalError::Corruption(format!(
                    "page {} {} head {} is out of page bounds",
                    page_index, name, anchor.head
                )));
            }
        }

        let mut slots = Vec::with_capacity(blocks_per_page as usize);
        for i in 0..blocks_per_page as usize {
            let at = FIXED_PREFIX + i * SLOT_ENCODED_LEN;
            let tag = BlockTag::from_u8(bytes[at]).map_err(|_| {
                JournalError::Corruption(format!(
                    "page {} slot {} has unknown tag {:#04x}",
                    page_index, i, bytes[at]
                ))
            })?;
            let next = read_u32(at + 1);
            let prev = read_u32(at + 5);
            if tag.is_free() {
                // Free-list links are in-page offsets.
                for (which, link) in [("next", next), ("prev", prev)] {
                    if link >= blocks_per_page {
                        return Err(JournalError::Corruption(format!(
                            "page {} slot {} free-list {} link {} is out of page bounds",
                            page_index, i, which, link
                        )));
                    }
                }
            }
            slots.push(BlockSlot { tag, next, prev });
        }

        Ok(Self {
            page_index,
            available,
            released,
            slots,
        })
    }
}
