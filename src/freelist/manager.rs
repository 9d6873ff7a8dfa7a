//! Free-list manager
//!
//! Blocks move between three states: occupied (part of a record), available
//! (free, allocatable), and released (free, pending commit). The released
//! state exists so that deletion is crash-safe: until a commit, the blocks
//! of a removed record are not handed out again, and a recovery pass may
//! choose to treat them as still allocated.
//!
//! Every structural inconsistency found here is reported as a corruption
//! error and never repaired in place.

use tracing::warn;

use crate::arena::PageArena;
use crate::error::{JournalError, Result};
use crate::layout::{global_index, BlockLocation, BlockSlot, BlockTag, FreeAnchor, NIL};

/// Which of a page's two free lists an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FreeList {
    Available,
    Released,
}

impl FreeList {
    fn tag(self) -> BlockTag {
        match self {
            FreeList::Available => BlockTag::Available,
            FreeList::Released => BlockTag::Released,
        }
    }
}

/// Allocation and reclamation state over the page arena
pub struct FreeListManager {
    /// Page where the next allocation scan starts
    cursor: u32,
    total_available: u64,
    total_released: u64,
}

impl FreeListManager {
    /// Manager for a fresh, empty journal
    pub fn new() -> Self {
        Self {
            cursor: 0,
            total_available: 0,
            total_released: 0,
        }
    }

    /// Rebuild counters from the page headers of an opened journal
    pub fn from_arena(arena: &PageArena) -> Self {
        let mut total_available = 0u64;
        let mut total_released = 0u64;
        for page in 0..arena.page_count() {
            let header = arena.page(page);
            total_available += header.available.count as u64;
            total_released += header.released.count as u64;
        }
        Self {
            cursor: 0,
            total_available,
            total_released,
        }
    }

    pub fn total_available(&self) -> u64 {
        self.total_available
    }

    pub fn total_released(&self) -> u64 {
        self.total_released
    }

    /// Account for pages appended by file growth
    pub fn note_pages_added(&mut self, blocks: u64) {
        self.total_available += blocks;
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Pop `count` blocks from the available lists
    ///
    /// Scans pages in ascending order starting at the allocation cursor and
    /// pops from each page's list head. Deterministic given the operation
    /// history. Never grows the file; the caller decides whether exhaustion
    /// warrants a page-set growth and a retry.
    pub fn allocate(&mut self, arena: &mut PageArena, count: usize) -> Result<Vec<u32>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        if self.total_available < count as u64 || arena.page_count() == 0 {
            return Err(JournalError::OutOfSpace {
                requested: count,
                available: self.total_available,
            });
        }

        let pages = arena.page_count();
        let mut page = self.cursor % pages;
        let mut empty_pages_scanned = 0u32;
        let mut out = Vec::with_capacity(count);

        while out.len() < count {
            if arena.page(page).available.count > 0 {
                out.push(self.pop_free(arena, page, FreeList::Available)?);
                empty_pages_scanned = 0;
            } else {
                page = (page + 1) % pages;
                empty_pages_scanned += 1;
                if empty_pages_scanned > pages {
                    // The totals promised enough blocks but no page
                    // delivered them.
                    return Err(JournalError::Corruption(format!(
                        "available block accounting disagrees with page lists \
                         ({} blocks claimed, {} found)",
                        self.total_available + out.len() as u64,
                        out.len()
                    )));
                }
            }
        }

        self.cursor = page;
        Ok(out)
    }

    /// Return freshly allocated blocks that were never linked into a
    /// record, e.g. when a write fails partway
    pub fn restore(&mut self, arena: &mut PageArena, blocks: &[u32]) -> Result<()> {
        for &block in blocks {
            let location = arena.location(block)?;
            self.expect_tag(arena, location, BlockTag::Body, "restore")?;
            self.push_free(arena, location, FreeList::Available);
        }
        Ok(())
    }

    // =========================================================================
    // Release and commit
    // =========================================================================

    /// Move occupied blocks onto their pages' released lists
    ///
    /// Every block must be occupied and already detached from any record
    /// list; anything else means the caller's view of the structure is
    /// wrong, and the operation fails without touching the lists further.
    pub fn release(&mut self, arena: &mut PageArena, blocks: &[u32]) -> Result<()> {
        for &block in blocks {
            let location = arena.location(block)?;
            self.expect_tag(arena, location, BlockTag::Body, "release")?;
            self.push_free(arena, location, FreeList::Released);
        }
        Ok(())
    }

    /// Move every block on a page's released list to its available list
    ///
    /// Returns the number of blocks moved.
    pub fn commit_page(&mut self, arena: &mut PageArena, page: u32) -> Result<u32> {
        if page >= arena.page_count() {
            return Err(JournalError::Corruption(format!(
                "commit of page {} beyond the last page {}",
                page,
                arena.page_count().saturating_sub(1)
            )));
        }
        let mut moved = 0;
        while arena.page(page).released.count > 0 {
            let block = self.pop_free(arena, page, FreeList::Released)?;
            let location = arena.location(block)?;
            self.push_free(arena, location, FreeList::Available);
            moved += 1;
        }
        Ok(moved)
    }

    /// Commit the released lists of every page
    pub fn commit_all(&mut self, arena: &mut PageArena) -> Result<u64> {
        let mut moved = 0u64;
        for page in 0..arena.page_count() {
            moved += self.commit_page(arena, page)? as u64;
        }
        Ok(moved)
    }

    /// Percentage of a page's blocks that are free (available or released)
    ///
    /// Compared against the configured threshold by callers; no policy is
    /// attached here.
    pub fn free_block_ratio(&self, arena: &PageArena, page: u32) -> Result<u8> {
        if page >= arena.page_count() {
            return Err(JournalError::Corruption(format!(
                "free ratio of page {} beyond the last page {}",
                page,
                arena.page_count().saturating_sub(1)
            )));
        }
        let header = arena.page(page);
        let free = header.available.count as u64 + header.released.count as u64;
        Ok((free * 100 / arena.blocks_per_page() as u64) as u8)
    }

    // =========================================================================
    // Cyclic list primitives
    // =========================================================================

    fn expect_tag(
        &self,
        arena: &PageArena,
        location: BlockLocation,
        expected: BlockTag,
        operation: &str,
    ) -> Result<()> {
        let tag = arena.slot(location).tag;
        if tag != expected {
            let block = global_index(location, arena.blocks_per_page());
            warn!(block, ?tag, operation, "block state does not permit operation");
            return Err(JournalError::Corruption(format!(
                "{} of block {} in state {:?}",
                operation, block, tag
            )));
        }
        Ok(())
    }

    fn anchor_of(header: &crate::layout::PageHeader, list: FreeList) -> FreeAnchor {
        match list {
            FreeList::Available => header.available,
            FreeList::Released => header.released,
        }
    }

    fn set_anchor(header: &mut crate::layout::PageHeader, list: FreeList, anchor: FreeAnchor) {
        match list {
            FreeList::Available => header.available = anchor,
            FreeList::Released => header.released = anchor,
        }
    }

    /// Unlink the head of a page's free list; the block becomes Body
    fn pop_free(&mut self, arena: &mut PageArena, page: u32, list: FreeList) -> Result<u32> {
        let blocks_per_page = arena.blocks_per_page();
        let header = arena.page_mut(page);
        let anchor = Self::anchor_of(header, list);

        if anchor.head == NIL || anchor.count == 0 {
            return Err(JournalError::Corruption(format!(
                "pop from empty {:?} list of page {}",
                list, page
            )));
        }
        let head = anchor.head;
        let head_slot = header.slots[head as usize];
        if head_slot.tag != list.tag() {
            return Err(JournalError::Corruption(format!(
                "page {} {:?} list head {} has tag {:?}",
                page, list, head, head_slot.tag
            )));
        }

        let new_anchor = if anchor.count == 1 {
            if head_slot.next != head || head_slot.prev != head {
                return Err(JournalError::Corruption(format!(
                    "page {} {:?} list of one block {} does not self-cycle",
                    page, list, head
                )));
            }
            FreeAnchor::empty()
        } else {
            header.slots[head_slot.prev as usize].next = head_slot.next;
            header.slots[head_slot.next as usize].prev = head_slot.prev;
            FreeAnchor {
                head: head_slot.next,
                count: anchor.count - 1,
            }
        };

        header.slots[head as usize] = BlockSlot::body();
        Self::set_anchor(header, list, new_anchor);

        match list {
            FreeList::Available => self.total_available -= 1,
            FreeList::Released => self.total_released -= 1,
        }

        Ok(global_index(
            BlockLocation { page, offset: head },
            blocks_per_page,
        ))
    }

    /// Link a Body block at the head of a page's free list
    fn push_free(&mut self, arena: &mut PageArena, location: BlockLocation, list: FreeList) {
        let header = arena.page_mut(location.page);
        let anchor = Self::anchor_of(header, list);
        let offset = location.offset;

        if anchor.head == NIL {
            header.slots[offset as usize] = BlockSlot {
                tag: list.tag(),
                next: offset,
                prev: offset,
            };
        } else {
            let prev = header.slots[anchor.head as usize].prev;
            header.slots[offset as usize] = BlockSlot {
                tag: list.tag(),
                next: anchor.head,
                prev,
            };
            header.slots[prev as usize].next = offset;
            header.slots[anchor.head as usize].prev = offset;
        }

        Self::set_anchor(
            header,
            list,
            FreeAnchor {
                head: offset,
                count: anchor.count + 1,
            },
        );

        match list {
            FreeList::Available => self.total_available += 1,
            FreeList::Released => self.total_released += 1,
        }
    }
}

impl Default for FreeListManager {
    fn default() -> Self {
        Self::new()
    }
}
