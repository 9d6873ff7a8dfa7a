//! Page arena
//!
//! In-memory cache of every page header, indexed by page number. All list
//! manipulation happens here as bounds-checked index updates; dirty pages
//! are written back on synchronize.

use crate::error::{JournalError, Result};
use crate::layout::{block_location, BlockLocation, BlockSlot, PageHeader};

/// All page headers of an open journal
pub struct PageArena {
    blocks_per_page: u32,
    headers: Vec<PageHeader>,
    dirty: Vec<bool>,
}

impl PageArena {
    /// Arena over headers loaded from an existing file
    pub fn from_headers(blocks_per_page: u32, headers: Vec<PageHeader>) -> Self {
        let dirty = vec![false; headers.len()];
        Self {
            blocks_per_page,
            headers,
            dirty,
        }
    }

    /// Empty arena for a journal being created
    pub fn new(blocks_per_page: u32) -> Self {
        Self::from_headers(blocks_per_page, Vec::new())
    }

    pub fn blocks_per_page(&self) -> u32 {
        self.blocks_per_page
    }

    pub fn page_count(&self) -> u32 {
        self.headers.len() as u32
    }

    pub fn block_count(&self) -> u64 {
        self.headers.len() as u64 * self.blocks_per_page as u64
    }

    /// Resolve a global block index, rejecting anything outside the file
    pub fn location(&self, global: u32) -> Result<BlockLocation> {
        let location = block_location(global, self.blocks_per_page);
        if location.page >= self.page_count() {
            return Err(JournalError::Corruption(format!(
                "block index {} is beyond the last page {}",
                global,
                self.page_count().saturating_sub(1)
            )));
        }
        Ok(location)
    }

    pub fn page(&self, page: u32) -> &PageHeader {
        &self.headers[page as usize]
    }

    /// Mutable page access; marks the page for write-back
    pub fn page_mut(&mut self, page: u32) -> &mut PageHeader {
        self.dirty[page as usize] = true;
        &mut self.headers[page as usize]
    }

    pub fn slot(&self, location: BlockLocation) -> &BlockSlot {
        &self.headers[location.page as usize].slots[location.offset as usize]
    }

    pub fn slot_mut(&mut self, location: BlockLocation) -> &mut BlockSlot {
        self.dirty[location.page as usize] = true;
        &mut self.headers[location.page as usize].slots[location.offset as usize]
    }

    /// Append freshly initialized pages (all blocks available)
    pub fn add_fresh_pages(&mut self, count: u32) {
        let first = self.page_count();
        for i in 0..count {
            self.headers
                .push(PageHeader::new_fresh(first + i, self.blocks_per_page));
            self.dirty.push(true);
        }
    }

    /// Pages that need write-back
    pub fn dirty_pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.dirty
            .iter()
            .enumerate()
            .filter(|(_, d)| **d)
            .map(|(i, _)| i as u32)
    }

    pub fn has_dirty_pages(&self) -> bool {
        self.dirty.iter().any(|d| *d)
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.fill(false);
    }
}
