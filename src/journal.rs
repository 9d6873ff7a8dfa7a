//! Journal Module
//!
//! The public facade that coordinates all components.
//!
//! ## Responsibilities
//! - Open or initialize journal files and validate their parameters
//! - Orchestrate allocation, segment layout, and list maintenance
//! - Grow the file in page-set increments when allocation runs dry
//! - Flush buffered page headers and journal state on synchronize
//!
//! ## Concurrency Model
//!
//! A `Journal` is single-threaded per file handle: none of its operations
//! take internal locks, and sharing one instance across threads is the
//! caller's problem to synchronize. Opening the same file through two
//! `Journal` instances at once is not supported.
//!
//! ## Record Lifecycle
//!
//! ```text
//! write ──► Unconfirmed ◄──confirm/unconfirm──► Confirmed
//!                │                                  │
//!                └────────────── remove ◄───────────┘
//!                                  │
//!                           blocks Released ──commit──► blocks Available
//! ```
//!
//! A removed record's blocks stay on the released lists until an explicit
//! commit, so a batch of deletions can be made reusable atomically, or
//! abandoned by a crash without losing data. Structure mutations are
//! buffered in memory; `synchronize` is the durability point.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use bytes::{Buf, Bytes};
use tracing::{debug, info, warn};

use crate::arena::PageArena;
use crate::config::JournalParameters;
use crate::error::{JournalError, Result};
use crate::file::PagedFile;
use crate::freelist::FreeListManager;
use crate::layout::{
    BlockTag, FileHeader, FreeAnchor, PageHeader, RecordHandle, StateHeader, FILE_HEADER_REGION,
    NIL, SEGMENT_HEADER_LEN, STATE_HEADER_REGION,
};
use crate::layout::segment_header_len;
use crate::record::chain;
use crate::record::{RecordIter, RecordList};
use crate::record::RecordListManager;

/// A persistent block journal over a single file
pub struct Journal {
    parameters: JournalParameters,
    file: PagedFile,
    arena: PageArena,
    free: FreeListManager,
    records: RecordListManager,
}

impl Journal {
    // =========================================================================
    // Opening
    // =========================================================================

    /// Open an existing journal or initialize a new one
    ///
    /// An existing file must carry exactly the given parameters (except
    /// `auto_commit`, which is an open-time behavior); any difference is a
    /// hard error.
    pub fn open(path: impl AsRef<Path>, parameters: JournalParameters) -> Result<Self> {
        parameters.validate()?;
        let path = path.as_ref();
        let preexisting = fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        if preexisting {
            Self::load(file, path, parameters)
        } else {
            Self::initialize(file, path, parameters)
        }
    }

    /// Open an existing journal, adopting the parameters stored in its
    /// file header
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new().read(true).open(path)?;
        let mut header_bytes = [0u8; FILE_HEADER_REGION];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header_bytes)?;
        drop(file);
        let header = FileHeader::decode(&header_bytes)?;
        Self::open(path, header.parameters)
    }

    fn initialize(file: File, path: &Path, parameters: JournalParameters) -> Result<Self> {
        let mut paged = PagedFile::from_parts(file, path, &parameters, 0);
        paged.write_at(0, &FileHeader::new(parameters).encode())?;
        paged.write_state_region(&StateHeader::empty().encode())?;

        let mut journal = Self {
            parameters,
            file: paged,
            arena: PageArena::new(parameters.blocks_per_page),
            free: FreeListManager::new(),
            records: RecordListManager::new(),
        };
        journal.grow_one_set()?;
        journal.synchronize()?;
        info!(path = %path.display(), pages = journal.file.page_count(), "initialized new journal");
        Ok(journal)
    }

    fn load(mut file: File, path: &Path, parameters: JournalParameters) -> Result<Self> {
        let mut header_bytes = [0u8; FILE_HEADER_REGION];
        let mut state_bytes = [0u8; STATE_HEADER_REGION];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header_bytes)?;
        file.read_exact(&mut state_bytes)?;

        let header = FileHeader::decode(&header_bytes)?;
        Self::check_parameters(&header.parameters, &parameters)?;
        let state = StateHeader::decode(&state_bytes)?;

        let blocks_per_page = parameters.blocks_per_page;
        let page_bytes = blocks_per_page as u64 * parameters.block_size as u64
            + PageHeader::encoded_len(blocks_per_page) as u64;
        let data_len = file.metadata()?.len() - (FILE_HEADER_REGION + STATE_HEADER_REGION) as u64;
        let pages = data_len / page_bytes;
        if data_len % page_bytes != 0 {
            warn!(
                trailing = data_len % page_bytes,
                "journal file ends in a partial page; ignoring the tail"
            );
        }
        if pages == 0 {
            return Err(JournalError::Corruption(
                "journal file contains no complete pages".to_string(),
            ));
        }
        if pages > NIL as u64 / blocks_per_page as u64 {
            return Err(JournalError::Corruption(format!(
                "journal file claims {} pages, more than the format can address",
                pages
            )));
        }

        let mut paged = PagedFile::from_parts(file, path, &parameters, pages as u32);
        let mut headers = Vec::with_capacity(pages as usize);
        let mut reinitialized = Vec::new();
        let mut buf = vec![0u8; PageHeader::encoded_len(blocks_per_page)];
        for page in 0..pages as u32 {
            paged.read_at(paged.page_header_offset(page), &mut buf)?;
            if buf.iter().all(|&b| b == 0) {
                // The file grew past this page but its header was never
                // synchronized. The page holds nothing reachable.
                warn!(page, "page header was never written; treating page as fresh");
                headers.push(PageHeader::new_fresh(page, blocks_per_page));
                reinitialized.push(page);
            } else {
                headers.push(PageHeader::decode(&buf, page, blocks_per_page)?);
            }
        }

        let mut arena = PageArena::from_headers(blocks_per_page, headers);
        for page in reinitialized {
            arena.page_mut(page);
        }
        let free = FreeListManager::from_arena(&arena);
        let records = RecordListManager::from_state(&state);

        let journal = Self {
            parameters,
            file: paged,
            arena,
            free,
            records,
        };
        journal.validate()?;
        debug!(path = %path.display(), pages, "opened journal");
        Ok(journal)
    }

    fn check_parameters(stored: &JournalParameters, given: &JournalParameters) -> Result<()> {
        let mut mismatches = Vec::new();
        if stored.block_size != given.block_size {
            mismatches.push(format!(
                "block_size: file has {}, given {}",
                stored.block_size, given.block_size
            ));
        }
        if stored.blocks_per_page != given.blocks_per_page {
            mismatches.push(format!(
                "blocks_per_page: file has {}, given {}",
                stored.blocks_per_page, given.blocks_per_page
            ));
        }
        if stored.pages_per_set != given.pages_per_set {
            mismatches.push(format!(
                "pages_per_set: file has {}, given {}",
                stored.pages_per_set, given.pages_per_set
            ));
        }
        if stored.free_block_threshold != given.free_block_threshold {
            mismatches.push(format!(
                "free_block_threshold: file has {}, given {}",
                stored.free_block_threshold, given.free_block_threshold
            ));
        }
        if stored.paranoid != given.paranoid {
            mismatches.push(format!(
                "paranoid: file has {}, given {}",
                stored.paranoid, given.paranoid
            ));
        }
        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(JournalError::ParameterMismatch(mismatches.join("; ")))
        }
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Write a record and return its handle
    ///
    /// The payload may be any buffer, including a chain of fragments; it is
    /// consumed in a single pass. The new record lands on the unconfirmed
    /// list. Allocation grows the file by page sets as needed.
    pub fn write<B: Buf>(&mut self, payload: B) -> Result<RecordHandle> {
        let size = payload.remaining();
        if size > u32::MAX as usize {
            return Err(JournalError::RecordTooLarge { size: size as u64 });
        }

        let blocks = self.allocate_for(size)?;
        if let Err(e) = chain::write_chain(&mut self.file, &blocks, payload) {
            // The blocks were never linked into a record; put them back.
            if let Err(restore_err) = self.free.restore(&mut self.arena, &blocks) {
                warn!(error = %restore_err, "failed to restore blocks after aborted write");
            }
            return Err(e);
        }
        let handle = blocks[0];
        self.records
            .insert(&mut self.arena, handle, RecordList::Unconfirmed)?;
        debug!(handle, size, blocks = blocks.len(), "wrote record");
        Ok(handle)
    }

    /// Allocate enough blocks for a payload, accounting for segment
    /// headers and whatever fragmentation the free lists hand out
    fn allocate_for(&mut self, size: usize) -> Result<Vec<u32>> {
        let block_size = self.parameters.block_size as usize;
        let head_header = segment_header_len(true, self.parameters.paranoid);
        let mut target = (size + head_header).div_ceil(block_size).max(1);
        let mut blocks: Vec<u32> = Vec::new();

        loop {
            let want = target.saturating_sub(blocks.len());
            if want > 0 {
                match self.allocate_with_growth(want) {
                    Ok(mut more) => blocks.append(&mut more),
                    Err(e) => {
                        if !blocks.is_empty() {
                            if let Err(restore_err) = self.free.restore(&mut self.arena, &blocks) {
                                warn!(error = %restore_err, "failed to restore blocks after failed allocation");
                            }
                        }
                        return Err(e);
                    }
                }
            }

            let runs = chain::plan_runs(&blocks, self.parameters.blocks_per_page);
            let capacity =
                chain::chain_capacity(&runs, self.parameters.block_size, self.parameters.paranoid);
            if capacity >= size as u64 {
                return Ok(blocks);
            }
            // Fragmented allocation split the chain into more runs than
            // planned; each extra run costs another segment header.
            let deficit = (size as u64 - capacity) as usize;
            target = blocks.len() + (deficit + SEGMENT_HEADER_LEN).div_ceil(block_size).max(1);
        }
    }

    fn allocate_with_growth(&mut self, want: usize) -> Result<Vec<u32>> {
        match self.free.allocate(&mut self.arena, want) {
            Ok(blocks) => Ok(blocks),
            Err(JournalError::OutOfSpace { .. }) => {
                let per_set =
                    self.parameters.pages_per_set as u64 * self.parameters.blocks_per_page as u64;
                let shortfall = (want as u64).saturating_sub(self.free.total_available());
                let sets = shortfall.div_ceil(per_set).max(1);
                for _ in 0..sets {
                    self.grow_one_set()?;
                }
                self.free.allocate(&mut self.arena, want)
            }
            Err(e) => Err(e),
        }
    }

    fn grow_one_set(&mut self) -> Result<()> {
        let pages = self.parameters.pages_per_set;
        self.file.grow_pages(pages)?;
        self.arena.add_fresh_pages(pages);
        self.free
            .note_pages_added(pages as u64 * self.parameters.blocks_per_page as u64);
        debug!(pages, total = self.file.page_count(), "grew journal by one page set");
        Ok(())
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Read a record's payload
    pub fn read(&mut self, handle: RecordHandle) -> Result<Bytes> {
        self.require_head(handle)?;
        chain::read_chain(&mut self.file, handle)
    }

    /// Length of a record in bytes, without reading its payload
    pub fn record_length(&mut self, handle: RecordHandle) -> Result<usize> {
        self.require_head(handle)?;
        Ok(chain::record_length(&mut self.file, handle)? as usize)
    }

    fn require_head(&self, handle: RecordHandle) -> Result<()> {
        let location = self
            .arena
            .location(handle)
            .map_err(|_| JournalError::NotFound(handle))?;
        if !self.arena.slot(location).tag.is_head() {
            return Err(JournalError::NotFound(handle));
        }
        Ok(())
    }

    // =========================================================================
    // List membership
    // =========================================================================

    /// Move a record to the confirmed list; no-op if already confirmed
    pub fn confirm(&mut self, handle: RecordHandle) -> Result<()> {
        self.require_head(handle)?;
        self.records
            .move_to(&mut self.arena, handle, RecordList::Confirmed)
    }

    /// Move a record to the unconfirmed list; no-op if already unconfirmed
    pub fn unconfirm(&mut self, handle: RecordHandle) -> Result<()> {
        self.require_head(handle)?;
        self.records
            .move_to(&mut self.arena, handle, RecordList::Unconfirmed)
    }

    /// Iterate the confirmed list in insertion order
    pub fn iter_confirmed(&self) -> RecordIter<'_> {
        self.records.iter(&self.arena, RecordList::Confirmed)
    }

    /// Iterate the unconfirmed list in insertion order
    pub fn iter_unconfirmed(&self) -> RecordIter<'_> {
        self.records.iter(&self.arena, RecordList::Unconfirmed)
    }

    // =========================================================================
    // Removal and commit
    // =========================================================================

    /// Remove a record, moving its blocks to the released lists
    ///
    /// The blocks become allocatable only after [`Journal::commit`] (or
    /// immediately, when the journal runs with `auto_commit`). Until then
    /// a crash leaves them recoverable.
    pub fn remove(&mut self, handle: RecordHandle) -> Result<()> {
        self.require_head(handle)?;
        let blocks = chain::unlink_chain(&mut self.file, handle)?;
        debug_assert_eq!(blocks.first(), Some(&handle));
        self.records.remove(&mut self.arena, handle)?;
        self.free.release(&mut self.arena, &blocks)?;

        if self.parameters.auto_commit {
            let mut pages: Vec<u32> = blocks
                .iter()
                .map(|b| b / self.parameters.blocks_per_page)
                .collect();
            pages.sort_unstable();
            pages.dedup();
            for page in pages {
                self.free.commit_page(&mut self.arena, page)?;
            }
        }
        debug!(handle, blocks = blocks.len(), "removed record");
        Ok(())
    }

    /// Move every released block in the journal to its available list
    ///
    /// Returns the number of blocks made allocatable.
    pub fn commit(&mut self) -> Result<u64> {
        self.free.commit_all(&mut self.arena)
    }

    /// Commit the released blocks of a single page
    pub fn commit_page(&mut self, page: u32) -> Result<u32> {
        self.free.commit_page(&mut self.arena, page)
    }

    // =========================================================================
    // Durability
    // =========================================================================

    /// Flush buffered page headers and journal state, then fsync
    ///
    /// Nothing mutated since the last synchronize is durable before this
    /// returns.
    pub fn synchronize(&mut self) -> Result<()> {
        self.flush_headers()?;
        self.file.sync()
    }

    /// Synchronize and consume the journal
    pub fn close(mut self) -> Result<()> {
        self.synchronize()
    }

    fn flush_headers(&mut self) -> Result<()> {
        let dirty: Vec<u32> = self.arena.dirty_pages().collect();
        for page in dirty {
            let bytes = self.arena.page(page).encode();
            let offset = self.file.page_header_offset(page);
            self.file.write_at(offset, &bytes)?;
        }
        self.arena.clear_dirty();
        self.file.write_state_region(&self.records.to_state().encode())
    }

    // =========================================================================
    // Integrity
    // =========================================================================

    /// Deep structural check of every list and counter
    ///
    /// Walks each free list and record list, verifying that cycles close
    /// in exactly their counted number of steps, that `prev` is the
    /// inverse of `next`, that slot tags agree with list membership, and
    /// that the block totals add up. Runs against the in-memory structure
    /// only; record payloads are not read.
    pub fn validate(&self) -> Result<()> {
        let mut available_tagged = 0u64;
        let mut released_tagged = 0u64;

        for page in 0..self.arena.page_count() {
            let header = self.arena.page(page);

            let available_slots = header
                .slots
                .iter()
                .filter(|s| s.tag == BlockTag::Available)
                .count() as u32;
            if available_slots != header.available.count {
                return Err(JournalError::Corruption(format!(
                    "page {}: {} blocks tagged available, anchor counts {}",
                    page, available_slots, header.available.count
                )));
            }
            let released_slots = header
                .slots
                .iter()
                .filter(|s| s.tag == BlockTag::Released)
                .count() as u32;
            if released_slots != header.released.count {
                return Err(JournalError::Corruption(format!(
                    "page {}: {} blocks tagged released, anchor counts {}",
                    page, released_slots, header.released.count
                )));
            }

            self.check_page_cycle(page, header.available, BlockTag::Available)?;
            self.check_page_cycle(page, header.released, BlockTag::Released)?;

            available_tagged += available_slots as u64;
            released_tagged += released_slots as u64;
        }

        if available_tagged != self.free.total_available() {
            return Err(JournalError::Corruption(format!(
                "{} blocks tagged available, manager counts {}",
                available_tagged,
                self.free.total_available()
            )));
        }
        if released_tagged != self.free.total_released() {
            return Err(JournalError::Corruption(format!(
                "{} blocks tagged released, manager counts {}",
                released_tagged,
                self.free.total_released()
            )));
        }

        self.check_record_cycle(RecordList::Confirmed)?;
        self.check_record_cycle(RecordList::Unconfirmed)?;
        Ok(())
    }

    fn check_page_cycle(&self, page: u32, anchor: FreeAnchor, tag: BlockTag) -> Result<()> {
        if anchor.head == NIL {
            return Ok(());
        }
        let header = self.arena.page(page);
        let mut current = anchor.head;
        for _ in 0..anchor.count {
            let slot = header.slots.get(current as usize).ok_or_else(|| {
                JournalError::Corruption(format!(
                    "page {}: {:?} list reaches offset {} outside the page",
                    page, tag, current
                ))
            })?;
            if slot.tag != tag {
                return Err(JournalError::Corruption(format!(
                    "page {}: {:?} list member {} has tag {:?}",
                    page, tag, current, slot.tag
                )));
            }
            let next_slot = header.slots.get(slot.next as usize).ok_or_else(|| {
                JournalError::Corruption(format!(
                    "page {}: {:?} list link {} -> {} leaves the page",
                    page, tag, current, slot.next
                ))
            })?;
            if next_slot.prev != current {
                return Err(JournalError::Corruption(format!(
                    "page {}: {:?} list prev is not the inverse of next at offset {}",
                    page, tag, current
                )));
            }
            current = slot.next;
        }
        if current != anchor.head {
            return Err(JournalError::Corruption(format!(
                "page {}: {:?} list does not cycle back to its head in {} steps",
                page, tag, anchor.count
            )));
        }
        Ok(())
    }

    fn check_record_cycle(&self, list: RecordList) -> Result<()> {
        let state = self.records.to_state();
        let (head, count) = match list {
            RecordList::Confirmed => (state.confirmed_head, state.confirmed_count),
            RecordList::Unconfirmed => (state.unconfirmed_head, state.unconfirmed_count),
        };
        if head == NIL {
            return Ok(());
        }
        let mut current = head;
        for _ in 0..count {
            let location = self.arena.location(current)?;
            let slot = self.arena.slot(location);
            if slot.tag != list.tag() {
                return Err(JournalError::Corruption(format!(
                    "{:?} list member {} has tag {:?}",
                    list, current, slot.tag
                )));
            }
            let next_location = self.arena.location(slot.next)?;
            if self.arena.slot(next_location).prev != current {
                return Err(JournalError::Corruption(format!(
                    "{:?} list prev is not the inverse of next at record {}",
                    list, current
                )));
            }
            current = slot.next;
        }
        if current != head {
            return Err(JournalError::Corruption(format!(
                "{:?} list does not cycle back to its head in {} steps",
                list, count
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// The parameters this journal was opened with
    pub fn parameters(&self) -> &JournalParameters {
        &self.parameters
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn block_size(&self) -> u32 {
        self.parameters.block_size
    }

    pub fn blocks_per_page(&self) -> u32 {
        self.parameters.blocks_per_page
    }

    pub fn pages_per_set(&self) -> u32 {
        self.parameters.pages_per_set
    }

    pub fn page_count(&self) -> u32 {
        self.file.page_count()
    }

    pub fn block_count(&self) -> u64 {
        self.file.block_count()
    }

    pub fn num_confirmed_records(&self) -> u32 {
        self.records.count(RecordList::Confirmed)
    }

    pub fn num_unconfirmed_records(&self) -> u32 {
        self.records.count(RecordList::Unconfirmed)
    }

    pub fn num_available_blocks(&self) -> u64 {
        self.free.total_available()
    }

    pub fn num_released_blocks(&self) -> u64 {
        self.free.total_released()
    }

    /// Whether the handle denotes a live record on the confirmed list
    pub fn is_confirmed(&self, handle: RecordHandle) -> bool {
        matches!(
            self.records.membership(&self.arena, handle),
            Ok(Some(RecordList::Confirmed))
        )
    }

    /// Whether the handle denotes a live record on the unconfirmed list
    pub fn is_unconfirmed(&self, handle: RecordHandle) -> bool {
        matches!(
            self.records.membership(&self.arena, handle),
            Ok(Some(RecordList::Unconfirmed))
        )
    }

    /// Percentage of a page's blocks that are free (available or released)
    pub fn free_block_ratio(&self, page: u32) -> Result<u8> {
        self.free.free_block_ratio(&self.arena, page)
    }

    pub fn free_block_threshold(&self) -> u8 {
        self.parameters.free_block_threshold
    }

    /// Positioned reads issued against the backing file so far
    pub fn data_reads(&self) -> u64 {
        self.file.data_reads()
    }

    /// Positioned writes issued against the backing file so far
    pub fn data_writes(&self) -> u64 {
        self.file.data_writes()
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        // Best-effort header flush; durability still requires an explicit
        // synchronize before drop.
        if self.arena.has_dirty_pages() {
            if let Err(e) = self.flush_headers() {
                warn!(error = %e, "failed to flush journal headers on drop");
            }
        }
    }
}
