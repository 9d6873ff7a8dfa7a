//! Paged file I/O
//!
//! Owns the backing file and the byte-offset math. Block payloads are read
//! and written through here; page headers and the two file-level header
//! regions as well. Growth always extends the file by whole pages.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::JournalParameters;
use crate::error::{JournalError, Result};
use crate::layout::{block_location, PageHeader, DATA_REGION_START, STATE_HEADER_REGION};

/// Positioned I/O over a journal file with a fixed page geometry
pub struct PagedFile {
    file: File,
    path: PathBuf,
    block_size: u32,
    blocks_per_page: u32,
    paranoid: bool,
    page_count: u32,
    data_reads: u64,
    data_writes: u64,
}

impl PagedFile {
    /// Wrap an already opened and header-validated file
    pub fn from_parts(
        file: File,
        path: &Path,
        parameters: &JournalParameters,
        page_count: u32,
    ) -> Self {
        Self {
            file,
            path: path.to_path_buf(),
            block_size: parameters.block_size,
            blocks_per_page: parameters.blocks_per_page,
            paranoid: parameters.paranoid,
            page_count,
            data_reads: 0,
            data_writes: 0,
        }
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    /// Total bytes occupied by one page, header included
    pub fn page_bytes(&self) -> u64 {
        self.blocks_per_page as u64 * self.block_size as u64
            + PageHeader::encoded_len(self.blocks_per_page) as u64
    }

    fn page_offset(&self, page: u32) -> u64 {
        DATA_REGION_START + page as u64 * self.page_bytes()
    }

    /// Byte offset of a block's first byte
    pub fn block_offset(&self, global: u32) -> u64 {
        let location = block_location(global, self.blocks_per_page);
        self.page_offset(location.page) + location.offset as u64 * self.block_size as u64
    }

    /// Byte offset of a page's header
    pub fn page_header_offset(&self, page: u32) -> u64 {
        self.page_offset(page) + self.blocks_per_page as u64 * self.block_size as u64
    }

    /// Reject block indices beyond the current end of the file
    pub fn check_block(&self, global: u32) -> Result<()> {
        let location = block_location(global, self.blocks_per_page);
        if location.page >= self.page_count {
            return Err(JournalError::Corruption(format!(
                "block index {} points beyond the file ({} pages)",
                global, self.page_count
            )));
        }
        Ok(())
    }

    // =========================================================================
    // I/O
    // =========================================================================

    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        self.data_reads += 1;
        Ok(())
    }

    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        self.data_writes += 1;
        Ok(())
    }

    /// Rewrite the mutable state header region
    pub fn write_state_region(&mut self, bytes: &[u8; STATE_HEADER_REGION]) -> Result<()> {
        self.write_at(crate::layout::FILE_HEADER_REGION as u64, bytes)
    }

    /// Extend the file by `count` zeroed pages
    pub fn grow_pages(&mut self, count: u32) -> Result<()> {
        let new_count = self.page_count + count;
        self.file.set_len(self.page_offset(new_count))?;
        self.page_count = new_count;
        Ok(())
    }

    /// Flush file contents and metadata to the storage device
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn blocks_per_page(&self) -> u32 {
        self.blocks_per_page
    }

    pub fn paranoid(&self) -> bool {
        self.paranoid
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn block_count(&self) -> u64 {
        self.page_count as u64 * self.blocks_per_page as u64
    }

    /// Number of positioned reads issued so far (for testing/debugging)
    pub fn data_reads(&self) -> u64 {
        self.data_reads
    }

    /// Number of positioned writes issued so far (for testing/debugging)
    pub fn data_writes(&self) -> u64 {
        self.data_writes
    }
}
