//! Configuration for blockjournal
//!
//! Journal parameters are fixed at file creation time and persisted in the
//! file header. Opening an existing journal with different parameters is a
//! hard error.

use crate::error::{JournalError, Result};

/// Smallest supported block size, in bytes.
///
/// A block must be able to hold the largest segment header plus at least
/// some payload.
pub const MIN_BLOCK_SIZE: u32 = 32;

/// Geometry and behavior of a journal file
///
/// All fields except `auto_commit` are persisted in the file header and
/// validated on every open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalParameters {
    // -------------------------------------------------------------------------
    // Geometry
    // -------------------------------------------------------------------------
    /// Size of a single block in bytes (the allocation granularity)
    pub block_size: u32,

    /// Number of blocks per page; each page carries one header describing
    /// the linkage of all its blocks
    pub blocks_per_page: u32,

    /// Number of pages added in one step when the file grows
    pub pages_per_set: u32,

    // -------------------------------------------------------------------------
    // Policy
    // -------------------------------------------------------------------------
    /// Percentage of free blocks on a page above which the page is flagged
    /// by `free_block_ratio` consumers. No reclamation policy is attached;
    /// the threshold is a signal only.
    pub free_block_threshold: u8,

    /// When set, every record carries a whole-record CRC32 in its head
    /// segment, verified on read
    pub paranoid: bool,

    /// When set, `remove` commits the released blocks of the affected
    /// pages immediately instead of waiting for an explicit commit
    pub auto_commit: bool,
}

impl Default for JournalParameters {
    fn default() -> Self {
        Self {
            block_size: 256,
            blocks_per_page: 128,
            pages_per_set: 4,
            free_block_threshold: 50,
            paranoid: false,
            auto_commit: false,
        }
    }
}

impl JournalParameters {
    /// Create a new parameters builder
    pub fn builder() -> JournalParametersBuilder {
        JournalParametersBuilder::default()
    }

    /// Check that the parameters describe a usable journal geometry
    pub fn validate(&self) -> Result<()> {
        if self.block_size < MIN_BLOCK_SIZE {
            return Err(JournalError::InvalidParameters(format!(
                "block_size {} is below the minimum of {}",
                self.block_size, MIN_BLOCK_SIZE
            )));
        }
        if self.blocks_per_page < 2 {
            return Err(JournalError::InvalidParameters(format!(
                "blocks_per_page must be at least 2, got {}",
                self.blocks_per_page
            )));
        }
        if self.pages_per_set == 0 {
            return Err(JournalError::InvalidParameters(
                "pages_per_set must be at least 1".to_string(),
            ));
        }
        if self.free_block_threshold > 100 {
            return Err(JournalError::InvalidParameters(format!(
                "free_block_threshold is a percentage, got {}",
                self.free_block_threshold
            )));
        }
        Ok(())
    }
}

/// Builder for JournalParameters
#[derive(Default)]
pub struct JournalParametersBuilder {
    params: JournalParameters,
}

impl JournalParametersBuilder {
    /// Set the block size in bytes
    pub fn block_size(mut self, bytes: u32) -> Self {
        self.params.block_size = bytes;
        self
    }

    /// Set the number of blocks per page
    pub fn blocks_per_page(mut self, count: u32) -> Self {
        self.params.blocks_per_page = count;
        self
    }

    /// Set the number of pages added per file growth step
    pub fn pages_per_set(mut self, count: u32) -> Self {
        self.params.pages_per_set = count;
        self
    }

    /// Set the free-block percentage threshold
    pub fn free_block_threshold(mut self, percent: u8) -> Self {
        self.params.free_block_threshold = percent;
        self
    }

    /// Enable or disable whole-record checksums
    pub fn paranoid(mut self, enabled: bool) -> Self {
        self.params.paranoid = enabled;
        self
    }

    /// Enable or disable automatic commit of released blocks on remove
    pub fn auto_commit(mut self, enabled: bool) -> Self {
        self.params.auto_commit = enabled;
        self
    }

    pub fn build(self) -> JournalParameters {
        self.params
    }
}
