//! # blockjournal
//!
//! A persistent block-journal storage engine with:
//! - Fixed-size block allocation over pages and page sets
//! - Records chained across same-page segments, any size
//! - Crash-safe deletion through a released/available free-list split
//! - Confirmed/unconfirmed record lists iterable without payload I/O
//! - Optional whole-record CRC32 checksums (paranoid mode)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Journal Facade                         │
//! │      (open / write / read / confirm / remove / commit)       │
//! └───────┬──────────────────┬───────────────────┬──────────────┘
//!         │                  │                   │
//!         ▼                  ▼                   ▼
//!  ┌─────────────┐   ┌───────────────┐   ┌──────────────┐
//!  │  Free-List  │   │ Segment Chain │   │ Record Lists │
//!  │   Manager   │   │     Codec     │   │ (conf/unconf)│
//!  └──────┬──────┘   └───────┬───────┘   └──────┬───────┘
//!         │                  │                  │
//!         ▼                  ▼                  ▼
//!  ┌────────────────────────────────────────────────────┐
//!  │        Page Arena (in-memory page headers)         │
//!  ├────────────────────────────────────────────────────┤
//!  │        Paged File (blocks, headers, growth)        │
//!  └────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod layout;
pub mod arena;
pub mod file;
pub mod freelist;
pub mod record;
pub mod journal;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{JournalParameters, JournalParametersBuilder};
pub use error::{JournalError, Result};
pub use journal::Journal;
pub use layout::{RecordHandle, NIL};
pub use record::{RecordIter, RecordList};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of blockjournal
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
