//! Record Module
//!
//! Records are the unit exposed to clients: a payload laid out as a chain
//! of segments over allocated blocks, identified by the global index of
//! its head block.
//!
//! ## Responsibilities
//! - Split a payload across allocated blocks and write segment headers
//! - Reassemble and verify a record from its chain
//! - Enumerate a chain's blocks without touching payload
//! - Maintain the confirmed and unconfirmed record lists

pub mod chain;
mod list;

pub use list::{RecordIter, RecordList, RecordListManager};
