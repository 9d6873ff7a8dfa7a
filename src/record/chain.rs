//! Segment chain codec
//!
//! Lays a record out across its allocated blocks as one segment per
//! physically contiguous same-page run, and walks such chains back for
//! reads and removals. A record in a single run (the common case) pays
//! exactly one segment header; only page-boundary crossings and
//! fragmented allocations add more.

use bytes::{Buf, Bytes};
use crc32fast::Hasher;

use crate::error::{JournalError, Result};
use crate::file::PagedFile;
use crate::layout::{blocks_spanned, segment_header_len, RecordHandle, SegmentHeader, NIL};

/// A physically contiguous same-page run of blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentRun {
    /// Global index of the run's first block
    pub first: u32,

    /// Number of consecutive blocks in the run
    pub blocks: u32,
}

/// Group allocated blocks, in chain order, into segment runs
pub fn plan_runs(blocks: &[u32], blocks_per_page: u32) -> Vec<SegmentRun> {
    let mut runs: Vec<SegmentRun> = Vec::new();
    for &block in blocks {
        match runs.last_mut() {
            // A run continues while the next block is physically adjacent
            // and does not start a new page.
            Some(run) if block == run.first + run.blocks && block % blocks_per_page != 0 => {
                run.blocks += 1;
            }
            _ => runs.push(SegmentRun { first: block, blocks: 1 }),
        }
    }
    runs
}

/// Payload bytes the given runs can hold, headers accounted for
pub fn chain_capacity(runs: &[SegmentRun], block_size: u32, paranoid: bool) -> u64 {
    runs.iter()
        .enumerate()
        .map(|(i, run)| {
            run.blocks as u64 * block_size as u64 - segment_header_len(i == 0, paranoid) as u64
        })
        .sum()
}

struct PlannedSegment {
    first: u32,
    header_len: usize,
    remaining: u32,
    length: u32,
    next: u32,
}

/// Write a record across its allocated blocks
///
/// Single pass over the payload: each segment's bytes are copied out of
/// the (possibly fragmented) buffer chain as they are written, feeding the
/// checksum incrementally. The head segment's header is written last, once
/// the whole-record checksum is complete.
pub fn write_chain<B: Buf>(file: &mut PagedFile, blocks: &[u32], mut payload: B) -> Result<()> {
    debug_assert!(!blocks.is_empty());
    let paranoid = file.paranoid();
    let block_size = file.block_size() as u64;
    let handle: RecordHandle = blocks[0];
    let total = payload.remaining();
    let runs = plan_runs(blocks, file.blocks_per_page());

    // Distribute the payload over the runs.
    let mut plans: Vec<PlannedSegment> = Vec::with_capacity(runs.len());
    let mut left = total as u32;
    for (i, run) in runs.iter().enumerate() {
        let header_len = segment_header_len(i == 0, paranoid);
        let capacity = (run.blocks as u64 * block_size - header_len as u64).min(u32::MAX as u64) as u32;
        let length = left.min(capacity);
        if i > 0 && length == 0 {
            return Err(JournalError::Corruption(format!(
                "record {}: allocation left an empty trailing segment at block {}",
                handle, run.first
            )));
        }
        plans.push(PlannedSegment {
            first: run.first,
            header_len,
            remaining: left,
            length,
            next: NIL,
        });
        left -= length;
    }
    if left > 0 {
        return Err(JournalError::Corruption(format!(
            "record {}: allocated blocks hold {} fewer bytes than the record needs",
            handle, left
        )));
    }
    for i in 1..plans.len() {
        plans[i - 1].next = plans[i].first;
    }

    let mut hasher = if paranoid { Some(Hasher::new()) } else { None };

    for (i, plan) in plans.iter().enumerate() {
        let mut buf = Vec::with_capacity(plan.header_len + plan.length as usize);
        if i > 0 {
            let header = SegmentHeader {
                remaining: plan.remaining,
                length: plan.length,
                next_segment: plan.next,
                record_handle: handle,
                checksum: None,
            };
            buf.extend_from_slice(&header.encode());
        }

        let mut still = plan.length as usize;
        while still > 0 {
            let chunk = payload.chunk();
            let take = chunk.len().min(still);
            if take == 0 {
                return Err(JournalError::Corruption(format!(
                    "record {}: payload buffer ended {} bytes early",
                    handle, still
                )));
            }
            if let Some(h) = hasher.as_mut() {
                h.update(&chunk[..take]);
            }
            buf.extend_from_slice(&chunk[..take]);
            payload.advance(take);
            still -= take;
        }

        let offset = file.block_offset(plan.first);
        if i == 0 {
            // Head payload only; the header follows once the checksum is
            // known.
            file.write_at(offset + plan.header_len as u64, &buf)?;
        } else {
            file.write_at(offset, &buf)?;
        }
    }

    let head = &plans[0];
    let header = SegmentHeader {
        remaining: total as u32,
        length: head.length,
        next_segment: head.next,
        record_handle: handle,
        checksum: hasher.map(|h| h.finalize()),
    };
    file.write_at(file.block_offset(head.first), &header.encode())?;
    Ok(())
}

/// Read and verify a record's payload by walking its chain
pub fn read_chain(file: &mut PagedFile, handle: RecordHandle) -> Result<Bytes> {
    let paranoid = file.paranoid();
    let mut out: Vec<u8> = Vec::new();
    let mut hasher = if paranoid { Some(Hasher::new()) } else { None };
    let mut stored_checksum = None;

    walk_chain(file, handle, |file, segment, header, is_head| {
        if is_head {
            out.reserve_exact(header.remaining as usize);
            stored_checksum = header.checksum;
        }
        if header.length > 0 {
            let header_len = segment_header_len(is_head, paranoid);
            let at = out.len();
            out.resize(at + header.length as usize, 0);
            file.read_at(file.block_offset(segment) + header_len as u64, &mut out[at..])?;
            if let Some(h) = hasher.as_mut() {
                h.update(&out[at..]);
            }
        }
        Ok(())
    })?;

    if let (Some(hasher), Some(stored)) = (hasher, stored_checksum) {
        let computed = hasher.finalize();
        if computed != stored {
            return Err(JournalError::ChecksumMismatch {
                handle,
                stored,
                computed,
            });
        }
    }

    Ok(Bytes::from(out))
}

/// Enumerate every block of a record's chain without reading payload
///
/// The result is in chain order with the head block first; it is what the
/// free-list manager needs to release the record.
pub fn unlink_chain(file: &mut PagedFile, handle: RecordHandle) -> Result<Vec<u32>> {
    let paranoid = file.paranoid();
    let mut blocks = Vec::new();

    walk_chain(file, handle, |file, segment, header, is_head| {
        let header_len = segment_header_len(is_head, paranoid);
        let span = segment_block_span(file, segment, header.length, header_len)?;
        for i in 0..span {
            blocks.push(segment + i);
        }
        Ok(())
    })?;

    Ok(blocks)
}

/// Length of a record in bytes, from its head segment header alone
pub fn record_length(file: &mut PagedFile, handle: RecordHandle) -> Result<u32> {
    let header = read_segment_header(file, handle, true)?;
    if header.record_handle != handle {
        return Err(JournalError::Corruption(format!(
            "head block {} carries a segment of record {}",
            handle, header.record_handle
        )));
    }
    Ok(header.remaining)
}

// =============================================================================
// Chain walking
// =============================================================================

fn read_segment_header(file: &mut PagedFile, first_block: u32, is_head: bool) -> Result<SegmentHeader> {
    file.check_block(first_block)?;
    let len = segment_header_len(is_head, file.paranoid());
    let mut buf = vec![0u8; len];
    file.read_at(file.block_offset(first_block), &mut buf)?;
    SegmentHeader::decode(&buf, is_head, file.paranoid())
}

/// Number of blocks a segment occupies, verified against its page bounds
fn segment_block_span(file: &PagedFile, segment: u32, length: u32, header_len: usize) -> Result<u32> {
    let blocks_per_page = file.blocks_per_page();
    let offset = segment % blocks_per_page;
    let span = blocks_spanned(length, header_len, file.block_size());
    if offset as u64 + span as u64 > blocks_per_page as u64 {
        return Err(JournalError::Corruption(format!(
            "segment at block {} spans {} blocks past its page end",
            segment, span
        )));
    }
    Ok(span)
}

/// Walk a chain head to tail, validating linkage and size accounting, and
/// hand every segment to `visit`
fn walk_chain<F>(file: &mut PagedFile, handle: RecordHandle, mut visit: F) -> Result<()>
where
    F: FnMut(&mut PagedFile, u32, &SegmentHeader, bool) -> Result<()>,
{
    let mut segment = handle;
    let mut is_head = true;
    let mut expected_remaining = 0u32;
    let mut hops = 0u64;

    loop {
        hops += 1;
        if hops > file.block_count() {
            return Err(JournalError::Corruption(format!(
                "segment chain of record {} does not terminate",
                handle
            )));
        }

        let header = read_segment_header(file, segment, is_head)?;
        if header.record_handle != handle {
            return Err(JournalError::Corruption(format!(
                "segment chain of record {} crosses into record {} at block {}",
                handle, header.record_handle, segment
            )));
        }
        if !is_head && header.remaining != expected_remaining {
            return Err(JournalError::Corruption(format!(
                "record {}: segment at block {} claims {} bytes remaining, expected {}",
                handle, segment, header.remaining, expected_remaining
            )));
        }
        let header_len = segment_header_len(is_head, file.paranoid());
        segment_block_span(file, segment, header.length, header_len)?;

        visit(file, segment, &header, is_head)?;

        expected_remaining = header.remaining - header.length;
        if header.next_segment == NIL {
            if expected_remaining != 0 {
                return Err(JournalError::Corruption(format!(
                    "record {}: chain ended with {} bytes missing",
                    handle, expected_remaining
                )));
            }
            return Ok(());
        }
        segment = header.next_segment;
        is_head = false;
    }
}
