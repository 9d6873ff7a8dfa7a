//! Tests for the on-disk layout codecs
//!
//! These tests verify:
//! - Block addressing math
//! - Round-trip encoding for file, state, page, and segment headers
//! - Corruption detection (bad magic, CRC mismatch, truncation)

use blockjournal::config::JournalParameters;
use blockjournal::layout::{
    block_location, blocks_spanned, global_index, segment_header_len, BlockLocation, BlockTag,
    FileHeader, PageHeader, SegmentHeader, StateHeader, NIL, SEGMENT_HEADER_LEN,
    SEGMENT_HEADER_LEN_CHECKSUMMED,
};
use blockjournal::JournalError;

// =============================================================================
// Block Addressing Tests
// =============================================================================

#[test]
fn test_block_location_first_page() {
    let location = block_location(5, 8);
    assert_eq!(location, BlockLocation { page: 0, offset: 5 });
}

#[test]
fn test_block_location_page_boundaries() {
    assert_eq!(block_location(8, 8), BlockLocation { page: 1, offset: 0 });
    assert_eq!(block_location(15, 8), BlockLocation { page: 1, offset: 7 });
    assert_eq!(block_location(16, 8), BlockLocation { page: 2, offset: 0 });
}

#[test]
fn test_global_index_inverts_block_location() {
    for global in [0, 1, 7, 8, 100, 12345] {
        let location = block_location(global, 32);
        assert_eq!(global_index(location, 32), global);
    }
}

// =============================================================================
// File Header Tests
// =============================================================================

fn sample_parameters() -> JournalParameters {
    JournalParameters::builder()
        .block_size(64)
        .blocks_per_page(16)
        .pages_per_set(2)
        .free_block_threshold(75)
        .paranoid(true)
        .build()
}

#[test]
fn test_file_header_roundtrip() {
    let header = FileHeader::new(sample_parameters());
    let bytes = header.encode();
    let decoded = FileHeader::decode(&bytes).unwrap();

    assert_eq!(decoded, header);
    assert_eq!(decoded.parameters.block_size, 64);
    assert!(decoded.parameters.paranoid);
}

#[test]
fn test_file_header_bad_magic() {
    let mut bytes = FileHeader::new(sample_parameters()).encode();
    bytes[0] = b'X';

    let result = FileHeader::decode(&bytes);
    assert!(matches!(result, Err(JournalError::Corruption(_))));
}

#[test]
fn test_file_header_crc_detects_corruption() {
    let mut bytes = FileHeader::new(sample_parameters()).encode();
    bytes[9] ^= 0xFF; // inside block_size

    let result = FileHeader::decode(&bytes);
    assert!(matches!(result, Err(JournalError::Corruption(_))));
}

#[test]
fn test_file_header_truncated() {
    let bytes = FileHeader::new(sample_parameters()).encode();
    let result = FileHeader::decode(&bytes[..10]);
    assert!(result.is_err());
}

// =============================================================================
// State Header Tests
// =============================================================================

#[test]
fn test_state_header_roundtrip() {
    let state = StateHeader {
        confirmed_head: 42,
        confirmed_count: 3,
        unconfirmed_head: 7,
        unconfirmed_count: 1,
    };
    let bytes = state.encode();
    let decoded = StateHeader::decode(&bytes).unwrap();

    assert_eq!(decoded, state);
}

#[test]
fn test_state_header_empty_roundtrip() {
    let state = StateHeader::empty();
    let decoded = StateHeader::decode(&state.encode()).unwrap();

    assert_eq!(decoded.confirmed_head, NIL);
    assert_eq!(decoded.confirmed_count, 0);
}

#[test]
fn test_state_header_inconsistent_anchor_rejected() {
    // A NIL head with a nonzero count cannot describe any list. Craft the
    // bytes by hand with a valid CRC so only the semantic check can fire.
    let mut bytes = StateHeader::empty().encode();
    bytes[8..12].copy_from_slice(&5u32.to_be_bytes()); // confirmed_count = 5
    let crc = crc32fast::hash(&bytes[..20]);
    bytes[20..24].copy_from_slice(&crc.to_be_bytes());

    let result = StateHeader::decode(&bytes);
    assert!(matches!(result, Err(JournalError::Corruption(_))));
}

#[test]
fn test_state_header_crc_detects_corruption() {
    let mut bytes = StateHeader {
        confirmed_head: 1,
        confirmed_count: 1,
        unconfirmed_head: NIL,
        unconfirmed_count: 0,
    }
    .encode();
    bytes[5] ^= 0x01;

    let result = StateHeader::decode(&bytes);
    assert!(matches!(result, Err(JournalError::Corruption(_))));
}

// =============================================================================
// Page Header Tests
// =============================================================================

#[test]
fn test_fresh_page_header_links_all_blocks() {
    let header = PageHeader::new_fresh(3, 8);

    assert_eq!(header.page_index, 3);
    assert_eq!(header.available.head, 0);
    assert_eq!(header.available.count, 8);
    assert_eq!(header.released.count, 0);

    // Every slot is available and the links form one ascending cycle.
    for (i, slot) in header.slots.iter().enumerate() {
        assert_eq!(slot.tag, BlockTag::Available);
        assert_eq!(slot.next, ((i + 1) % 8) as u32);
        assert_eq!(slot.prev, ((i + 8 - 1) % 8) as u32);
    }
}

#[test]
fn test_page_header_roundtrip() {
    let header = PageHeader::new_fresh(0, 16);
    let bytes = header.encode();

    assert_eq!(bytes.len(), PageHeader::encoded_len(16));

    let decoded = PageHeader::decode(&bytes, 0, 16).unwrap();
    assert_eq!(decoded, header);
}

#[test]
fn test_page_header_wrong_position_rejected() {
    let header = PageHeader::new_fresh(0, 8);
    let bytes = header.encode();

    let result = PageHeader::decode(&bytes, 5, 8);
    assert!(matches!(result, Err(JournalError::Corruption(_))));
}

#[test]
fn test_page_header_crc_detects_corruption() {
    let header = PageHeader::new_fresh(0, 8);
    let mut bytes = header.encode();
    // Flip a slot link byte in the middle of the table.
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xFF;

    let result = PageHeader::decode(&bytes, 0, 8);
    assert!(matches!(result, Err(JournalError::Corruption(_))));
}

#[test]
fn test_page_header_truncated() {
    let bytes = PageHeader::new_fresh(0, 8).encode();
    let result = PageHeader::decode(&bytes[..bytes.len() - 1], 0, 8);
    assert!(result.is_err());
}

// =============================================================================
// Segment Header Tests
// =============================================================================

#[test]
fn test_segment_header_len() {
    assert_eq!(segment_header_len(false, false), SEGMENT_HEADER_LEN);
    assert_eq!(segment_header_len(false, true), SEGMENT_HEADER_LEN);
    assert_eq!(segment_header_len(true, false), SEGMENT_HEADER_LEN);
    assert_eq!(
        segment_header_len(true, true),
        SEGMENT_HEADER_LEN_CHECKSUMMED
    );
}

#[test]
fn test_segment_header_roundtrip_plain() {
    let header = SegmentHeader {
        remaining: 1000,
        length: 400,
        next_segment: 17,
        record_handle: 3,
        checksum: None,
    };
    let bytes = header.encode();
    assert_eq!(bytes.len(), SEGMENT_HEADER_LEN);

    let decoded = SegmentHeader::decode(&bytes, false, false).unwrap();
    assert_eq!(decoded, header);
}

#[test]
fn test_segment_header_roundtrip_checksummed_head() {
    let header = SegmentHeader {
        remaining: 1000,
        length: 1000,
        next_segment: NIL,
        record_handle: 3,
        checksum: Some(0xDEADBEEF),
    };
    let bytes = header.encode();
    assert_eq!(bytes.len(), SEGMENT_HEADER_LEN_CHECKSUMMED);

    let decoded = SegmentHeader::decode(&bytes, true, true).unwrap();
    assert_eq!(decoded, header);
}

#[test]
fn test_segment_header_length_exceeding_remaining_rejected() {
    let header = SegmentHeader {
        remaining: 10,
        length: 11,
        next_segment: NIL,
        record_handle: 3,
        checksum: None,
    };
    let bytes = header.encode();

    let result = SegmentHeader::decode(&bytes, false, false);
    assert!(matches!(result, Err(JournalError::Corruption(_))));
}

#[test]
fn test_segment_header_truncated() {
    let result = SegmentHeader::decode(&[0u8; 8], false, false);
    assert!(result.is_err());
}

#[test]
fn test_blocks_spanned() {
    // Header alone still occupies one block.
    assert_eq!(blocks_spanned(0, 16, 64), 1);
    // Header plus payload exactly filling one block.
    assert_eq!(blocks_spanned(48, 16, 64), 1);
    // One byte over spills into a second block.
    assert_eq!(blocks_spanned(49, 16, 64), 2);
    assert_eq!(blocks_spanned(1000, 20, 64), 16);
}
