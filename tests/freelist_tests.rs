//! Tests for block allocation, release, and commit
//!
//! These tests verify:
//! - Block conservation across every operation
//! - The released/available two-step free list (crash-safe delete)
//! - Exact block reuse after a commit
//! - File growth in whole page sets
//! - Free-ratio reporting

use blockjournal::{Journal, JournalError, JournalParameters};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn small_params() -> JournalParameters {
    JournalParameters::builder()
        .block_size(64)
        .blocks_per_page(8)
        .pages_per_set(1)
        .build()
}

fn setup_journal(params: JournalParameters) -> (TempDir, Journal) {
    let temp_dir = TempDir::new().unwrap();
    let journal = Journal::open(temp_dir.path().join("test.jrnl"), params).unwrap();
    (temp_dir, journal)
}

fn assert_conserved(journal: &Journal) {
    journal.validate().unwrap();
    assert!(
        journal.num_available_blocks() + journal.num_released_blocks() <= journal.block_count()
    );
}

// =============================================================================
// Allocation Tests
// =============================================================================

#[test]
fn test_fresh_journal_all_blocks_available() {
    let (_temp, journal) = setup_journal(small_params());

    assert_eq!(journal.page_count(), 1);
    assert_eq!(journal.block_count(), 8);
    assert_eq!(journal.num_available_blocks(), 8);
    assert_eq!(journal.num_released_blocks(), 0);
    assert_conserved(&journal);
}

#[test]
fn test_write_consumes_blocks() {
    let (_temp, mut journal) = setup_journal(small_params());

    // 100 bytes plus a 16-byte segment header needs two 64-byte blocks.
    journal.write(&[0xAAu8; 100][..]).unwrap();

    assert_eq!(journal.num_available_blocks(), 6);
    assert_eq!(journal.num_released_blocks(), 0);
    assert_conserved(&journal);
}

#[test]
fn test_remove_releases_without_reclaiming() {
    let (_temp, mut journal) = setup_journal(small_params());

    let handle = journal.write(&[0xAAu8; 100][..]).unwrap();
    assert_eq!(journal.num_available_blocks(), 6);

    journal.remove(handle).unwrap();

    // The blocks moved to the released list, not back to available.
    assert_eq!(journal.num_available_blocks(), 6);
    assert_eq!(journal.num_released_blocks(), 2);
    assert_conserved(&journal);
}

#[test]
fn test_commit_makes_released_blocks_available() {
    let (_temp, mut journal) = setup_journal(small_params());

    let handle = journal.write(&[0xAAu8; 100][..]).unwrap();
    journal.remove(handle).unwrap();

    let moved = journal.commit().unwrap();

    assert_eq!(moved, 2);
    assert_eq!(journal.num_available_blocks(), 8);
    assert_eq!(journal.num_released_blocks(), 0);
    assert_conserved(&journal);
}

#[test]
fn test_commit_enables_exact_block_reuse() {
    let (_temp, mut journal) = setup_journal(small_params());

    let first = journal.write(&[0x11u8; 100][..]).unwrap();
    journal.remove(first).unwrap();
    journal.commit().unwrap();

    // With the whole page free again, the same blocks come back in the
    // same order and the new record lands on the old handle.
    let second = journal.write(&[0x22u8; 100][..]).unwrap();
    assert_eq!(second, first);
    assert_conserved(&journal);
}

#[test]
fn test_released_blocks_are_not_allocatable() {
    let (_temp, mut journal) = setup_journal(small_params());

    let big = journal.write(&[0x11u8; 300][..]).unwrap(); // 5 blocks
    journal.write(&[0x22u8; 100][..]).unwrap(); // 2 blocks
    journal.remove(big).unwrap();
    assert_eq!(journal.num_released_blocks(), 5);
    assert_eq!(journal.num_available_blocks(), 1);

    // The next write needs more than one block. The released blocks must
    // not satisfy it; the file grows instead.
    journal.write(&[0x33u8; 150][..]).unwrap();

    assert_eq!(journal.num_released_blocks(), 5);
    assert!(journal.page_count() > 1);
    assert_conserved(&journal);
}

#[test]
fn test_auto_commit_reclaims_on_remove() {
    let params = JournalParameters::builder()
        .block_size(64)
        .blocks_per_page(8)
        .pages_per_set(1)
        .auto_commit(true)
        .build();
    let (_temp, mut journal) = setup_journal(params);

    let handle = journal.write(&[0xAAu8; 100][..]).unwrap();
    journal.remove(handle).unwrap();

    assert_eq!(journal.num_released_blocks(), 0);
    assert_eq!(journal.num_available_blocks(), 8);
    assert_conserved(&journal);
}

// =============================================================================
// Growth Tests
// =============================================================================

#[test]
fn test_growth_adds_whole_page_sets() {
    let params = JournalParameters::builder()
        .block_size(64)
        .blocks_per_page(8)
        .pages_per_set(2)
        .build();
    let (_temp, mut journal) = setup_journal(params);
    assert_eq!(journal.page_count(), 2);

    // Far more than the initial two pages can hold.
    journal.write(&vec![0xABu8; 3000][..]).unwrap();

    assert!(journal.page_count() > 2);
    assert_eq!(journal.page_count() % 2, 0);
    assert_conserved(&journal);
}

#[test]
fn test_growth_preserves_existing_records() {
    let (_temp, mut journal) = setup_journal(small_params());

    let small = journal.write(&[0x5Au8; 40][..]).unwrap();
    let big = journal.write(&vec![0xC3u8; 2000][..]).unwrap();

    assert_eq!(journal.read(small).unwrap().as_ref(), &[0x5Au8; 40][..]);
    assert_eq!(journal.read(big).unwrap().as_ref(), &vec![0xC3u8; 2000][..]);
    assert_conserved(&journal);
}

// =============================================================================
// Free Ratio Tests
// =============================================================================

#[test]
fn test_free_block_ratio_full_and_empty() {
    let (_temp, mut journal) = setup_journal(small_params());

    assert_eq!(journal.free_block_ratio(0).unwrap(), 100);

    // Fill the page exactly: 8 blocks minus the 16-byte header.
    let handle = journal.write(&[0x77u8; 8 * 64 - 16][..]).unwrap();
    assert_eq!(journal.free_block_ratio(0).unwrap(), 0);

    // Released blocks still count as free for reclamation purposes.
    journal.remove(handle).unwrap();
    assert_eq!(journal.free_block_ratio(0).unwrap(), 100);
    assert_conserved(&journal);
}

#[test]
fn test_free_block_ratio_out_of_range_page() {
    let (_temp, journal) = setup_journal(small_params());

    let result = journal.free_block_ratio(99);
    assert!(matches!(result, Err(JournalError::Corruption(_))));
}

#[test]
fn test_free_block_threshold_exposed() {
    let params = JournalParameters::builder()
        .block_size(64)
        .blocks_per_page(8)
        .pages_per_set(1)
        .free_block_threshold(80)
        .build();
    let (_temp, journal) = setup_journal(params);

    assert_eq!(journal.free_block_threshold(), 80);
}

// =============================================================================
// Conservation Tests
// =============================================================================

#[test]
fn test_conservation_through_mixed_workload() {
    let (_temp, mut journal) = setup_journal(small_params());
    let mut live = Vec::new();

    for round in 0..20u8 {
        let size = 30 + round as usize * 17;
        let handle = journal.write(&vec![round; size][..]).unwrap();
        live.push(handle);
        assert_conserved(&journal);

        if round % 3 == 2 {
            let victim = live.remove(0);
            journal.remove(victim).unwrap();
            assert_conserved(&journal);
        }
        if round % 5 == 4 {
            journal.commit().unwrap();
            assert_conserved(&journal);
        }
    }

    journal.commit().unwrap();
    assert_conserved(&journal);

    // Everything still live must read back.
    for handle in live {
        journal.read(handle).unwrap();
    }
}
