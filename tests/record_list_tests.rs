//! Tests for the confirmed and unconfirmed record lists
//!
//! These tests verify:
//! - Insertion-order iteration, forward and backward
//! - Exclusive membership (confirmed XOR unconfirmed)
//! - Confirm/unconfirm moves with unchanged payload
//! - Counts and emptiness

use blockjournal::{Journal, JournalError, JournalParameters, RecordHandle};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_journal() -> (TempDir, Journal) {
    let temp_dir = TempDir::new().unwrap();
    let params = JournalParameters::builder()
        .block_size(64)
        .blocks_per_page(8)
        .pages_per_set(1)
        .build();
    let journal = Journal::open(temp_dir.path().join("test.jrnl"), params).unwrap();
    (temp_dir, journal)
}

fn write_records(journal: &mut Journal, count: usize) -> Vec<RecordHandle> {
    (0..count)
        .map(|i| journal.write(&vec![i as u8; 20 + i][..]).unwrap())
        .collect()
}

// =============================================================================
// Membership Tests
// =============================================================================

#[test]
fn test_new_record_is_unconfirmed() {
    let (_temp, mut journal) = setup_journal();

    let handle = journal.write(&b"hello"[..]).unwrap();

    assert!(journal.is_unconfirmed(handle));
    assert!(!journal.is_confirmed(handle));
    assert_eq!(journal.num_unconfirmed_records(), 1);
    assert_eq!(journal.num_confirmed_records(), 0);
}

#[test]
fn test_confirm_moves_between_lists() {
    let (_temp, mut journal) = setup_journal();

    let handle = journal.write(&b"hello"[..]).unwrap();
    journal.confirm(handle).unwrap();

    assert!(journal.is_confirmed(handle));
    assert!(!journal.is_unconfirmed(handle));
    assert_eq!(journal.num_confirmed_records(), 1);
    assert_eq!(journal.num_unconfirmed_records(), 0);
}

#[test]
fn test_confirm_then_unconfirm_restores_state_and_payload() {
    let (_temp, mut journal) = setup_journal();

    let handle = journal.write(&b"precious payload"[..]).unwrap();
    journal.confirm(handle).unwrap();
    journal.unconfirm(handle).unwrap();

    assert!(journal.is_unconfirmed(handle));
    assert!(!journal.is_confirmed(handle));
    assert_eq!(journal.read(handle).unwrap().as_ref(), b"precious payload");
}

#[test]
fn test_confirm_is_idempotent() {
    let (_temp, mut journal) = setup_journal();

    let handle = journal.write(&b"x"[..]).unwrap();
    journal.confirm(handle).unwrap();
    journal.confirm(handle).unwrap();

    assert_eq!(journal.num_confirmed_records(), 1);
    journal.validate().unwrap();
}

#[test]
fn test_confirm_dead_handle_fails() {
    let (_temp, mut journal) = setup_journal();

    let handle = journal.write(&b"x"[..]).unwrap();
    journal.remove(handle).unwrap();

    let result = journal.confirm(handle);
    assert!(matches!(result, Err(JournalError::NotFound(_))));
}

#[test]
fn test_removed_record_is_on_neither_list() {
    let (_temp, mut journal) = setup_journal();

    let handle = journal.write(&b"x"[..]).unwrap();
    journal.confirm(handle).unwrap();
    journal.remove(handle).unwrap();

    assert!(!journal.is_confirmed(handle));
    assert!(!journal.is_unconfirmed(handle));
    assert_eq!(journal.num_confirmed_records(), 0);
    assert_eq!(journal.num_unconfirmed_records(), 0);
}

// =============================================================================
// Iteration Tests
// =============================================================================

#[test]
fn test_iteration_follows_insertion_order() {
    let (_temp, mut journal) = setup_journal();
    let handles = write_records(&mut journal, 5);

    let seen: Vec<RecordHandle> = journal.iter_unconfirmed().collect();
    assert_eq!(seen, handles);
}

#[test]
fn test_backward_iteration_reverses_order() {
    let (_temp, mut journal) = setup_journal();
    let handles = write_records(&mut journal, 5);

    let seen: Vec<RecordHandle> = journal.iter_unconfirmed().rev().collect();
    let expected: Vec<RecordHandle> = handles.into_iter().rev().collect();
    assert_eq!(seen, expected);
}

#[test]
fn test_iterator_is_exact_size() {
    let (_temp, mut journal) = setup_journal();
    write_records(&mut journal, 4);

    let iter = journal.iter_unconfirmed();
    assert_eq!(iter.len(), 4);
    assert_eq!(journal.iter_confirmed().len(), 0);
}

#[test]
fn test_empty_lists_iterate_empty() {
    let (_temp, journal) = setup_journal();

    assert_eq!(journal.iter_confirmed().count(), 0);
    assert_eq!(journal.iter_unconfirmed().count(), 0);
}

#[test]
fn test_confirm_appends_at_confirmed_tail() {
    let (_temp, mut journal) = setup_journal();
    let handles = write_records(&mut journal, 4);

    // Confirm out of write order; the confirmed list follows confirm order.
    journal.confirm(handles[2]).unwrap();
    journal.confirm(handles[0]).unwrap();
    journal.confirm(handles[3]).unwrap();

    let confirmed: Vec<RecordHandle> = journal.iter_confirmed().collect();
    assert_eq!(confirmed, vec![handles[2], handles[0], handles[3]]);

    let unconfirmed: Vec<RecordHandle> = journal.iter_unconfirmed().collect();
    assert_eq!(unconfirmed, vec![handles[1]]);
}

#[test]
fn test_remove_middle_of_list_keeps_order() {
    let (_temp, mut journal) = setup_journal();
    let handles = write_records(&mut journal, 5);

    journal.remove(handles[2]).unwrap();

    let seen: Vec<RecordHandle> = journal.iter_unconfirmed().collect();
    assert_eq!(seen, vec![handles[0], handles[1], handles[3], handles[4]]);
    journal.validate().unwrap();
}

#[test]
fn test_lists_stay_disjoint_through_churn() {
    let (_temp, mut journal) = setup_journal();
    let handles = write_records(&mut journal, 8);

    for (i, &handle) in handles.iter().enumerate() {
        if i % 2 == 0 {
            journal.confirm(handle).unwrap();
        }
    }
    journal.unconfirm(handles[0]).unwrap();

    for &handle in &handles {
        let confirmed = journal.is_confirmed(handle);
        let unconfirmed = journal.is_unconfirmed(handle);
        assert!(confirmed != unconfirmed, "record {} is on both or neither list", handle);
    }
    assert_eq!(
        journal.num_confirmed_records() + journal.num_unconfirmed_records(),
        8
    );
    journal.validate().unwrap();
}
