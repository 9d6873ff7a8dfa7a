//! Confirmed and unconfirmed record lists
//!
//! Two disjoint cyclic doubly linked lists of record handles, threaded
//! entirely through head-block slots in the page headers. Iteration never
//! touches record payload; advancing a cursor is one in-memory slot read.
//!
//! A handle is in at most one of the two lists at any time. Mutating the
//! journal while an iterator is live is ruled out by the borrow the
//! iterator holds on the arena.

use tracing::warn;

use crate::arena::PageArena;
use crate::error::{JournalError, Result};
use crate::layout::{BlockSlot, BlockTag, RecordHandle, StateHeader, NIL};

/// The two application-visible record lists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordList {
    Confirmed,
    Unconfirmed,
}

impl RecordList {
    pub(crate) fn tag(self) -> BlockTag {
        match self {
            RecordList::Confirmed => BlockTag::HeadConfirmed,
            RecordList::Unconfirmed => BlockTag::HeadUnconfirmed,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ListAnchor {
    head: u32,
    count: u32,
}

impl ListAnchor {
    fn empty() -> Self {
        Self { head: NIL, count: 0 }
    }
}

/// Anchors of the confirmed and unconfirmed lists
pub struct RecordListManager {
    confirmed: ListAnchor,
    unconfirmed: ListAnchor,
}

impl RecordListManager {
    pub fn new() -> Self {
        Self {
            confirmed: ListAnchor::empty(),
            unconfirmed: ListAnchor::empty(),
        }
    }

    /// Rebuild from the persisted state header
    pub fn from_state(state: &StateHeader) -> Self {
        Self {
            confirmed: ListAnchor {
                head: state.confirmed_head,
                count: state.confirmed_count,
            },
            unconfirmed: ListAnchor {
                head: state.unconfirmed_head,
                count: state.unconfirmed_count,
            },
        }
    }

    /// Snapshot for persisting
    pub fn to_state(&self) -> StateHeader {
        StateHeader {
            confirmed_head: self.confirmed.head,
            confirmed_count: self.confirmed.count,
            unconfirmed_head: self.unconfirmed.head,
            unconfirmed_count: self.unconfirmed.count,
        }
    }

    pub fn count(&self, list: RecordList) -> u32 {
        self.anchor(list).count
    }

    /// Which list a handle is on, if its block is a live head block
    pub fn membership(&self, arena: &PageArena, handle: RecordHandle) -> Result<Option<RecordList>> {
        let location = arena.location(handle)?;
        Ok(match arena.slot(location).tag {
            BlockTag::HeadConfirmed => Some(RecordList::Confirmed),
            BlockTag::HeadUnconfirmed => Some(RecordList::Unconfirmed),
            _ => None,
        })
    }

    /// Insert a freshly written record at the tail of a list
    ///
    /// The head block must be occupied and not yet on any list.
    pub fn insert(&mut self, arena: &mut PageArena, handle: RecordHandle, list: RecordList) -> Result<()> {
        let location = arena.location(handle)?;
        let tag = arena.slot(location).tag;
        if tag != BlockTag::Body {
            return Err(JournalError::Corruption(format!(
                "list insert of record {} whose head block is {:?}",
                handle, tag
            )));
        }
        self.append_tail(arena, handle, list)
    }

    /// Detach a record from whichever list it is on
    ///
    /// Returns the list it was on. The head block becomes a plain occupied
    /// block, ready for release.
    pub fn remove(&mut self, arena: &mut PageArena, handle: RecordHandle) -> Result<RecordList> {
        let membership = self
            .membership(arena, handle)?
            .ok_or(JournalError::NotFound(handle))?;
        self.detach(arena, handle, membership)?;
        Ok(membership)
    }

    /// Move a record to the given list; no-op if already there
    pub fn move_to(&mut self, arena: &mut PageArena, handle: RecordHandle, target: RecordList) -> Result<()> {
        let membership = self
            .membership(arena, handle)?
            .ok_or(JournalError::NotFound(handle))?;
        if membership == target {
            return Ok(());
        }
        self.detach(arena, handle, membership)?;
        self.append_tail(arena, handle, target)
    }

    /// Lazy iteration over a list in insertion order
    pub fn iter<'a>(&self, arena: &'a PageArena, list: RecordList) -> RecordIter<'a> {
        let anchor = self.anchor(list);
        if anchor.head == NIL {
            return RecordIter::empty(arena);
        }
        let back = match arena.location(anchor.head) {
            Ok(location) => arena.slot(location).prev,
            Err(_) => {
                warn!(head = anchor.head, "record list head is outside the file");
                return RecordIter::empty(arena);
            }
        };
        RecordIter {
            arena,
            front: anchor.head,
            back,
            remaining: anchor.count,
        }
    }

    // =========================================================================
    // Cyclic list primitives
    // =========================================================================

    fn anchor(&self, list: RecordList) -> ListAnchor {
        match list {
            RecordList::Confirmed => self.confirmed,
            RecordList::Unconfirmed => self.unconfirmed,
        }
    }

    fn set_anchor(&mut self, list: RecordList, anchor: ListAnchor) {
        match list {
            RecordList::Confirmed => self.confirmed = anchor,
            RecordList::Unconfirmed => self.unconfirmed = anchor,
        }
    }

    fn append_tail(&mut self, arena: &mut PageArena, handle: RecordHandle, list: RecordList) -> Result<()> {
        let mut anchor = self.anchor(list);
        let tag = list.tag();
        let location = arena.location(handle)?;

        if anchor.head == NIL {
            *arena.slot_mut(location) = BlockSlot {
                tag,
                next: handle,
                prev: handle,
            };
            anchor.head = handle;
        } else {
            let head_location = arena.location(anchor.head)?;
            if arena.slot(head_location).tag != tag {
                return Err(JournalError::Corruption(format!(
                    "{:?} list head {} has tag {:?}",
                    list,
                    anchor.head,
                    arena.slot(head_location).tag
                )));
            }
            let tail = arena.slot(head_location).prev;
            let tail_location = arena.location(tail)?;
            *arena.slot_mut(location) = BlockSlot {
                tag,
                next: anchor.head,
                prev: tail,
            };
            arena.slot_mut(tail_location).next = handle;
            arena.slot_mut(head_location).prev = handle;
        }

        anchor.count += 1;
        self.set_anchor(list, anchor);
        Ok(())
    }

    fn detach(&mut self, arena: &mut PageArena, handle: RecordHandle, list: RecordList) -> Result<()> {
        let mut anchor = self.anchor(list);
        if anchor.count == 0 {
            return Err(JournalError::Corruption(format!(
                "detach of record {} from empty {:?} list",
                handle, list
            )));
        }
        let location = arena.location(handle)?;
        let slot = *arena.slot(location);

        if anchor.count == 1 {
            if slot.next != handle || slot.prev != handle || anchor.head != handle {
                return Err(JournalError::Corruption(format!(
                    "{:?} list of one record {} does not self-cycle",
                    list, handle
                )));
            }
            anchor.head = NIL;
        } else {
            let next_location = arena.location(slot.next)?;
            let prev_location = arena.location(slot.prev)?;
            for (name, neighbor) in [("next", next_location), ("prev", prev_location)] {
                if arena.slot(neighbor).tag != list.tag() {
                    return Err(JournalError::Corruption(format!(
                        "record {}: {:?} list {} neighbor has tag {:?}",
                        handle,
                        list,
                        name,
                        arena.slot(neighbor).tag
                    )));
                }
            }
            arena.slot_mut(prev_location).next = slot.next;
            arena.slot_mut(next_location).prev = slot.prev;
            if anchor.head == handle {
                anchor.head = slot.next;
            }
        }

        anchor.count -= 1;
        *arena.slot_mut(location) = BlockSlot::body();
        self.set_anchor(list, anchor);
        Ok(())
    }
}

impl Default for RecordListManager {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Iteration
// =============================================================================

/// Lazy cursor over one record list
///
/// Yields record handles in insertion order (reverse order from the back).
/// Each step reads a single in-memory head-block slot; record payload is
/// never touched.
pub struct RecordIter<'a> {
    arena: &'a PageArena,
    front: u32,
    back: u32,
    remaining: u32,
}

impl<'a> RecordIter<'a> {
    fn empty(arena: &'a PageArena) -> Self {
        Self {
            arena,
            front: NIL,
            back: NIL,
            remaining: 0,
        }
    }

    fn step(&mut self, forward: bool) -> Option<RecordHandle> {
        if self.remaining == 0 {
            return None;
        }
        let handle = if forward { self.front } else { self.back };
        let location = match self.arena.location(handle) {
            Ok(location) => location,
            Err(_) => {
                warn!(handle, "record list walk left the file; stopping iteration");
                self.remaining = 0;
                return None;
            }
        };
        let slot = self.arena.slot(location);
        if forward {
            self.front = slot.next;
        } else {
            self.back = slot.prev;
        }
        self.remaining -= 1;
        Some(handle)
    }
}

impl Iterator for RecordIter<'_> {
    type Item = RecordHandle;

    fn next(&mut self) -> Option<RecordHandle> {
        self.step(true)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining as usize, Some(self.remaining as usize))
    }
}

impl DoubleEndedIterator for RecordIter<'_> {
    fn next_back(&mut self) -> Option<RecordHandle> {
        self.step(false)
    }
}

impl ExactSizeIterator for RecordIter<'_> {}
