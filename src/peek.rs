//! Consumer-side zero-copy borrow: `Peek` returns a view of the next message
//! without copying or advancing the tail; `Peek::release` (or simply
//! dropping it) decides whether the tail advances.
//!
//! Shaped after [`crate::reservation::Reservation`] from the opposite side of
//! the protocol: grounded on `original_source`'s `nabd_peek`/`nabd_release`
//! and their per-group counterparts.

use std::sync::atomic::AtomicU64;

use crate::ring::RingView;

enum Tail<'a> {
    Default,
    Group(&'a AtomicU64),
}

/// A borrowed, not-yet-released view of the oldest unconsumed message.
///
/// The payload stays valid until [`Peek::release`] is called (or the value
/// is dropped without releasing) — the producer cannot overwrite the slot
/// until this role's tail advances past it.
pub struct Peek<'a> {
    ring: &'a RingView,
    tail: Tail<'a>,
    index: u64,
    data: &'a [u8],
}

impl<'a> Peek<'a> {
    pub(crate) fn new_default(ring: &'a RingView, index: u64, data: &'a [u8]) -> Self {
        Self { ring, tail: Tail::Default, index, data }
    }

    pub(crate) fn new_group(ring: &'a RingView, group_tail: &'a AtomicU64, index: u64, data: &'a [u8]) -> Self {
        Self { ring, tail: Tail::Group(group_tail), index, data }
    }

    /// The borrowed message bytes.
    pub fn as_slice(&self) -> &[u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Advances this role's tail past the peeked message, making its slot
    /// available to the producer again.
    pub fn release(self) {
        match self.tail {
            Tail::Default => self.ring.release_default(self.index),
            Tail::Group(tail) => self.ring.release_group(tail, self.index),
        }
    }
}
