//! Zero-copy producer-side reservation token.
//!
//! Mirrors the teacher crate's `Reservation<'a, T>`: a value that borrows the
//! ring, can only be produced by `reserve`, and can only be consumed by
//! `commit`, so the type system rules out double-reserve and double-commit
//! rather than relying on a runtime flag check alone.

use crate::ring::RingView;

/// A reserved slot awaiting a write and a [`Reservation::commit`].
///
/// Dropping a `Reservation` without committing abandons the write: the slot
/// is never published, so no partially-written message becomes visible, but
/// the slot also cannot be reused until this reservation is dropped (there is
/// only ever one live reservation per queue, enforced by
/// [`crate::queue::Queue::reserve`] via a debug-only re-entrancy check).
pub struct Reservation<'a> {
    ring: &'a RingView,
    pos: u64,
    slice: &'a mut [u8],
    written: usize,
}

impl<'a> Reservation<'a> {
    pub(crate) fn new(ring: &'a RingView, pos: u64, slice: &'a mut [u8]) -> Self {
        Self { ring, pos, slice, written: 0 }
    }

    /// The mutable payload region to write into. Its length is the `len`
    /// originally passed to `reserve`; writing fewer bytes and calling
    /// [`Reservation::commit_n`] with a smaller count is still allowed.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.slice
    }

    /// Length of the reserved payload region in bytes, i.e. the `len` passed
    /// to `reserve`.
    pub fn len(&self) -> usize {
        self.slice.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slice.is_empty()
    }

    /// Publishes the full reserved region as the message length.
    pub fn commit(self) {
        let len = self.slice.len();
        self.commit_n(len);
    }

    /// Publishes only the first `n` bytes of the reserved region as the
    /// message length.
    ///
    /// # Panics
    /// Panics if `n` exceeds the reserved length — this is a caller bug
    /// (claiming to have written more than was available to write into), not
    /// a reachable runtime condition.
    pub fn commit_n(mut self, n: usize) {
        assert!(n <= self.slice.len(), "cannot commit more bytes than were reserved");
        self.written = n;
        self.ring.commit(self.pos, n);
    }
}
