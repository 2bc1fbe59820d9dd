//! The lock-free single-producer/multi-consumer-group ring buffer hot path:
//! slot addressing and the push/pop/peek primitives operating directly on a
//! [`ControlHeader`] and its trailing buffer, however they happen to be
//! mapped (owning segment, borrowed pointer, or loom's model-checked memory).
//!
//! Every operation here follows the same handoff discipline: load your own
//! counter relaxed (nobody else writes it), load the other role's counter
//! acquire (to see what they published), and on success publish with a
//! release store. This mirrors the teacher crate's `Ring<T>` protocol,
//! generalized from an in-process `Box<[MaybeUninit<T>]>` to slots living in
//! a shared-memory segment addressed by raw pointer.

use std::sync::atomic::Ordering;

use crate::error::{Error, Result};
use crate::invariants::{debug_assert_bounded_count, debug_assert_monotonic, debug_assert_tail_not_past_head};
use crate::layout::{ControlHeader, SlotHeader};

/// Borrowed view over a mapped control header and ring buffer, with the
/// capacity/slot_size/mask cached so the hot path never re-reads them from
/// shared memory.
///
/// `RingView` does not own the mapping; [`crate::queue::Queue`] and
/// [`crate::group::ConsumerGroup`] construct one against their own `Segment`
/// on every call rather than storing it, since the segment may be remapped
/// only at attach time and the view is cheap to rebuild.
pub struct RingView {
    ctrl: *mut ControlHeader,
    buffer: *mut u8,
    capacity: u64,
    slot_size: u64,
    mask: u64,
}

impl RingView {
    /// # Safety
    /// `ctrl` must point to a valid, initialized `ControlHeader` and
    /// `buffer` to `capacity * slot_size` writable bytes immediately
    /// following it, both live for at least `'_`'s implicit lifetime (tied to
    /// the owning `Segment`).
    pub unsafe fn new(ctrl: *mut ControlHeader, buffer: *mut u8, capacity: u64, slot_size: u64) -> Self {
        debug_assert!(capacity.is_power_of_two());
        Self { ctrl, buffer, capacity, slot_size, mask: capacity - 1 }
    }

    #[inline]
    fn ctrl(&self) -> &ControlHeader {
        // SAFETY: see `new`'s contract.
        unsafe { &*self.ctrl }
    }

    #[inline]
    fn slot_ptr(&self, index: u64) -> *mut u8 {
        let slot_index = index & self.mask;
        // SAFETY: slot_index < capacity, so the offset stays within the
        // buffer region promised by `new`'s contract.
        unsafe { self.buffer.add((slot_index * self.slot_size) as usize) }
    }

    #[inline]
    fn slot_header(&self, index: u64) -> *mut SlotHeader {
        self.slot_ptr(index).cast()
    }

    #[inline]
    fn slot_payload(&self, index: u64) -> *mut u8 {
        // SAFETY: every slot is at least `SlotHeader::SIZE` bytes (enforced
        // by `MIN_SLOT_SIZE` at creation), so this offset is in-bounds.
        unsafe { self.slot_ptr(index).add(SlotHeader::SIZE) }
    }

    #[inline]
    pub fn max_payload(&self) -> usize {
        self.slot_size as usize - SlotHeader::SIZE
    }

    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    fn load_head_relaxed(&self) -> u64 {
        self.ctrl().head.load(Ordering::Relaxed)
    }

    fn load_head_acquire(&self) -> u64 {
        self.ctrl().head.load(Ordering::Acquire)
    }

    fn load_tail_relaxed(&self) -> u64 {
        self.ctrl().tail.load(Ordering::Relaxed)
    }

    fn load_tail_acquire(&self) -> u64 {
        self.ctrl().tail.load(Ordering::Acquire)
    }

    fn store_head_release(&self, v: u64) {
        debug_assert_monotonic!(self.load_head_relaxed(), v);
        self.ctrl().head.store(v, Ordering::Release);
    }

    fn store_tail_release(&self, v: u64) {
        debug_assert_monotonic!(self.load_tail_relaxed(), v);
        self.ctrl().tail.store(v, Ordering::Release);
    }

    /// Copies `data` into the next slot and publishes it. Fails with
    /// [`Error::Full`] if the queue has no free slot, or [`Error::TooBig`] if
    /// `data` exceeds the slot payload size.
    pub fn push(&self, data: &[u8]) -> Result<()> {
        let max_payload = self.max_payload();
        if data.len() > max_payload {
            return Err(Error::TooBig { required: data.len() });
        }

        let head = self.load_head_relaxed();
        let tail = self.load_tail_acquire();
        debug_assert_bounded_count!(head, tail, self.capacity);
        if head.wrapping_sub(tail) >= self.capacity {
            return Err(Error::Full);
        }

        let hdr = self.slot_header(head);
        let payload = self.slot_payload(head);
        // SAFETY: this slot is exclusively owned by the producer until the
        // release store below publishes it; `data.len() <= max_payload`.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), payload, data.len());
            (*hdr).length = data.len() as u16;
            (*hdr).flags = 0;
            (*hdr).sequence = head as u32;
        }

        self.store_head_release(head.wrapping_add(1));
        Ok(())
    }

    /// Reads the next unconsumed message (for the default, non-group
    /// consumer) into `buf`. Fails with [`Error::Empty`] if none is
    /// available, or [`Error::TooBig`] (with `required` set) if `buf` is too
    /// small — the message is *not* consumed in that case, so a retry with a
    /// larger buffer succeeds.
    pub fn pop(&self, buf: &mut [u8]) -> Result<usize> {
        let tail = self.load_tail_relaxed();
        let head = self.load_head_acquire();
        debug_assert_tail_not_past_head!(tail, head);
        if tail == head {
            return Err(Error::Empty);
        }

        let (len, payload) = self.read_slot(tail);
        if len > buf.len() {
            return Err(Error::TooBig { required: len });
        }
        // SAFETY: `payload` references `len` initialized bytes written by a
        // push that release-published `head > tail`, observed via the
        // acquire load above.
        unsafe {
            std::ptr::copy_nonoverlapping(payload, buf.as_mut_ptr(), len);
        }

        self.store_tail_release(tail.wrapping_add(1));
        Ok(len)
    }

    /// Returns `(length, payload pointer)` for the message at `index`
    /// without validating occupancy — callers must have already checked
    /// `index < head`.
    fn read_slot(&self, index: u64) -> (usize, *const u8) {
        let hdr = self.slot_header(index);
        // SAFETY: index is known occupied by the caller.
        let len = unsafe { (*hdr).length as usize };
        (len, self.slot_payload(index).cast_const())
    }

    /// Borrows the next message without consuming it. The returned slice
    /// stays valid only until the next `pop`/`release` on this role advances
    /// the tail, at which point the producer is free to overwrite the slot.
    pub fn peek_default(&self) -> Result<(u64, usize, *const u8)> {
        let tail = self.load_tail_relaxed();
        let head = self.load_head_acquire();
        if tail == head {
            return Err(Error::Empty);
        }
        let (len, ptr) = self.read_slot(tail);
        Ok((tail, len, ptr))
    }

    /// Advances the default consumer's tail past `index` (must be the value
    /// returned by the most recent [`RingView::peek_default`]).
    pub fn release_default(&self, index: u64) {
        self.store_tail_release(index.wrapping_add(1));
    }

    /// Group-tail variant of [`RingView::pop`]: reads using an explicit tail
    /// atomic rather than the default one, so independent consumer groups
    /// never interfere with each other's progress.
    pub fn pop_group(&self, group_tail: &std::sync::atomic::AtomicU64, buf: &mut [u8]) -> Result<usize> {
        let tail = group_tail.load(Ordering::Relaxed);
        let head = self.load_head_acquire();
        if tail >= head {
            return Err(Error::Empty);
        }
        let (len, payload) = self.read_slot(tail);
        if len > buf.len() {
            return Err(Error::TooBig { required: len });
        }
        // SAFETY: tail < head, observed via the acquire load above.
        unsafe {
            std::ptr::copy_nonoverlapping(payload, buf.as_mut_ptr(), len);
        }
        let new_tail = tail.wrapping_add(1);
        debug_assert_monotonic!(tail, new_tail);
        group_tail.store(new_tail, Ordering::Release);
        Ok(len)
    }

    /// Group-tail variant of [`RingView::peek_default`].
    pub fn peek_group(&self, group_tail: &std::sync::atomic::AtomicU64) -> Result<(u64, usize, *const u8)> {
        let tail = group_tail.load(Ordering::Relaxed);
        let head = self.load_head_acquire();
        if tail >= head {
            return Err(Error::Empty);
        }
        let (len, ptr) = self.read_slot(tail);
        Ok((tail, len, ptr))
    }

    /// Group-tail variant of [`RingView::release_default`].
    pub fn release_group(&self, group_tail: &std::sync::atomic::AtomicU64, index: u64) {
        group_tail.store(index.wrapping_add(1), Ordering::Release);
    }

    /// Reserves the next slot for a zero-copy write. Returns the sequence
    /// number (needed by [`crate::reservation::Reservation::commit`]) and a
    /// mutable byte slice over the payload region.
    pub fn reserve(&self, len: usize) -> Result<(u64, &mut [u8])> {
        let max_payload = self.max_payload();
        if len > max_payload {
            return Err(Error::TooBig { required: len });
        }
        let head = self.load_head_relaxed();
        let tail = self.load_tail_acquire();
        if head.wrapping_sub(tail) >= self.capacity {
            return Err(Error::Full);
        }
        let payload = self.slot_payload(head);
        // SAFETY: slot `head` is exclusively owned until commit publishes it;
        // the returned slice's lifetime is tied by the caller to the single
        // live `Reservation` borrowing this view.
        let slice = unsafe { std::slice::from_raw_parts_mut(payload, max_payload) };
        Ok((head, &mut slice[..len]))
    }

    /// Finalizes a reservation previously returned by [`RingView::reserve`],
    /// recording the actual number of bytes written and publishing the slot.
    pub fn commit(&self, pos: u64, written: usize) {
        let hdr = self.slot_header(pos);
        // SAFETY: `pos` is the slot reserved by the matching `reserve` call,
        // still exclusively owned (no other commit can target the same
        // position before this store publishes it).
        unsafe {
            (*hdr).length = written as u16;
            (*hdr).flags = 0;
            (*hdr).sequence = pos as u32;
        }
        self.store_head_release(pos.wrapping_add(1));
    }

    pub fn is_empty(&self) -> bool {
        self.load_tail_relaxed() == self.load_head_acquire()
    }

    pub fn is_full(&self) -> bool {
        let head = self.load_head_relaxed();
        let tail = self.load_tail_acquire();
        head.wrapping_sub(tail) >= self.capacity
    }

    pub fn head(&self) -> u64 {
        self.load_head_relaxed()
    }

    pub fn tail(&self) -> u64 {
        self.load_tail_relaxed()
    }
}

// SAFETY: a `RingView` is a set of raw pointers into a shared-memory mapping
// that is itself `Send + Sync` (see `crate::segment::Segment`); all mutation
// through it is via atomics or single-writer slot regions guarded by the
// handoff protocol above.
unsafe impl Send for RingView {}
unsafe impl Sync for RingView {}
