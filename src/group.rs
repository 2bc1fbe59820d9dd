//! Consumer groups: independent tail-bearing observers of the same stream,
//! implemented over the multi-consumer extension region following the ring
//! buffer. Grounded on `original_source`'s `nabd_consumer_create`/`_join`/
//! `_pop`/`_peek`/`_release`/`_stats`/`nabd_min_tail` — the original's own
//! `q->multi` is never actually allocated anywhere in that file (the feature
//! is stubbed out), so this port implements the allocation and claim logic
//! fully rather than porting a no-op.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::invariants::debug_assert_group_slot_in_range;
use crate::layout::{GroupDescriptor, MultiConsumerHeader, MAX_GROUPS, MULTI_MAGIC};
use crate::peek::Peek;
use crate::ring::RingView;

/// The multi-consumer extension region: a small header followed by
/// [`MAX_GROUPS`] fixed descriptors, living immediately after the ring
/// buffer in the segment.
pub struct MultiConsumerRegion {
    header: *mut MultiConsumerHeader,
    groups: *mut GroupDescriptor,
}

impl MultiConsumerRegion {
    /// Total size in bytes of the extension region (header + all descriptors).
    pub const SIZE: usize = crate::layout::MULTI_REGION_SIZE;

    /// # Safety
    /// `ptr` must point to at least [`MultiConsumerRegion::SIZE`] writable
    /// bytes, live for at least the caller's intended usage window.
    pub unsafe fn new(ptr: *mut u8) -> Self {
        let header = ptr.cast::<MultiConsumerHeader>();
        // SAFETY: header occupies size_of::<MultiConsumerHeader>() bytes at
        // the start of the region per this type's contract.
        let groups = ptr.add(std::mem::size_of::<MultiConsumerHeader>()).cast::<GroupDescriptor>();
        Self { header, groups }
    }

    /// Zero-initializes the region and writes its magic, if not already
    /// present. Idempotent: a second call on an already-initialized region
    /// is a no-op.
    ///
    /// # Safety
    /// Same as [`MultiConsumerRegion::new`]; additionally requires no
    /// concurrent reader/writer during initialization.
    pub unsafe fn init_if_needed(&self) {
        if (*self.header).magic != MULTI_MAGIC {
            std::ptr::write_bytes(self.header, 0, 1);
            std::ptr::write_bytes(self.groups, 0, MAX_GROUPS);
            (*self.header).magic = MULTI_MAGIC;
        }
    }

    fn descriptor(&self, i: usize) -> &GroupDescriptor {
        // SAFETY: i < MAX_GROUPS, checked by every caller below, and the
        // pointer spans MAX_GROUPS descriptors per this type's contract.
        unsafe { &*self.groups.add(i) }
    }

    fn active(&self, i: usize) -> &AtomicU32 {
        &self.descriptor(i).active
    }

    fn group_id_of(&self, i: usize) -> &AtomicU32 {
        &self.descriptor(i).group_id
    }

    fn tail_of(&self, i: usize) -> &AtomicU64 {
        &self.descriptor(i).tail
    }

    /// Claims a free descriptor via CAS, assigns it `group_id` (or
    /// `slot_index + 1` if `group_id == 0`), and initializes its tail to the
    /// current head. Returns the claimed slot index and assigned id.
    pub fn claim(&self, requested_id: u32, current_head: u64) -> Result<(usize, u32)> {
        for i in 0..MAX_GROUPS {
            if self.active(i).compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                debug_assert_group_slot_in_range!(i, MAX_GROUPS);
                let assigned = if requested_id != 0 { requested_id } else { (i + 1) as u32 };
                self.group_id_of(i).store(assigned, Ordering::Relaxed);
                self.tail_of(i).store(current_head, Ordering::Release);
                return Ok((i, assigned));
            }
        }
        Err(Error::OutOfGroups)
    }

    /// Finds an active descriptor by id.
    pub fn find(&self, group_id: u32) -> Result<usize> {
        for i in 0..MAX_GROUPS {
            if self.active(i).load(Ordering::Acquire) == 1 && self.group_id_of(i).load(Ordering::Relaxed) == group_id
            {
                return Ok(i);
            }
        }
        Err(Error::NotFound("no active consumer group with that id"))
    }

    /// Minimum tail across all active groups, or `None` if no group is
    /// active (callers fall back to the default tail per spec §4.3).
    pub fn min_tail(&self) -> Option<u64> {
        let mut min = None;
        for i in 0..MAX_GROUPS {
            if self.active(i).load(Ordering::Relaxed) == 1 {
                let tail = self.tail_of(i).load(Ordering::Relaxed);
                min = Some(min.map_or(tail, |m: u64| m.min(tail)));
            }
        }
        min
    }
}

// SAFETY: a `MultiConsumerRegion` is raw pointers into the same
// shared-memory mapping as `RingView`, mutated only through atomics.
unsafe impl Send for MultiConsumerRegion {}
unsafe impl Sync for MultiConsumerRegion {}

/// A bound consumer handle for one consumer group.
///
/// Closing (dropping) a `ConsumerGroup` does not clear the group's `active`
/// flag — other joiners may still be consuming from it. The descriptor is
/// only released when the segment itself is destroyed (spec §4.3).
pub struct ConsumerGroup<'a> {
    ring: &'a RingView,
    region: &'a MultiConsumerRegion,
    slot: usize,
    group_id: u32,
}

impl<'a> ConsumerGroup<'a> {
    /// Creates a new group, claiming a free descriptor. `requested_id == 0`
    /// asks for an auto-assigned id.
    pub fn create(ring: &'a RingView, region: &'a MultiConsumerRegion, requested_id: u32) -> Result<Self> {
        let (slot, group_id) = region.claim(requested_id, ring.head())?;
        Ok(Self { ring, region, slot, group_id })
    }

    /// Joins an existing group by id.
    pub fn join(ring: &'a RingView, region: &'a MultiConsumerRegion, group_id: u32) -> Result<Self> {
        if group_id == 0 {
            return Err(Error::Invalid("group id 0 is reserved for auto-assignment"));
        }
        let slot = region.find(group_id)?;
        Ok(Self { ring, region, slot, group_id })
    }

    pub fn group_id(&self) -> u32 {
        self.group_id
    }

    fn tail(&self) -> &AtomicU64 {
        self.region.tail_of(self.slot)
    }

    /// Pops the next message for this group into `buf`.
    pub fn pop(&self, buf: &mut [u8]) -> Result<usize> {
        self.ring.pop_group(self.tail(), buf)
    }

    /// Borrows the next unread message for this group without consuming it.
    pub fn peek(&self) -> Result<Peek<'a>> {
        let (index, len, ptr) = self.ring.peek_group(self.tail())?;
        // SAFETY: `ptr`/`len` describe a slot published at or before the
        // acquire load inside `peek_group`.
        let data = unsafe { std::slice::from_raw_parts(ptr, len) };
        Ok(Peek::new_group(self.ring, self.tail(), index, data))
    }

    /// Current lag: how many published messages this group has not yet
    /// consumed.
    pub fn lag(&self) -> u64 {
        let head = self.ring.head();
        let tail = self.tail().load(Ordering::Relaxed);
        head.saturating_sub(tail)
    }

    pub fn current_tail(&self) -> u64 {
        self.tail().load(Ordering::Relaxed)
    }

    /// Forcibly sets this group's tail, used by checkpoint resume to clamp
    /// to `min(checkpoint.tail, current head)`.
    pub(crate) fn set_tail(&self, value: u64) {
        self.tail().store(value, Ordering::Release);
    }
}
