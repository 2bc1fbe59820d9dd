//! The public, owning queue handle: segment creation/attach, the producer
//! claim, and the push/pop/reserve/peek surface built on top of
//! [`crate::ring::RingView`].

use std::sync::atomic::Ordering;

use crate::error::{Error, Result};
use crate::group::{ConsumerGroup, MultiConsumerRegion};
use crate::layout::{self, ControlHeader, MIN_SLOT_SIZE};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::peek::Peek;
use crate::reservation::Reservation;
use crate::ring::RingView;
use crate::segment::Segment;

/// Bitset of the roles a handle opens a queue for, and whether creation
/// should be attempted. Combine with `|`, e.g. `OpenFlags::CREATE | OpenFlags::PRODUCER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags(u32);

impl OpenFlags {
    /// Attempt exclusive creation; falls back to attaching if the segment
    /// already exists.
    pub const CREATE: OpenFlags = OpenFlags(0x01);
    /// This handle will push messages.
    pub const PRODUCER: OpenFlags = OpenFlags(0x02);
    /// This handle will pop/peek messages (via the default tail).
    pub const CONSUMER: OpenFlags = OpenFlags(0x04);

    const fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for OpenFlags {
    type Output = OpenFlags;
    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

/// A snapshot of queue occupancy, taken with relaxed loads (advisory only).
#[derive(Debug, Clone, Copy)]
pub struct Stats {
    pub head: u64,
    pub tail: u64,
    pub capacity: u64,
    pub slot_size: u64,
    pub used: u64,
}

/// An owning handle to a shared-memory queue: a mapped [`Segment`] plus the
/// cached layout parameters needed to address it.
///
/// Unmaps and releases its producer claim on [`Drop`]; [`Queue::close`] is
/// also available for callers who want to observe failures rather than only
/// logging them, mirroring the teacher's `Ring<T>`/`Channel<T>` pattern of an
/// explicit `close()` alongside `Drop`.
pub struct Queue {
    segment: Segment,
    ring: RingView,
    region: MultiConsumerRegion,
    capacity: u64,
    slot_size: u64,
    is_producer: bool,
    metrics: Metrics,
}

impl Queue {
    /// Opens (creating if requested and necessary) a queue segment.
    ///
    /// `capacity`/`slot_size` are only meaningful when `flags` contains
    /// [`OpenFlags::CREATE`] and the segment does not already exist; a
    /// non-power-of-two capacity is rounded up, `0` defaults to 1024 slots of
    /// 4096 bytes.
    pub fn open(name: &str, capacity: u64, slot_size: u64, flags: OpenFlags) -> Result<Self> {
        if !flags.contains(OpenFlags::PRODUCER) && !flags.contains(OpenFlags::CONSUMER) {
            return Err(Error::Invalid("must open as Producer, Consumer, or both"));
        }

        let queue = if flags.contains(OpenFlags::CREATE) {
            match Self::create(name, capacity, slot_size) {
                Ok(q) => q,
                Err(Error::Exists) => Self::attach(name)?,
                Err(e) => return Err(e),
            }
        } else {
            Self::attach(name)?
        };

        queue.claim_producer_if_requested(flags)
    }

    fn create(name: &str, capacity: u64, slot_size: u64) -> Result<Self> {
        let capacity = if capacity == 0 { 1024 } else { capacity };
        let slot_size = if slot_size == 0 { 4096 } else { slot_size };
        let capacity = layout::next_power_of_two(capacity);
        let slot_size = slot_size.max(MIN_SLOT_SIZE);

        let total_size = ControlHeader::BUFFER_OFFSET as usize
            + (capacity * slot_size) as usize
            + MultiConsumerRegion::SIZE;
        let segment = Segment::create(name, total_size)?;

        // SAFETY: segment was just mapped with total_size bytes, large
        // enough for one ControlHeader at the start.
        unsafe {
            ControlHeader::init_in_place(segment.as_ptr().cast(), capacity, slot_size);
        }

        let ring = Self::build_ring(&segment, capacity, slot_size);
        let region = Self::build_region(&segment, capacity, slot_size);
        // SAFETY: the region was just carved out of a freshly zeroed segment;
        // nothing else can observe it concurrently during creation.
        unsafe { region.init_if_needed() };
        Ok(Self { segment, ring, region, capacity, slot_size, is_producer: false, metrics: Metrics::new() })
    }

    fn attach(name: &str) -> Result<Self> {
        let segment = Segment::attach(name)?;
        if segment.size() < ControlHeader::BUFFER_OFFSET as usize {
            return Err(Error::Corrupted("segment smaller than control header"));
        }

        // SAFETY: segment.size() was just checked to be at least one
        // ControlHeader; the pointer is valid for the segment's lifetime.
        let hdr = unsafe { &*segment.as_ptr().cast::<ControlHeader>() };
        if hdr.magic != layout::MAGIC {
            return Err(Error::Invalid("segment magic mismatch"));
        }
        if hdr.version != layout::VERSION {
            return Err(Error::Version { found: hdr.version, expected: layout::VERSION });
        }
        let capacity = hdr.capacity;
        let slot_size = hdr.slot_size;
        let expected_size = ControlHeader::BUFFER_OFFSET as usize
            + (capacity * slot_size) as usize
            + MultiConsumerRegion::SIZE;
        if segment.size() < expected_size {
            return Err(Error::Corrupted("segment smaller than header-declared size"));
        }

        let ring = Self::build_ring(&segment, capacity, slot_size);
        let region = Self::build_region(&segment, capacity, slot_size);
        // SAFETY: attaching never races the creator's one-time
        // initialization in practice (the creator finishes it before the
        // segment name is discoverable by any other process), and the check
        // inside is idempotent regardless.
        unsafe { region.init_if_needed() };
        Ok(Self { segment, ring, region, capacity, slot_size, is_producer: false, metrics: Metrics::new() })
    }

    fn build_ring(segment: &Segment, capacity: u64, slot_size: u64) -> RingView {
        // SAFETY: the control header occupies the first `BUFFER_OFFSET`
        // bytes of the segment and the buffer immediately follows it, for
        // exactly `capacity * slot_size` bytes, per create()/attach() above.
        unsafe {
            let ctrl = segment.as_ptr().cast::<ControlHeader>();
            let buffer = segment.as_ptr().add(ControlHeader::BUFFER_OFFSET as usize);
            RingView::new(ctrl, buffer, capacity, slot_size)
        }
    }

    fn build_region(segment: &Segment, capacity: u64, slot_size: u64) -> MultiConsumerRegion {
        let offset = ControlHeader::BUFFER_OFFSET as usize + (capacity * slot_size) as usize;
        // SAFETY: create()/attach() both size the segment to include
        // `MultiConsumerRegion::SIZE` bytes immediately after the ring
        // buffer, at this same offset.
        unsafe { MultiConsumerRegion::new(segment.as_ptr().add(offset)) }
    }

    fn ctrl(&self) -> &ControlHeader {
        // SAFETY: constructed over the live segment's header for as long as
        // `self` exists.
        unsafe { &*self.segment.as_ptr().cast::<ControlHeader>() }
    }

    fn claim_producer_if_requested(mut self, flags: OpenFlags) -> Result<Self> {
        if flags.contains(OpenFlags::PRODUCER) {
            let claimed = self.ctrl().producer_claimed.compare_exchange(
                0,
                1,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            if claimed.is_err() {
                return Err(Error::Invalid("a producer handle is already open for this queue"));
            }
            self.is_producer = true;
        }
        Ok(self)
    }

    /// The segment's name, as given to [`Queue::open`].
    pub fn name(&self) -> &str {
        self.segment.name()
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn slot_size(&self) -> u64 {
        self.slot_size
    }

    /// Copies `data` into the next slot and publishes it.
    pub fn push(&self, data: &[u8]) -> Result<()> {
        let result = self.ring.push(data);
        match &result {
            Ok(()) => self.metrics.record_push(),
            Err(Error::Full) => self.metrics.record_full(),
            Err(_) => {}
        }
        result
    }

    /// Pops the next message for the default (non-group) consumer into `buf`.
    pub fn pop(&self, buf: &mut [u8]) -> Result<usize> {
        let result = self.ring.pop(buf);
        match &result {
            Ok(_) => self.metrics.record_pop(),
            Err(Error::Empty) => self.metrics.record_empty(),
            Err(_) => {}
        }
        result
    }

    /// Creates a new consumer group, claiming a free descriptor in the
    /// segment's multi-consumer extension. `requested_id == 0` asks for an
    /// auto-assigned id (`slot_index + 1`); the new group's tail starts at
    /// the current head, so it never sees messages published before it
    /// joined. Fails with [`Error::OutOfGroups`] if all [`crate::MAX_GROUPS`]
    /// descriptors are already claimed.
    pub fn create_group(&self, requested_id: u32) -> Result<ConsumerGroup<'_>> {
        ConsumerGroup::create(&self.ring, &self.region, requested_id)
    }

    /// Joins an existing consumer group by id. Fails with
    /// [`Error::NotFound`] if no active group has that id.
    pub fn join_group(&self, group_id: u32) -> Result<ConsumerGroup<'_>> {
        ConsumerGroup::join(&self.ring, &self.region, group_id)
    }

    /// The minimum tail across every currently active consumer group, or the
    /// default consumer's tail if no group is active — the horizon below
    /// which no consumer can still be reading.
    pub fn min_tail(&self) -> u64 {
        self.region.min_tail().unwrap_or_else(|| self.ring.tail())
    }

    /// Reserves the next slot for a zero-copy write. The returned
    /// [`Reservation`] borrows `self` mutably, so a second call cannot
    /// type-check until the first reservation is committed or dropped.
    pub fn reserve(&mut self, len: usize) -> Result<Reservation<'_>> {
        let (pos, slice) = self.ring.reserve(len)?;
        Ok(Reservation::new(&self.ring, pos, slice))
    }

    /// Borrows the next unread message for the default consumer without
    /// copying or advancing the tail.
    pub fn peek(&self) -> Result<Peek<'_>> {
        let (index, len, ptr) = self.ring.peek_default()?;
        // SAFETY: `ptr`/`len` describe a slot published at or before the
        // acquire load inside `peek_default`, valid until the matching
        // release advances the tail past `index`.
        let data = unsafe { std::slice::from_raw_parts(ptr, len) };
        Ok(Peek::new_default(&self.ring, index, data))
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    pub fn stats(&self) -> Stats {
        let head = self.ring.head();
        let tail = self.ring.tail();
        Stats { head, tail, capacity: self.capacity, slot_size: self.slot_size, used: head.wrapping_sub(tail) }
    }

    /// A full metrics snapshot: position counters plus this handle's own
    /// throughput counters. See [`crate::metrics::MetricsSnapshot`] for why
    /// rate/latency fields are `None` rather than a placeholder zero.
    pub fn metrics(&self) -> MetricsSnapshot {
        let head = self.ring.head();
        let tail = self.min_tail();
        let pending = head.wrapping_sub(tail);
        let fill_pct = if self.capacity == 0 { 0.0 } else { (pending as f64 * 100.0) / self.capacity as f64 };
        MetricsSnapshot {
            head,
            tail,
            pending,
            capacity: self.capacity,
            slot_size: self.slot_size,
            used_bytes: pending * self.slot_size,
            fill_pct,
            total_pushed: self.metrics.total_pushed(),
            total_popped: self.metrics.total_popped(),
            full_events: self.metrics.full_events(),
            empty_events: self.metrics.empty_events(),
            push_per_sec: None,
            pop_per_sec: None,
            avg_latency_ns: None,
            p50_latency_ns: None,
            p99_latency_ns: None,
            max_latency_ns: None,
        }
    }

    fn release_producer_claim(&mut self) {
        if self.is_producer {
            self.ctrl().producer_claimed.store(0, Ordering::Release);
            self.is_producer = false;
        }
    }

    /// Unmaps and closes the handle, returning any error observed while
    /// doing so. Equivalent to `drop(queue)` except failures are surfaced.
    pub fn close(mut self) -> Result<()> {
        self.release_producer_claim();
        Ok(())
    }

    /// Removes the segment's name so no further process can attach it; the
    /// backing storage is freed once every current attacher detaches.
    pub fn unlink(name: &str) -> Result<()> {
        Segment::unlink(name)
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        self.release_producer_claim();
    }
}
