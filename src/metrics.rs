//! Process-local throughput and health counters layered on top of the
//! shared-memory position counters, mirroring the teacher crate's
//! `Metrics` struct and `original_source/include/nabd/metrics.h`'s
//! `nabd_metrics_t`.
//!
//! These counters are per-handle, not per-segment: two processes attached to
//! the same queue each see their own view of how many times *they*
//! pushed/popped/hit full or empty, not a shared cross-process total. Rate
//! and latency fields are reserved by the spec and always `None` here rather
//! than a C-style magic zero, so callers can tell "not tracked" apart from
//! "measured zero".

use std::sync::atomic::{AtomicU64, Ordering};

/// Accumulates the per-handle counters; cheap enough to update
/// unconditionally on the hot path (a single relaxed `fetch_add`, the same
/// cost the teacher's own instrumentation convention already pays).
#[derive(Debug, Default)]
pub struct Metrics {
    messages_pushed: AtomicU64,
    messages_popped: AtomicU64,
    full_events: AtomicU64,
    empty_events: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_push(&self) {
        self.messages_pushed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pop(&self) {
        self.messages_popped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_full(&self) {
        self.full_events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_empty(&self) {
        self.empty_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_pushed(&self) -> u64 {
        self.messages_pushed.load(Ordering::Relaxed)
    }

    pub fn total_popped(&self) -> u64 {
        self.messages_popped.load(Ordering::Relaxed)
    }

    pub fn full_events(&self) -> u64 {
        self.full_events.load(Ordering::Relaxed)
    }

    pub fn empty_events(&self) -> u64 {
        self.empty_events.load(Ordering::Relaxed)
    }
}

/// A full metrics snapshot combining position, capacity, throughput, and
/// reserved rate/latency fields, per spec §6.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub head: u64,
    pub tail: u64,
    pub pending: u64,
    pub capacity: u64,
    pub slot_size: u64,
    pub used_bytes: u64,
    pub fill_pct: f64,
    pub total_pushed: u64,
    pub total_popped: u64,
    pub full_events: u64,
    pub empty_events: u64,
    /// Reserved: not tracked by this implementation.
    pub push_per_sec: Option<u64>,
    /// Reserved: not tracked by this implementation.
    pub pop_per_sec: Option<u64>,
    /// Reserved: not tracked by this implementation.
    pub avg_latency_ns: Option<u64>,
    /// Reserved: not tracked by this implementation.
    pub p50_latency_ns: Option<u64>,
    /// Reserved: not tracked by this implementation.
    pub p99_latency_ns: Option<u64>,
    /// Reserved: not tracked by this implementation.
    pub max_latency_ns: Option<u64>,
}
