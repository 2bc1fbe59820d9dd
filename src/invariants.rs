//! Debug assertion macros for the queue's shared-memory invariants.
//!
//! Active only in debug builds (`#[cfg(debug_assertions)]`); zero overhead in
//! release. Modeled on the teacher crate's own `invariants.rs`, generalized
//! from an in-process ring's sequence invariants to the cross-process
//! bounded-occupancy, monotonic-counter, and per-group-FIFO invariants this
//! queue has to hold instead.

/// Assert that occupancy never exceeds capacity.
///
/// **Invariant**: `0 <= head - tail <= capacity` (wrapping subtraction).
macro_rules! debug_assert_bounded_count {
    ($head:expr, $tail:expr, $capacity:expr) => {
        debug_assert!(
            $head.wrapping_sub($tail) <= $capacity,
            "occupancy {} exceeds capacity {}",
            $head.wrapping_sub($tail),
            $capacity
        )
    };
}

/// Assert that a tail counter never runs ahead of head.
///
/// **Invariant**: a consumer can never observe more messages than the
/// producer has published.
macro_rules! debug_assert_tail_not_past_head {
    ($tail:expr, $head:expr) => {
        debug_assert!(
            $tail.wrapping_sub($head) == 0 || $head.wrapping_sub($tail) < (1u64 << 62),
            "tail {} is past head {}",
            $tail,
            $head
        )
    };
}

/// Assert that a counter only advances.
///
/// **Invariant**: `new >= old`, the handoff protocol never rewinds a
/// published position.
macro_rules! debug_assert_monotonic {
    ($old:expr, $new:expr) => {
        debug_assert!($new >= $old, "counter went backwards: {} -> {}", $old, $new)
    };
}

/// Assert a consumer group's claimed slot index is in range.
macro_rules! debug_assert_group_slot_in_range {
    ($index:expr, $max:expr) => {
        debug_assert!($index < $max, "group slot index {} out of range (max {})", $index, $max)
    };
}

pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_group_slot_in_range;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_tail_not_past_head;
