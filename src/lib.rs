//! ringshm: a lock-free single-producer / multi-consumer-group shared-memory
//! message queue for single-host inter-process communication.
//!
//! Producers publish fixed-maximum-size messages into a named shared-memory
//! ring buffer; one or more independent [`group::ConsumerGroup`]s each
//! observe the full stream without interfering with one another. The hot
//! path (push/pop/peek/release/reserve/commit) is wait-free: every call
//! either completes in bounded time or returns [`error::Error::Full`] /
//! [`error::Error::Empty`], never blocking on a lock or a kernel call.
//!
//! # Example
//!
//! ```no_run
//! use ringshm::{OpenFlags, Queue};
//!
//! let producer = Queue::open("/example", 1024, 256, OpenFlags::CREATE | OpenFlags::PRODUCER)?;
//! producer.push(b"hello")?;
//!
//! let consumer = Queue::open("/example", 0, 0, OpenFlags::CONSUMER)?;
//! let mut buf = [0u8; 256];
//! let n = consumer.pop(&mut buf)?;
//! assert_eq!(&buf[..n], b"hello");
//! # Ok::<(), ringshm::Error>(())
//! ```
//!
//! This crate claims no cross-host portability, no multi-producer safety
//! (exactly one process pushes at a time), and no built-in message
//! persistence — only consumer-group checkpoints are durable. See
//! `SPEC_FULL.md` in the repository root for the full design.

mod checkpoint;
mod diagnostics;
mod error;
mod group;
mod invariants;
mod layout;
mod metrics;
mod peek;
mod queue;
mod reservation;
mod ring;
mod segment;

pub use checkpoint::{Checkpoint, CHECKPOINT_SIZE};
pub use diagnostics::{diagnose, recover, Diagnostic, SegmentState};
pub use error::{Error, Result};
pub use group::ConsumerGroup;
pub use layout::MAX_GROUPS;
pub use metrics::{Metrics, MetricsSnapshot};
pub use peek::Peek;
pub use queue::{OpenFlags, Queue, Stats};
pub use reservation::Reservation;
