use std::io;
use thiserror::Error;

/// Unified error taxonomy for every fallible operation in this crate.
///
/// Errors are values, never exceptions: every push/pop/reserve/commit/diagnose
/// call returns a `Result<_, Error>` rather than panicking on a bad but
/// reachable state. Panics remain reserved for caller bugs that violate a type
/// invariant the signature already promised (see individual method docs).
#[derive(Debug, Error)]
pub enum Error {
    /// No message available (pop/peek on an empty queue or group).
    #[error("queue is empty")]
    Empty,

    /// No slot available (push/reserve on a full queue).
    #[error("queue is full")]
    Full,

    /// A required allocation failed.
    #[error("allocation failed")]
    NoMem,

    /// Argument or protocol-state violation: null/zero-length name, a second
    /// `reserve` before `commit`, a `Peek` without a pending message, etc.
    #[error("invalid argument or state: {0}")]
    Invalid(&'static str),

    /// The named segment already exists. Not produced by the current API
    /// (`create` falls back to `attach` on collision) but kept in the
    /// taxonomy for parity with the wire error codes in the spec.
    #[error("segment already exists")]
    Exists,

    /// A name, consumer group, or checkpoint file could not be found.
    #[error("not found: {0}")]
    NotFound(&'static str),

    /// The message exceeds the slot payload capacity, or (on pop) the
    /// caller's buffer is smaller than the stored message. `required` carries
    /// the size the caller needed to supply.
    #[error("message too large: needs {required} bytes")]
    TooBig {
        /// Bytes required to hold the message.
        required: usize,
    },

    /// The segment's magic number, checkpoint checksum, or occupancy
    /// invariant (`head - tail <= capacity`) is violated.
    #[error("corrupted: {0}")]
    Corrupted(&'static str),

    /// The segment's protocol version does not match this build's.
    #[error("version mismatch: segment has {found:#x}, expected {expected:#x}")]
    Version {
        /// Version word read from the segment.
        found: u64,
        /// Version word compiled into this crate.
        expected: u64,
    },

    /// The OS denied access to the segment or checkpoint file.
    #[error("permission denied")]
    Permission,

    /// All 16 consumer group descriptors are claimed.
    ///
    /// Conceptually a "no room" failure, the same flavor as [`Error::NoMem`],
    /// but kept as a distinct variant because the cause is structural (every
    /// descriptor slot taken) rather than a memory allocation failure.
    #[error("no consumer group descriptors available")]
    OutOfGroups,

    /// An underlying OS call (`shm_open`, `mmap`, `ftruncate`, file I/O) failed.
    #[error("system error: {0}")]
    SysErr(#[from] io::Error),
}

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
