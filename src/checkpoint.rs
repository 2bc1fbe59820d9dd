//! Consumer-position checkpointing: persist a group's tail to a small fixed
//! file and resume from it after a restart.
//!
//! Grounded on `original_source/src/persistence.c`'s `nabd_checkpoint_save`/
//! `_load`/`compute_checksum`/`nabd_consumer_resume`.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::group::{ConsumerGroup, MultiConsumerRegion};
use crate::layout::CHECKPOINT_MAGIC;
use crate::ring::RingView;

/// Fixed 40-byte on-disk record.
pub const CHECKPOINT_SIZE: usize = 40;

/// A consumer group's persisted tail position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub timestamp_ns: u64,
    pub group_id: u32,
    pub tail: u64,
}

impl Checkpoint {
    fn checksum(&self) -> u64 {
        let sum = CHECKPOINT_MAGIC ^ self.timestamp_ns ^ u64::from(self.group_id) ^ self.tail;
        sum.rotate_left(13)
    }

    fn to_bytes(self) -> [u8; CHECKPOINT_SIZE] {
        let mut out = [0u8; CHECKPOINT_SIZE];
        out[0..8].copy_from_slice(&CHECKPOINT_MAGIC.to_ne_bytes());
        out[8..16].copy_from_slice(&self.timestamp_ns.to_ne_bytes());
        out[16..20].copy_from_slice(&self.group_id.to_ne_bytes());
        // out[20..24] is the 4-byte padding field, left zero.
        out[24..32].copy_from_slice(&self.tail.to_ne_bytes());
        out[32..40].copy_from_slice(&self.checksum().to_ne_bytes());
        out
    }

    fn from_bytes(bytes: &[u8; CHECKPOINT_SIZE]) -> Result<Self> {
        let magic = u64::from_ne_bytes(bytes[0..8].try_into().unwrap());
        if magic != CHECKPOINT_MAGIC {
            return Err(Error::Corrupted("checkpoint magic mismatch"));
        }
        let timestamp_ns = u64::from_ne_bytes(bytes[8..16].try_into().unwrap());
        let group_id = u32::from_ne_bytes(bytes[16..20].try_into().unwrap());
        let tail = u64::from_ne_bytes(bytes[24..32].try_into().unwrap());
        let checksum = u64::from_ne_bytes(bytes[32..40].try_into().unwrap());

        let ckpt = Checkpoint { timestamp_ns, group_id, tail };
        if ckpt.checksum() != checksum {
            return Err(Error::Corrupted("checkpoint checksum mismatch"));
        }
        Ok(ckpt)
    }

    /// Builds a checkpoint for `group` stamped with the current wall-clock
    /// time.
    pub fn capture(group: &ConsumerGroup<'_>) -> Self {
        let timestamp_ns = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0);
        Self { timestamp_ns, group_id: group.group_id(), tail: group.current_tail() }
    }

    /// Writes the 40-byte record to `path`, overwriting any existing file.
    pub fn save(self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.to_bytes();
        let mut file = fs::File::create(path).map_err(Error::SysErr)?;
        file.write_all(&bytes).map_err(Error::SysErr)?;
        Ok(())
    }

    /// Reads and validates a checkpoint written by [`Checkpoint::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = fs::File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound("checkpoint file not found")
            } else {
                Error::SysErr(e)
            }
        })?;
        let mut bytes = [0u8; CHECKPOINT_SIZE];
        file.read_exact(&mut bytes).map_err(|_| Error::Corrupted("checkpoint file truncated"))?;
        Self::from_bytes(&bytes)
    }

    /// Resumes consumption from this checkpoint: creates the group with the
    /// checkpointed id (falling back to joining it if already claimed by a
    /// previous run that never closed), then clamps the group's tail to
    /// `min(self.tail, current head)` — a checkpoint ahead of head means the
    /// segment was recreated smaller, and we rewind to head rather than
    /// desynchronize past what has actually been published.
    pub fn resume<'a>(
        self,
        ring: &'a RingView,
        region: &'a MultiConsumerRegion,
    ) -> Result<ConsumerGroup<'a>> {
        let group = match ConsumerGroup::create(ring, region, self.group_id) {
            Ok(g) => g,
            Err(Error::OutOfGroups) => ConsumerGroup::join(ring, region, self.group_id)?,
            Err(e) => return Err(e),
        };
        let clamped = self.tail.min(ring.head());
        group.set_tail(clamped);
        Ok(group)
    }
}
