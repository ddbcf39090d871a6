//! State carried across suspend cycles.
//!
//! The retention region survives low-power suspend and is cleared on cold
//! boot or power loss. That is a property of the hardware; nothing here can
//! detect a stale region beyond the magic and checksum below, so a blank or
//! unreadable record simply means "no prior state".
//!
//! Record layout, little-endian, [`RETAINED_BLOB_LEN`] bytes:
//!
//! ```text
//!   0  magic "IRS1"          4
//!   4  first_sync_epoch i64  8
//!  12  last_wake_epoch i64   8
//!  20  sleep_duration u32    4
//!  24  last_applied u16      2   0xFFFF = none
//!  26  flags u8              1   bit0 = clock synced
//!  27  reserved              1
//!  28  cache length u16      2
//!  30  cache bytes         300
//! 330  sha256[..8]           8
//! ```

use sha2::{Digest, Sha256};

use crate::error::RetentionError;

pub const SCHEDULE_CACHE_CAPACITY: usize = 300;
pub const RETAINED_BLOB_LEN: usize = CHECKSUM_OFFSET + CHECKSUM_LEN;

const MAGIC: [u8; 4] = *b"IRS1";
const NO_INDEX: u16 = u16::MAX;
const FLAG_CLOCK_SYNCED: u8 = 0b0000_0001;

const FIRST_SYNC_OFFSET: usize = 4;
const LAST_WAKE_OFFSET: usize = 12;
const SLEEP_OFFSET: usize = 20;
const INDEX_OFFSET: usize = 24;
const FLAGS_OFFSET: usize = 26;
const CACHE_LEN_OFFSET: usize = 28;
const CACHE_OFFSET: usize = 30;
const CHECKSUM_OFFSET: usize = CACHE_OFFSET + SCHEDULE_CACHE_CAPACITY;
const CHECKSUM_LEN: usize = 8;

pub type RetainedBlob = [u8; RETAINED_BLOB_LEN];

/// Byte transport for the retention region. Implementations must not
/// interpret the contents.
pub trait RetentionStore {
    /// Current region contents; all zeroes after a cold boot.
    fn load(&mut self) -> RetainedBlob;

    fn save(&mut self, blob: &RetainedBlob) -> Result<(), RetentionError>;
}

/// Raw schedule document bytes, bounded by the retention region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleCache(Vec<u8>);

impl ScheduleCache {
    pub fn new(document: &[u8]) -> Result<Self, RetentionError> {
        if document.len() > SCHEDULE_CACHE_CAPACITY {
            return Err(RetentionError::CacheOverflow {
                len: document.len(),
                capacity: SCHEDULE_CACHE_CAPACITY,
            });
        }
        Ok(Self(document.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistentState {
    pub first_sync_epoch: i64,
    pub last_wake_epoch: i64,
    pub sleep_duration_secs: u32,
    pub last_applied_index: Option<u16>,
    pub clock_synced: bool,
    pub schedule_cache: ScheduleCache,
}

impl PersistentState {
    pub fn encode(&self) -> RetainedBlob {
        let mut blob = [0_u8; RETAINED_BLOB_LEN];
        let cache = self.schedule_cache.as_bytes();

        blob[..FIRST_SYNC_OFFSET].copy_from_slice(&MAGIC);
        blob[FIRST_SYNC_OFFSET..LAST_WAKE_OFFSET]
            .copy_from_slice(&self.first_sync_epoch.to_le_bytes());
        blob[LAST_WAKE_OFFSET..SLEEP_OFFSET].copy_from_slice(&self.last_wake_epoch.to_le_bytes());
        blob[SLEEP_OFFSET..INDEX_OFFSET].copy_from_slice(&self.sleep_duration_secs.to_le_bytes());
        blob[INDEX_OFFSET..FLAGS_OFFSET].copy_from_slice(
            &self
                .last_applied_index
                .unwrap_or(NO_INDEX)
                .to_le_bytes(),
        );
        blob[FLAGS_OFFSET] = if self.clock_synced {
            FLAG_CLOCK_SYNCED
        } else {
            0
        };
        blob[CACHE_LEN_OFFSET..CACHE_OFFSET].copy_from_slice(&(cache.len() as u16).to_le_bytes());
        blob[CACHE_OFFSET..CACHE_OFFSET + cache.len()].copy_from_slice(cache);

        let digest = checksum(&blob[..CHECKSUM_OFFSET]);
        blob[CHECKSUM_OFFSET..].copy_from_slice(&digest);
        blob
    }

    pub fn decode(blob: &RetainedBlob) -> Result<Self, RetentionError> {
        if blob.iter().all(|byte| *byte == 0) {
            return Err(RetentionError::Blank);
        }

        let magic = read_array::<4>(blob, 0);
        if magic != MAGIC {
            return Err(RetentionError::BadMagic(magic));
        }

        if checksum(&blob[..CHECKSUM_OFFSET]) != blob[CHECKSUM_OFFSET..] {
            return Err(RetentionError::Corrupt);
        }

        let cache_len = u16::from_le_bytes(read_array(blob, CACHE_LEN_OFFSET)) as usize;
        if cache_len > SCHEDULE_CACHE_CAPACITY {
            return Err(RetentionError::CacheOverflow {
                len: cache_len,
                capacity: SCHEDULE_CACHE_CAPACITY,
            });
        }

        let index = u16::from_le_bytes(read_array(blob, INDEX_OFFSET));

        Ok(Self {
            first_sync_epoch: i64::from_le_bytes(read_array(blob, FIRST_SYNC_OFFSET)),
            last_wake_epoch: i64::from_le_bytes(read_array(blob, LAST_WAKE_OFFSET)),
            sleep_duration_secs: u32::from_le_bytes(read_array(blob, SLEEP_OFFSET)),
            last_applied_index: (index != NO_INDEX).then_some(index),
            clock_synced: blob[FLAGS_OFFSET] & FLAG_CLOCK_SYNCED != 0,
            schedule_cache: ScheduleCache(blob[CACHE_OFFSET..CACHE_OFFSET + cache_len].to_vec()),
        })
    }
}

fn read_array<const N: usize>(blob: &RetainedBlob, offset: usize) -> [u8; N] {
    let mut out = [0_u8; N];
    out.copy_from_slice(&blob[offset..offset + N]);
    out
}

fn checksum(bytes: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(bytes);
    let mut out = [0_u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[..CHECKSUM_LEN]);
    out
}

/// Retention region held in process memory.
#[derive(Debug, Clone)]
pub struct MemoryRetention {
    blob: RetainedBlob,
    writes: usize,
}

impl MemoryRetention {
    pub fn new() -> Self {
        Self {
            blob: [0; RETAINED_BLOB_LEN],
            writes: 0,
        }
    }

    pub fn with_state(state: &PersistentState) -> Self {
        Self {
            blob: state.encode(),
            writes: 0,
        }
    }

    /// Number of `save` calls so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn blob(&self) -> &RetainedBlob {
        &self.blob
    }

    /// Clears the region the way a power loss would.
    pub fn power_loss(&mut self) {
        self.blob = [0; RETAINED_BLOB_LEN];
    }
}

impl Default for MemoryRetention {
    fn default() -> Self {
        Self::new()
    }
}

impl RetentionStore for MemoryRetention {
    fn load(&mut self) -> RetainedBlob {
        self.blob
    }

    fn save(&mut self, blob: &RetainedBlob) -> Result<(), RetentionError> {
        self.blob = *blob;
        self.writes += 1;
        Ok(())
    }
}
