// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Storage geometry.

use serde::{Deserialize, Serialize};

use crate::codec::header::HEADER_SIZE;
use crate::codec::record::{frame_size, FRAME_OVERHEAD};

/// Default logical image size (16 KiB).
pub const DEFAULT_STORAGE_SIZE: u32 = 16 * 1024;

/// Default flash sector size (32 KiB).
pub const DEFAULT_SECTOR_SIZE: u32 = 32 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Size of the logical image presented to callers.
    pub storage_size: u32,
    /// Size of each of the two flash sectors.
    pub sector_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_size: DEFAULT_STORAGE_SIZE,
            sector_size: DEFAULT_SECTOR_SIZE,
        }
    }
}

impl StorageConfig {
    pub fn new(storage_size: u32, sector_size: u32) -> Self {
        Self {
            storage_size,
            sector_size,
        }
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.storage_size == 0 || self.storage_size % 2 != 0 {
            return Err("storage size must be non-zero and even");
        }
        if self.sector_size % 2 != 0 {
            return Err("sector size must be even");
        }
        // Header plus one two-byte update record.
        if self.sector_size < HEADER_SIZE + FRAME_OVERHEAD + 2 {
            return Err("sector too small for a header and one record");
        }
        if frame_size(self.storage_size).is_none() {
            return Err("storage size too large to frame");
        }
        Ok(())
    }

    /// Cursor position right after a compaction snapshot, if the snapshot
    /// fits in a sector at all.
    pub fn snapshot_end(&self) -> Option<u32> {
        frame_size(self.storage_size)
            .and_then(|frame| frame.checked_add(HEADER_SIZE))
            .filter(|&end| end <= self.sector_size)
    }
}
