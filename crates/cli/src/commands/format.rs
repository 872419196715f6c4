// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::path::Path;

use anyhow::{anyhow, Result};
use flashlog::sim::RamFlash;
use flashlog::StorageConfig;
use tracing::warn;

use crate::image;

/// Create an erased two-sector image.
pub fn run(path: &Path, sector_size: u32, storage_size: u32) -> Result<()> {
    let config = StorageConfig::new(storage_size, sector_size);
    config
        .validate()
        .map_err(|e| anyhow!("invalid configuration: {e}"))?;
    if config.snapshot_end().is_none() {
        warn!(storage_size, sector_size, "image does not fit a sector, compaction will fail");
    }

    image::save(path, &RamFlash::new(sector_size))?;
    println!("Created {} (2 sectors of {} bytes, erased)", path.display(), sector_size);
    Ok(())
}
