// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Flash image files: both sectors dumped back to back.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use flashlog::sim::RamFlash;
use flashlog::{FlashDevice, FlashStorage, Recovery, StorageConfig};
use tracing::{debug, info};

pub fn load(path: &Path) -> Result<RamFlash> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read image {}", path.display()))?;
    RamFlash::from_image(&bytes).ok_or_else(|| {
        anyhow!(
            "{}: not a two-sector flash image ({} bytes)",
            path.display(),
            bytes.len()
        )
    })
}

pub fn save(path: &Path, flash: &RamFlash) -> Result<()> {
    fs::write(path, flash.image()).with_context(|| format!("Failed to write image {}", path.display()))
}

/// Load an image and run recovery on it.
pub fn open(path: &Path, storage_size: u32, erase_allowed: bool) -> Result<(FlashStorage<RamFlash>, Recovery)> {
    let mut flash = load(path)?;
    flash.set_erase_allowed(erase_allowed);
    debug!(path = %path.display(), sector_size = flash.sector_size(), "loaded image");

    let config = StorageConfig::new(storage_size, flash.sector_size());
    let mut storage = FlashStorage::new(flash, config).context("Failed to open storage")?;
    let recovery = storage.init().context("Recovery failed")?;
    match &recovery {
        Recovery::Fresh => info!("image holds no log yet, formatted"),
        Recovery::Restored(report) => info!(
            sector = %report.sector,
            generation = report.generation,
            records = report.records,
            "image recovered"
        ),
    }
    Ok((storage, recovery))
}
