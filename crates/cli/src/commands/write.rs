// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::path::Path;

use anyhow::{Context, Result};

use crate::image;

pub fn run(path: &Path, offset: u32, hex_data: &str, storage_size: u32, deny_erase: bool) -> Result<()> {
    let data = hex::decode(hex_data.trim()).context("Invalid --hex payload")?;
    let (mut storage, _) = image::open(path, storage_size, !deny_erase)?;

    let result = storage.update(offset, &data);
    // Recovery may already have changed flash, keep that even if the
    // update itself failed.
    image::save(path, storage.flash())?;
    result.with_context(|| format!("Failed to write {} bytes at offset {}", data.len(), offset))?;

    println!("Wrote {} bytes at offset {}", data.len(), offset);
    Ok(())
}
