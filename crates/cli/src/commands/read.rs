// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::path::Path;

use anyhow::{bail, Result};

use crate::image;

const LINE: usize = 16;

/// Recover the image and return `length` bytes at `offset`. The file is
/// never written back.
pub fn read_range(path: &Path, offset: u32, length: u32, storage_size: u32) -> Result<Vec<u8>> {
    let end = offset.checked_add(length).filter(|&end| end <= storage_size);
    let Some(end) = end else {
        bail!("range {offset}+{length} exceeds storage size {storage_size}");
    };
    let (storage, _) = image::open(path, storage_size, true)?;
    Ok(storage.buffer()[offset as usize..end as usize].to_vec())
}

pub fn run(path: &Path, offset: u32, length: u32, storage_size: u32) -> Result<()> {
    let bytes = read_range(path, offset, length, storage_size)?;
    for (i, chunk) in bytes.chunks(LINE).enumerate() {
        println!("{:08x}  {}", offset as usize + i * LINE, hex::encode(chunk));
    }
    Ok(())
}
