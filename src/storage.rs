// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! The storage engine.

use alloc::vec;
use alloc::vec::Vec;

use tracing::debug;

use crate::codec::record::RecordKind;
use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::flash::FlashDevice;
use crate::log::Append;
use crate::replay::{self, Recovery};
use crate::sector::{EngineState, SectorManager};

/// A fixed-size byte image persisted on two NOR flash sectors.
///
/// The caller edits the image through [`buffer_mut`](Self::buffer_mut) and
/// then calls [`write`](Self::write) for the touched range, or does both at
/// once with [`update`](Self::update). All calls must be serialized by the
/// caller; the engine takes `&mut self` and holds no locks.
pub struct FlashStorage<F: FlashDevice> {
    flash: F,
    config: StorageConfig,
    image: Vec<u8>,
    sectors: SectorManager,
}

impl<F: FlashDevice> FlashStorage<F> {
    pub fn new(flash: F, config: StorageConfig) -> Result<Self, F::Error> {
        config.validate().map_err(Error::InvalidConfig)?;
        if flash.sector_size() != config.sector_size {
            return Err(Error::InvalidConfig("sector size does not match the flash device"));
        }
        Ok(Self {
            flash,
            config,
            image: vec![0; config.storage_size as usize],
            sectors: SectorManager::new(),
        })
    }

    /// Rebuild the image from flash. Safe to call again at any time; any
    /// update that was not durably written is discarded.
    pub fn init(&mut self) -> Result<Recovery, F::Error> {
        replay::recover(&mut self.flash, &mut self.sectors, &mut self.image)
    }

    /// Persist that image bytes `[offset, offset + length)` are current.
    ///
    /// On a transient error (see [`Error::is_transient`]) the image keeps
    /// the new bytes but flash lags behind until a later write succeeds.
    pub fn write(&mut self, offset: u32, length: u32) -> Result<(), F::Error> {
        let size = self.config.storage_size;
        let end = offset
            .checked_add(length)
            .filter(|&end| end <= size)
            .ok_or(Error::OutOfRange {
                offset,
                length,
                size,
            })?;
        if length == 0 {
            return Ok(());
        }

        let log = self.sectors.active_mut().ok_or(Error::Uninitialized)?;

        // Widen to whole 16-bit words; storage_size is even.
        let start = offset & !1;
        let end = (end + 1) & !1;
        let payload = &self.image[start as usize..end as usize];

        match log.append(&mut self.flash, RecordKind::Update, start, payload)? {
            Append::Written { .. } => Ok(()),
            Append::SectorFull { needed, available } => {
                debug!(needed, available, "sector full");
                // The image already carries this update, so the snapshot
                // persists it.
                self.sectors.compact(&mut self.flash, &self.image)
            }
        }
    }

    /// Copy `data` into the image at `offset` and persist it.
    pub fn update(&mut self, offset: u32, data: &[u8]) -> Result<(), F::Error> {
        let size = self.config.storage_size;
        let length = u32::try_from(data.len()).unwrap_or(u32::MAX);
        let in_range = offset.checked_add(length).map_or(false, |end| end <= size);
        if !in_range {
            return Err(Error::OutOfRange {
                offset,
                length,
                size,
            });
        }
        let start = offset as usize;
        self.image[start..start + data.len()].copy_from_slice(data);
        self.write(offset, length)
    }

    pub fn buffer(&self) -> &[u8] {
        &self.image
    }

    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.image
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.sectors.state()
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    pub fn into_inner(self) -> F {
        self.flash
    }
}
