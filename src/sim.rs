// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! RAM-backed NOR flash simulator.
//!
//! Enforces the rules a real part would silently break on: bits may only be
//! cleared, writes are 16-bit aligned, and (in strict mode) a programmed
//! word is never programmed again with a different value before an erase.
//! A power cut can be scheduled after a number of program/erase operations
//! to exercise recovery.

use alloc::vec;
use alloc::vec::Vec;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use crate::flash::{FlashDevice, FlashError, Sector, ERASED, ERASED_WORD};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    #[error("{sector}: access at {offset} of {length} bytes outside sector of {sector_size}")]
    OutOfBounds {
        sector: Sector,
        offset: u32,
        length: usize,
        sector_size: u32,
    },
    #[error("{sector}: misaligned write at {offset} of {length} bytes")]
    Misaligned {
        sector: Sector,
        offset: u32,
        length: usize,
    },
    #[error("{sector}: write at {offset} would set cleared bits (0x{current:04x} -> 0x{requested:04x})")]
    BitSet {
        sector: Sector,
        offset: u32,
        current: u16,
        requested: u16,
    },
    #[error("{sector}: word at {offset} programmed twice (0x{current:04x} -> 0x{requested:04x})")]
    Overwrite {
        sector: Sector,
        offset: u32,
        current: u16,
        requested: u16,
    },
    #[error("power lost")]
    PowerLoss,
}

impl FlashError for SimError {
    /// Everything except a simulated power cut is a contract violation.
    fn is_fatal(&self) -> bool {
        !matches!(self, SimError::PowerLoss)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlashStats {
    pub reads: u64,
    pub writes: u64,
    pub words_programmed: u64,
    pub erases: u64,
}

#[derive(Clone, Debug)]
pub struct RamFlash {
    sectors: [Vec<u8>; 2],
    sector_size: u32,
    strict: bool,
    erase_allowed: bool,
    /// Program/erase operations left before the power cut.
    power_budget: Option<u64>,
    powered: bool,
    stats: FlashStats,
}

impl RamFlash {
    /// Two erased sectors, strict single-programming, erase allowed.
    pub fn new(sector_size: u32) -> Self {
        Self {
            sectors: [
                vec![ERASED; sector_size as usize],
                vec![ERASED; sector_size as usize],
            ],
            sector_size,
            strict: true,
            erase_allowed: true,
            power_budget: None,
            powered: true,
            stats: FlashStats::default(),
        }
    }

    /// Build from a raw dump of both sectors back to back.
    pub fn from_image(image: &[u8]) -> Option<Self> {
        if image.is_empty() || image.len() % 4 != 0 {
            return None;
        }
        let half = image.len() / 2;
        let mut flash = Self::new(half as u32);
        flash.sectors[0].copy_from_slice(&image[..half]);
        flash.sectors[1].copy_from_slice(&image[half..]);
        Some(flash)
    }

    /// Both sectors back to back.
    pub fn image(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.sectors[0].len() * 2);
        out.extend_from_slice(&self.sectors[0]);
        out.extend_from_slice(&self.sectors[1]);
        out
    }

    pub fn sector(&self, sector: Sector) -> &[u8] {
        &self.sectors[sector.index()]
    }

    pub fn set_erase_allowed(&mut self, allowed: bool) {
        self.erase_allowed = allowed;
    }

    /// Allow re-programming a word as long as no bit is set.
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Lose power after `ops` more programmed words or erases.
    pub fn cut_power_after(&mut self, ops: u64) {
        self.power_budget = Some(ops);
    }

    pub fn restore_power(&mut self) {
        self.power_budget = None;
        self.powered = true;
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn stats(&self) -> FlashStats {
        self.stats
    }

    /// Program/erase operations performed so far.
    pub fn ops(&self) -> u64 {
        self.stats.words_programmed + self.stats.erases
    }

    fn spend(&mut self) -> bool {
        if !self.powered {
            return false;
        }
        match self.power_budget.as_mut() {
            Some(0) => {
                self.powered = false;
                false
            }
            Some(left) => {
                *left -= 1;
                true
            }
            None => true,
        }
    }

    fn check_bounds(&self, sector: Sector, offset: u32, length: usize) -> Result<(), SimError> {
        let fits = (offset as usize)
            .checked_add(length)
            .map_or(false, |end| end <= self.sector_size as usize);
        if fits {
            Ok(())
        } else {
            Err(SimError::OutOfBounds {
                sector,
                offset,
                length,
                sector_size: self.sector_size,
            })
        }
    }
}

impl FlashDevice for RamFlash {
    type Error = SimError;

    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn read(&mut self, sector: Sector, offset: u32, buf: &mut [u8]) -> Result<(), SimError> {
        if !self.powered {
            return Err(SimError::PowerLoss);
        }
        self.check_bounds(sector, offset, buf.len())?;
        let start = offset as usize;
        buf.copy_from_slice(&self.sectors[sector.index()][start..start + buf.len()]);
        self.stats.reads += 1;
        Ok(())
    }

    fn write(&mut self, sector: Sector, offset: u32, data: &[u8]) -> Result<(), SimError> {
        if !self.powered {
            return Err(SimError::PowerLoss);
        }
        self.check_bounds(sector, offset, data.len())?;
        if offset % 2 != 0 || data.len() % 2 != 0 {
            return Err(SimError::Misaligned {
                sector,
                offset,
                length: data.len(),
            });
        }

        // Validate every word first so a rejected write leaves flash untouched.
        let start = offset as usize;
        let target = &self.sectors[sector.index()][start..start + data.len()];
        for (i, (new, old)) in data.chunks_exact(2).zip(target.chunks_exact(2)).enumerate() {
            let requested = LittleEndian::read_u16(new);
            let current = LittleEndian::read_u16(old);
            let at = offset + (i as u32) * 2;
            if requested & !current != 0 {
                return Err(SimError::BitSet {
                    sector,
                    offset: at,
                    current,
                    requested,
                });
            }
            if self.strict && requested != current && current != ERASED_WORD {
                return Err(SimError::Overwrite {
                    sector,
                    offset: at,
                    current,
                    requested,
                });
            }
        }

        self.stats.writes += 1;
        for (i, new) in data.chunks_exact(2).enumerate() {
            if !self.spend() {
                return Err(SimError::PowerLoss);
            }
            let at = start + i * 2;
            let word = &mut self.sectors[sector.index()][at..at + 2];
            let merged = LittleEndian::read_u16(word) & LittleEndian::read_u16(new);
            LittleEndian::write_u16(word, merged);
            self.stats.words_programmed += 1;
        }
        Ok(())
    }

    fn erase(&mut self, sector: Sector) -> Result<(), SimError> {
        let was_powered = self.powered;
        if !self.spend() {
            // An interrupted erase leaves the sector half done.
            if was_powered {
                let half = self.sector_size as usize / 2;
                self.sectors[sector.index()][..half].fill(ERASED);
            }
            return Err(SimError::PowerLoss);
        }
        self.sectors[sector.index()].fill(ERASED);
        self.stats.erases += 1;
        Ok(())
    }

    fn erase_allowed(&self) -> bool {
        self.erase_allowed
    }
}
