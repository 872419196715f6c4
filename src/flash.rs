// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Flash device interface.
//!
//! NOR flash programming can only clear bits (1 -> 0). Only an erase sets
//! a whole sector back to `0xFF`. The engine relies on this: every field it
//! writes starts erased and is programmed exactly once per sector lifetime.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Value of an erased flash byte.
pub const ERASED: u8 = 0xFF;

/// Value of an erased 16-bit flash word.
pub const ERASED_WORD: u16 = 0xFFFF;

/// Chunk size used when scanning a sector for blankness.
const BLANK_CHECK_CHUNK: usize = 256;

/// One of the two sectors backing the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sector {
    First,
    Second,
}

impl Sector {
    pub const ALL: [Sector; 2] = [Sector::First, Sector::Second];

    pub fn index(self) -> usize {
        match self {
            Sector::First => 0,
            Sector::Second => 1,
        }
    }

    /// The sibling sector.
    pub fn other(self) -> Sector {
        match self {
            Sector::First => Sector::Second,
            Sector::Second => Sector::First,
        }
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sector {}", self.index())
    }
}

/// Error reported by a [`FlashDevice`].
pub trait FlashError: fmt::Debug + fmt::Display {
    /// The request itself broke the flash rules (bounds, alignment, bits
    /// that cannot be set again). Retrying the same operation cannot
    /// succeed. A power cut or a transient bus fault is not fatal.
    fn is_fatal(&self) -> bool;
}

/// Raw access to a two-sector NOR flash region.
///
/// Implementations are expected to reject (not silently apply) reads or
/// writes outside a sector, writes that are not 16-bit aligned, and writes
/// that would need to set a bit that is currently cleared.
pub trait FlashDevice {
    type Error: FlashError;

    /// Bytes per sector.
    fn sector_size(&self) -> u32;

    fn read(&mut self, sector: Sector, offset: u32, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Program `data` at `offset`. Offset and length must both be even.
    fn write(&mut self, sector: Sector, offset: u32, data: &[u8]) -> Result<(), Self::Error>;

    /// Reset the whole sector to `0xFF`.
    fn erase(&mut self, sector: Sector) -> Result<(), Self::Error>;

    /// Erase gate. Erasing is slow and the host may forbid it during some
    /// operational phases; compaction is deferred while this is `false`.
    fn erase_allowed(&self) -> bool;
}

pub fn is_erased(buf: &[u8]) -> bool {
    buf.iter().all(|&b| b == ERASED)
}

/// Scans `sector` from `from` to its end and reports whether every byte is
/// still erased.
pub fn is_blank_from<F: FlashDevice>(flash: &mut F, sector: Sector, from: u32) -> Result<bool, F::Error> {
    let end = flash.sector_size();
    let mut buf = [0u8; BLANK_CHECK_CHUNK];
    let mut pos = from;
    while pos < end {
        let n = ((end - pos) as usize).min(BLANK_CHECK_CHUNK);
        flash.read(sector, pos, &mut buf[..n])?;
        if !is_erased(&buf[..n]) {
            return Ok(false);
        }
        pos += n as u32;
    }
    Ok(true)
}

pub fn is_blank<F: FlashDevice>(flash: &mut F, sector: Sector) -> Result<bool, F::Error> {
    is_blank_from(flash, sector, 0)
}
