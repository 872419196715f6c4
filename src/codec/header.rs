// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Sector header.
//!
//! ```text
//! [magic: u32][generation: u32][version: u16][commit: u16]
//! ```
//!
//! The first ten bytes are programmed together, the commit word afterwards.
//! A header is only valid once its commit word reads `COMMITTED`.

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use super::{COMMITTED, COMMIT_LEN};
use crate::flash::{is_erased, ERASED_WORD};

pub const HEADER_SIZE: u32 = 12;
pub const MAGIC: u32 = 0x474C_4E46;
pub const FORMAT_VERSION: u16 = 1;

/// Generation given to the very first formatted sector.
pub const FIRST_GENERATION: u32 = 1;

const BODY_LEN: usize = HEADER_SIZE as usize - COMMIT_LEN;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SectorHeader {
    pub generation: u32,
}

/// Why a non-blank header was not accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum HeaderFault {
    /// Commit word never programmed: interrupted while writing the header.
    Torn,
    BadMagic(u32),
    BadVersion(u16),
    BadCommit(u16),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum HeaderState {
    Blank,
    Valid(SectorHeader),
    Invalid(HeaderFault),
}

impl HeaderState {
    pub fn valid(self) -> Option<SectorHeader> {
        match self {
            HeaderState::Valid(h) => Some(h),
            _ => None,
        }
    }
}

impl SectorHeader {
    pub fn new(generation: u32) -> Self {
        Self { generation }
    }

    /// Generation of the sector that replaces this one. `u32::MAX` reads
    /// back as erased flash, so it is skipped.
    pub fn next(&self) -> Self {
        let mut generation = self.generation.wrapping_add(1);
        if generation == u32::MAX {
            generation = 0;
        }
        Self { generation }
    }

    /// Serial-number comparison, so the order survives wrap-around.
    pub fn is_newer_than(&self, other: &SectorHeader) -> bool {
        (self.generation.wrapping_sub(other.generation) as i32) > 0
    }

    /// Everything except the commit word.
    pub fn body_bytes(&self) -> [u8; BODY_LEN] {
        let mut buf = [0u8; BODY_LEN];
        LittleEndian::write_u32(&mut buf[0..4], MAGIC);
        LittleEndian::write_u32(&mut buf[4..8], self.generation);
        LittleEndian::write_u16(&mut buf[8..10], FORMAT_VERSION);
        buf
    }

    pub fn commit_bytes() -> [u8; COMMIT_LEN] {
        let mut buf = [0u8; COMMIT_LEN];
        LittleEndian::write_u16(&mut buf, COMMITTED);
        buf
    }

    /// Offset of the commit word inside the sector.
    pub const fn commit_offset() -> u32 {
        BODY_LEN as u32
    }

    pub fn parse(buf: &[u8; HEADER_SIZE as usize]) -> HeaderState {
        if is_erased(buf) {
            return HeaderState::Blank;
        }

        let commit = LittleEndian::read_u16(&buf[10..12]);
        if commit == ERASED_WORD {
            return HeaderState::Invalid(HeaderFault::Torn);
        }
        if commit != COMMITTED {
            return HeaderState::Invalid(HeaderFault::BadCommit(commit));
        }

        let magic = LittleEndian::read_u32(&buf[0..4]);
        if magic != MAGIC {
            return HeaderState::Invalid(HeaderFault::BadMagic(magic));
        }

        let version = LittleEndian::read_u16(&buf[8..10]);
        if version != FORMAT_VERSION {
            return HeaderState::Invalid(HeaderFault::BadVersion(version));
        }

        let generation = LittleEndian::read_u32(&buf[4..8]);
        HeaderState::Valid(SectorHeader { generation })
    }
}
