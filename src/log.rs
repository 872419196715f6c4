// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Append-only record log inside the active sector.
//!
//! Every flash location of a sector is programmed at most once between
//! erasures. A frame goes out as two writes to disjoint locations: the body
//! first, then the commit word. The cursor only moves forward.

use serde::Serialize;
use tracing::{debug, warn};

use crate::codec::record::{self, RecordKind};
use crate::codec::COMMIT_LEN;
use crate::error::{Error, Result};
use crate::flash::{FlashDevice, Sector};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Append {
    /// Frame committed at `at`, cursor advanced by `frame_size`.
    Written { at: u32, frame_size: u32 },
    /// Not enough room left; nothing was written.
    SectorFull { needed: u32, available: u32 },
}

/// Write position in the active sector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LogWriter {
    pub sector: Sector,
    pub generation: u32,
    pub cursor: u32,
}

impl LogWriter {
    pub fn new(sector: Sector, generation: u32, cursor: u32) -> Self {
        Self {
            sector,
            generation,
            cursor,
        }
    }

    pub fn remaining(&self, sector_size: u32) -> u32 {
        sector_size.saturating_sub(self.cursor)
    }

    pub fn is_sealed(&self, sector_size: u32) -> bool {
        self.cursor >= sector_size
    }

    /// Give up on the rest of the sector. Used when a frame may have been
    /// partially programmed: those bytes can never be written again, so the
    /// next append has to go through compaction.
    pub fn seal(&mut self, sector_size: u32) {
        if self.cursor < sector_size {
            warn!(sector = %self.sector, cursor = self.cursor, "sealing sector");
            self.cursor = sector_size;
        }
    }

    /// Encode and append one record.
    pub fn append<F: FlashDevice>(
        &mut self,
        flash: &mut F,
        kind: RecordKind,
        offset: u32,
        payload: &[u8],
    ) -> Result<Append, F::Error> {
        let frame = record::encode(kind, offset, payload)?;
        let sector_size = flash.sector_size();
        let needed = frame.len() as u32;
        let available = self.remaining(sector_size);
        if needed > available {
            return Ok(Append::SectorFull { needed, available });
        }

        let at = self.cursor;
        let (body, commit) = frame.split_at(frame.len() - COMMIT_LEN);

        // 1. Body (header, payload, crc)
        if let Err(e) = flash.write(self.sector, at, body) {
            self.seal(sector_size);
            return Err(Error::Flash(e));
        }

        // 2. Commit word
        if let Err(e) = flash.write(self.sector, at + body.len() as u32, commit) {
            self.seal(sector_size);
            return Err(Error::Flash(e));
        }

        self.cursor = at + needed;
        debug!(
            sector = %self.sector,
            at,
            offset,
            length = payload.len(),
            "record appended"
        );
        Ok(Append::Written {
            at,
            frame_size: needed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::header::HEADER_SIZE;
    use crate::codec::record::{decode, Decoded, FRAME_OVERHEAD};
    use crate::sim::{RamFlash, SimError};

    #[test]
    fn test_append_advances_cursor() {
        let mut flash = RamFlash::new(256);
        let mut log = LogWriter::new(Sector::First, 1, HEADER_SIZE);

        let first = log.append(&mut flash, RecordKind::Update, 0, &[1, 2]).unwrap();
        assert_eq!(
            first,
            Append::Written {
                at: HEADER_SIZE,
                frame_size: 2 + FRAME_OVERHEAD
            }
        );
        log.append(&mut flash, RecordKind::Update, 2, &[3, 4]).unwrap();
        assert_eq!(log.cursor, HEADER_SIZE + 2 * (2 + FRAME_OVERHEAD));

        match decode(&mut flash, Sector::First, HEADER_SIZE, 64).unwrap() {
            Decoded::Record(r) => assert_eq!(r.payload, vec![1, 2]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_full_sector_writes_nothing() {
        let mut flash = RamFlash::new(64);
        let mut log = LogWriter::new(Sector::First, 1, 40);
        let before = flash.ops();

        let res = log.append(&mut flash, RecordKind::Update, 0, &[0u8; 10]).unwrap();
        assert_eq!(
            res,
            Append::SectorFull {
                needed: 10 + FRAME_OVERHEAD,
                available: 24
            }
        );
        assert_eq!(log.cursor, 40);
        assert_eq!(flash.ops(), before);
    }

    #[test]
    fn test_failed_write_seals() {
        let mut flash = RamFlash::new(256);
        let mut log = LogWriter::new(Sector::First, 1, HEADER_SIZE);
        flash.cut_power_after(3);

        let err = log.append(&mut flash, RecordKind::Update, 0, &[1, 2, 3, 4]).unwrap_err();
        assert!(matches!(err, Error::Flash(SimError::PowerLoss)));
        assert!(log.is_sealed(256));
    }

    #[test]
    fn test_programmed_slot_is_fatal() {
        let mut flash = RamFlash::new(256);
        flash.write(Sector::First, HEADER_SIZE, &[0x12, 0x34]).unwrap();
        let mut log = LogWriter::new(Sector::First, 1, HEADER_SIZE);

        let err = log.append(&mut flash, RecordKind::Update, 0, &[1, 2]).unwrap_err();
        assert!(matches!(err, Error::Flash(SimError::BitSet { .. } | SimError::Overwrite { .. })));
        assert!(err.is_fatal());
        assert!(log.is_sealed(256));
    }

    #[test]
    fn test_misaligned_append_rejected() {
        let mut flash = RamFlash::new(256);
        let mut log = LogWriter::new(Sector::First, 1, HEADER_SIZE);
        let err = log.append(&mut flash, RecordKind::Update, 1, &[1, 2]).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(log.cursor, HEADER_SIZE);
    }
}
