// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Sector roles and compaction.
//!
//! Which sector is active is persisted in the sector headers, and the
//! in-memory [`EngineState`] is only ever derived from them, so live
//! operation and recovery agree on one source of truth.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec::header::{HeaderState, SectorHeader, HEADER_SIZE};
use crate::codec::record::{frame_size, RecordKind};
use crate::error::{Error, Result};
use crate::flash::{is_blank, FlashDevice, Sector};
use crate::log::{Append, LogWriter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum EngineState {
    Uninitialized,
    Active(LogWriter),
    /// Only observable from inside a compaction.
    Compacting { from: Sector, to: Sector },
}

/// What is known about the spare sector's contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpareState {
    Erased,
    /// May hold a stale header or a half-written snapshot.
    Unknown,
}

pub fn read_header<F: FlashDevice>(flash: &mut F, sector: Sector) -> core::result::Result<HeaderState, F::Error> {
    let mut buf = [0u8; HEADER_SIZE as usize];
    flash.read(sector, 0, &mut buf)?;
    Ok(SectorHeader::parse(&buf))
}

/// Body first, commit word last.
pub fn write_header<F: FlashDevice>(
    flash: &mut F,
    sector: Sector,
    header: SectorHeader,
) -> core::result::Result<(), F::Error> {
    flash.write(sector, 0, &header.body_bytes())?;
    flash.write(sector, SectorHeader::commit_offset(), &SectorHeader::commit_bytes())
}

/// Pick the active sector from both headers.
///
/// Only valid headers count. When both are valid, an interrupted compaction
/// left the old sector behind: the newer generation wins, since a header is
/// only committed after the snapshot it fronts. Equal generations are never
/// produced by the engine; `Sector::First` wins them.
pub fn select_active(headers: [HeaderState; 2]) -> Option<(Sector, SectorHeader)> {
    match (headers[0].valid(), headers[1].valid()) {
        (Some(first), Some(second)) => {
            if second.is_newer_than(&first) {
                Some((Sector::Second, second))
            } else {
                Some((Sector::First, first))
            }
        }
        (Some(first), None) => Some((Sector::First, first)),
        (None, Some(second)) => Some((Sector::Second, second)),
        (None, None) => None,
    }
}

#[derive(Debug)]
pub struct SectorManager {
    state: EngineState,
    spare: SpareState,
}

impl Default for SectorManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SectorManager {
    pub fn new() -> Self {
        Self {
            state: EngineState::Uninitialized,
            spare: SpareState::Unknown,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn spare(&self) -> SpareState {
        self.spare
    }

    pub fn active_mut(&mut self) -> Option<&mut LogWriter> {
        match &mut self.state {
            EngineState::Active(log) => Some(log),
            _ => None,
        }
    }

    pub fn activate(&mut self, log: LogWriter, spare: SpareState) {
        self.state = EngineState::Active(log);
        self.spare = spare;
    }

    pub fn reset(&mut self) {
        self.state = EngineState::Uninitialized;
        self.spare = SpareState::Unknown;
    }

    /// Start a fresh log in `sector`, erasing it first if it is not blank.
    pub fn format<F: FlashDevice>(
        &mut self,
        flash: &mut F,
        sector: Sector,
        generation: u32,
    ) -> Result<LogWriter, F::Error> {
        if !is_blank(flash, sector).map_err(Error::Flash)? {
            if !flash.erase_allowed() {
                return Err(Error::EraseDenied);
            }
            debug!(%sector, "erasing before format");
            flash.erase(sector).map_err(Error::Flash)?;
        }

        write_header(flash, sector, SectorHeader::new(generation)).map_err(Error::Flash)?;
        info!(%sector, generation, "formatted sector");

        let log = LogWriter::new(sector, generation, HEADER_SIZE);
        self.activate(log, SpareState::Unknown);
        Ok(log)
    }

    /// Erase the spare if it may hold anything.
    fn prepare_spare<F: FlashDevice>(&mut self, flash: &mut F, sector: Sector) -> Result<(), F::Error> {
        if self.spare == SpareState::Erased {
            return Ok(());
        }
        if !is_blank(flash, sector).map_err(Error::Flash)? {
            debug!(%sector, "erasing dirty spare");
            flash.erase(sector).map_err(Error::Flash)?;
        }
        self.spare = SpareState::Erased;
        Ok(())
    }

    /// Drop a stale sector left behind by an interrupted compaction, if the
    /// erase gate allows it now.
    pub fn settle_spare<F: FlashDevice>(&mut self, flash: &mut F, sector: Sector, header: HeaderState) {
        if header == HeaderState::Blank || !flash.erase_allowed() {
            self.spare = SpareState::Unknown;
            return;
        }
        match flash.erase(sector) {
            Ok(()) => {
                info!(%sector, "erased stale sector");
                self.spare = SpareState::Erased;
            }
            Err(e) => {
                warn!(%sector, error = %e, "failed to erase stale sector");
                self.spare = SpareState::Unknown;
            }
        }
    }

    /// Move the whole image into the spare sector and retire the active one.
    ///
    /// 1. write the snapshot record into the spare
    /// 2. commit the spare's header with the next generation
    /// 3. erase the old sector, which is then the spare
    ///
    /// Power may fail between any two steps: until step 2 completes the old
    /// sector is still the newest valid one, afterwards the new one is.
    pub fn compact<F: FlashDevice>(&mut self, flash: &mut F, image: &[u8]) -> Result<(), F::Error> {
        let active = match self.state {
            EngineState::Active(log) => log,
            _ => return Err(Error::Uninitialized),
        };

        let sector_size = flash.sector_size();
        let needed = frame_size(image.len() as u32)
            .and_then(|frame| frame.checked_add(HEADER_SIZE))
            .unwrap_or(u32::MAX);
        if needed > sector_size {
            warn!(needed, sector_size, "snapshot does not fit a sector");
            return Err(Error::SnapshotTooLarge {
                needed,
                available: sector_size,
            });
        }
        if !flash.erase_allowed() {
            debug!(sector = %active.sector, "erase not allowed, compaction deferred");
            return Err(Error::CompactionDeferred);
        }

        let from = active.sector;
        let to = from.other();
        let header = SectorHeader::new(active.generation).next();
        self.state = EngineState::Compacting { from, to };
        debug!(%from, %to, generation = header.generation, "compacting");

        if let Err(e) = self.prepare_spare(flash, to) {
            self.state = EngineState::Active(active);
            return Err(e);
        }

        // 1. Snapshot
        let mut next = LogWriter::new(to, header.generation, HEADER_SIZE);
        self.spare = SpareState::Unknown;
        match next.append(flash, RecordKind::Snapshot, 0, image) {
            Ok(Append::Written { .. }) => {}
            Ok(Append::SectorFull { needed, available }) => {
                self.state = EngineState::Active(active);
                return Err(Error::SnapshotTooLarge { needed, available });
            }
            Err(e) => {
                self.state = EngineState::Active(active);
                return Err(e);
            }
        }

        // 2. Header
        if let Err(e) = write_header(flash, to, header) {
            self.state = EngineState::Active(active);
            return Err(Error::Flash(e));
        }
        self.state = EngineState::Active(next);

        // 3. Retire the old sector. The data is already safe in `to`.
        match flash.erase(from) {
            Ok(()) => self.spare = SpareState::Erased,
            Err(e) => warn!(sector = %from, error = %e, "failed to erase retired sector"),
        }

        info!(sector = %to, generation = header.generation, cursor = next.cursor, "compaction complete");
        Ok(())
    }
}
