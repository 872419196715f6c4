// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Boot-time recovery.
//!
//! Reads both sector headers, picks the active sector and replays its
//! records onto a zeroed image in append order. A frame that was cut off
//! before its commit word landed is the normal footprint of a power cut
//! during a write: its header still tells how long it is, so replay steps
//! over it and keeps going. Replay stops at the first erased slot, or at a
//! frame whose extent cannot be trusted; only the latter seals the sector.

use alloc::vec::Vec;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec::header::{HeaderState, FIRST_GENERATION, HEADER_SIZE};
use crate::codec::record::{decode, frame_size, Corruption, Decoded, Record, RecordKind};
use crate::error::{Error, Result};
use crate::flash::{is_blank, is_blank_from, FlashDevice, Sector};
use crate::log::LogWriter;
use crate::sector::{read_header, select_active, SectorManager, SpareState};

/// Outcome of [`crate::FlashStorage::init`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Recovery {
    /// No valid sector header: first boot. The image starts zeroed and a
    /// fresh sector has been formatted.
    Fresh,
    Restored(ReplayReport),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub sector: Sector,
    pub generation: u32,
    /// Records applied, snapshot included.
    pub records: usize,
    /// Where the next record will be appended.
    pub cursor: u32,
    /// Uncommitted frames stepped over.
    pub skipped: usize,
    /// Set when replay stopped on a damaged frame rather than erased flash.
    /// The sector is sealed in that case.
    pub truncated: Option<Corruption>,
}

/// Where a record stream ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LogEnd {
    Clean,
    Corrupt(Corruption),
}

pub struct ScanResult {
    pub records: usize,
    pub skipped: usize,
    /// Offset just past the last frame walked, good or skipped.
    pub end: u32,
    pub stop: LogEnd,
}

/// Walk the record stream of `sector`, handing every committed record to
/// `visit` together with its position. Torn frames are stepped over.
pub fn scan_sector<F, V>(
    flash: &mut F,
    sector: Sector,
    storage_size: u32,
    mut visit: V,
) -> core::result::Result<ScanResult, F::Error>
where
    F: FlashDevice,
    V: FnMut(u32, &Record),
{
    let mut cursor = HEADER_SIZE;
    let mut records = 0;
    let mut skipped = 0;
    loop {
        match decode(flash, sector, cursor, storage_size)? {
            Decoded::Record(record) => {
                visit(cursor, &record);
                records += 1;
                // decode() only returns frames that fit the sector.
                cursor += frame_size(record.length()).unwrap_or(u32::MAX);
            }
            Decoded::EndOfLog => {
                return Ok(ScanResult {
                    records,
                    skipped,
                    end: cursor,
                    stop: LogEnd::Clean,
                })
            }
            Decoded::Corrupt(c) => match c.skippable_size() {
                Some(size) => {
                    debug!(%sector, at = cursor, size, "stepping over torn frame");
                    skipped += 1;
                    cursor += size;
                }
                None => {
                    return Ok(ScanResult {
                        records,
                        skipped,
                        end: cursor,
                        stop: LogEnd::Corrupt(c),
                    })
                }
            },
        }
    }
}

/// Rebuild `image` from flash and put `manager` into the active state.
pub fn recover<F: FlashDevice>(
    flash: &mut F,
    manager: &mut SectorManager,
    image: &mut [u8],
) -> Result<Recovery, F::Error> {
    manager.reset();
    image.fill(0);

    let headers = [
        read_header(flash, Sector::First).map_err(Error::Flash)?,
        read_header(flash, Sector::Second).map_err(Error::Flash)?,
    ];
    debug!(first = ?headers[0], second = ?headers[1], "sector headers");

    let (sector, header) = match select_active(headers) {
        Some(active) => active,
        None => {
            let target = pick_format_target(flash)?;
            info!(sector = %target, "no valid sector header, starting empty");
            manager.format(flash, target, FIRST_GENERATION)?;
            return Ok(Recovery::Fresh);
        }
    };

    let storage_size = image.len() as u32;
    let scan = scan_sector(flash, sector, storage_size, |_, record| record.apply(image))
        .map_err(Error::Flash)?;

    let sector_size = flash.sector_size();
    let mut log = LogWriter::new(sector, header.generation, scan.end);
    if scan.skipped > 0 {
        warn!(%sector, skipped = scan.skipped, "dropped uncommitted records");
    }
    let truncated = match scan.stop {
        // A skipped frame was programmed front to back, so everything past
        // it must still be erased before the cursor can resume there.
        LogEnd::Clean
            if scan.skipped > 0 && !is_blank_from(flash, sector, scan.end).map_err(Error::Flash)? =>
        {
            warn!(%sector, at = scan.end, "programmed bytes behind the log end");
            log.seal(sector_size);
            Some(Corruption::Garbage)
        }
        LogEnd::Clean => None,
        LogEnd::Corrupt(c) => {
            warn!(%sector, at = scan.end, reason = ?c, "dropping unreadable tail");
            log.seal(sector_size);
            Some(c)
        }
    };

    let other = sector.other();
    manager.activate(log, SpareState::Unknown);
    manager.settle_spare(flash, other, headers[other.index()]);

    info!(
        %sector,
        generation = header.generation,
        records = scan.records,
        skipped = scan.skipped,
        cursor = log.cursor,
        "recovered"
    );

    Ok(Recovery::Restored(ReplayReport {
        sector,
        generation: header.generation,
        records: scan.records,
        cursor: log.cursor,
        skipped: scan.skipped,
        truncated,
    }))
}

/// A blank sector can be formatted without erasing; otherwise erase the
/// first one, which needs the gate.
fn pick_format_target<F: FlashDevice>(flash: &mut F) -> Result<Sector, F::Error> {
    for sector in Sector::ALL {
        if is_blank(flash, sector).map_err(Error::Flash)? {
            return Ok(sector);
        }
    }
    if flash.erase_allowed() {
        Ok(Sector::First)
    } else {
        Err(Error::EraseDenied)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FrameSummary {
    pub at: u32,
    pub kind: RecordKind,
    pub offset: u32,
    pub length: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SectorReport {
    pub sector: Sector,
    pub header: HeaderState,
    pub active: bool,
    pub frames: Vec<FrameSummary>,
    /// Torn frames stepped over.
    pub skipped: usize,
    /// Offset just past the last frame walked.
    pub end: u32,
    pub stop: LogEnd,
}

/// Read-only view of both sectors, for diagnostics.
pub fn inspect<F: FlashDevice>(
    flash: &mut F,
    storage_size: u32,
) -> core::result::Result<Vec<SectorReport>, F::Error> {
    let headers = [
        read_header(flash, Sector::First)?,
        read_header(flash, Sector::Second)?,
    ];
    let active = select_active(headers).map(|(s, _)| s);

    let mut reports = Vec::with_capacity(2);
    for sector in Sector::ALL {
        let mut frames = Vec::new();
        let scan = scan_sector(flash, sector, storage_size, |at, record| {
            frames.push(FrameSummary {
                at,
                kind: record.kind,
                offset: record.offset,
                length: record.length(),
            })
        })?;
        reports.push(SectorReport {
            sector,
            header: headers[sector.index()],
            active: active == Some(sector),
            frames,
            skipped: scan.skipped,
            end: scan.end,
            stop: scan.stop,
        });
    }
    Ok(reports)
}
