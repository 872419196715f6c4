// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Record frames.
//!
//! ```text
//! [kind: u16][offset: u32][length: u32][payload; length][crc: u32][commit: u16]
//! ```
//!
//! The CRC-32 covers kind, offset, length and payload. Everything up to and
//! including the CRC is programmed in one write; the commit word follows in
//! a second write to a disjoint location. A frame whose commit word is still
//! erased was interrupted and never counts.

use alloc::vec;
use alloc::vec::Vec;

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher;
use serde::Serialize;

use super::{COMMITTED, COMMIT_LEN};
use crate::error::FrameError;
use crate::flash::{is_erased, FlashDevice, Sector, ERASED_WORD};

/// kind + offset + length.
pub const FRAME_HEADER_LEN: u32 = 10;

/// crc + commit.
const TRAILER_LEN: u32 = 6;

/// Bytes a frame adds on top of its payload.
pub const FRAME_OVERHEAD: u32 = FRAME_HEADER_LEN + TRAILER_LEN;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[repr(u16)]
pub enum RecordKind {
    Update = 0x55A1,
    /// Full image written right after compaction.
    Snapshot = 0x55A2,
}

impl RecordKind {
    pub fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            0x55A1 => Some(RecordKind::Update),
            0x55A2 => Some(RecordKind::Snapshot),
            _ => None,
        }
    }
}

/// A committed record read back from flash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub kind: RecordKind,
    pub offset: u32,
    pub payload: Vec<u8>,
}

impl Record {
    pub fn length(&self) -> u32 {
        self.payload.len() as u32
    }

    /// Overlay this record onto the logical image.
    pub fn apply(&self, image: &mut [u8]) {
        let start = self.offset as usize;
        image[start..start + self.payload.len()].copy_from_slice(&self.payload);
    }
}

/// Why decoding stopped on something other than erased flash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Corruption {
    /// Programmed bytes that do not start a frame.
    Garbage,
    UnknownKind(u16),
    BadRange { offset: u32, length: u32 },
    /// Frame would run past the end of the sector.
    Overrun,
    /// Commit word still erased: interrupted while programming. The frame
    /// header checked out, so its extent is known.
    Torn { length: u32 },
    Checksum { stored: u32, computed: u32 },
}

impl Corruption {
    /// Bytes to step over to reach the next frame, when the damaged frame
    /// can be skipped. Only an uncommitted frame with a sound header
    /// qualifies; anything else leaves the rest of the sector unreadable.
    pub fn skippable_size(&self) -> Option<u32> {
        match *self {
            Corruption::Torn { length } => frame_size(length),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decoded {
    Record(Record),
    EndOfLog,
    Corrupt(Corruption),
}

/// Total frame size for a payload of `length` bytes.
pub fn frame_size(length: u32) -> Option<u32> {
    length.checked_add(FRAME_OVERHEAD)
}

fn check_range(offset: u32, length: usize) -> Result<(), FrameError> {
    if length == 0 {
        return Err(FrameError::Empty);
    }
    let length32 = u32::try_from(length).map_err(|_| FrameError::TooLong { length })?;
    if frame_size(length32).is_none() || offset.checked_add(length32).is_none() {
        return Err(FrameError::TooLong { length });
    }
    if offset % 2 != 0 || length32 % 2 != 0 {
        return Err(FrameError::Misaligned {
            offset,
            length: length32,
        });
    }
    Ok(())
}

fn checksum(header: &[u8], payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(header);
    hasher.update(payload);
    hasher.finalize()
}

/// Encode a complete frame, commit word included.
///
/// Offset and payload length must be even: the flash is programmed in
/// 16-bit units and the codec never produces an unaligned write.
pub fn encode(kind: RecordKind, offset: u32, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    check_range(offset, payload.len())?;

    let header_len = FRAME_HEADER_LEN as usize;
    let mut frame = vec![0u8; payload.len() + FRAME_OVERHEAD as usize];

    LittleEndian::write_u16(&mut frame[0..2], kind as u16);
    LittleEndian::write_u32(&mut frame[2..6], offset);
    LittleEndian::write_u32(&mut frame[6..10], payload.len() as u32);
    frame[header_len..header_len + payload.len()].copy_from_slice(payload);

    let crc = checksum(&frame[..header_len], payload);
    let trailer = header_len + payload.len();
    LittleEndian::write_u32(&mut frame[trailer..trailer + 4], crc);
    LittleEndian::write_u16(&mut frame[trailer + 4..trailer + 4 + COMMIT_LEN], COMMITTED);

    Ok(frame)
}

/// Decode the frame starting at `cursor` in `sector`.
///
/// Device errors are returned as `Err`; everything the bytes themselves can
/// tell us (end of log, torn or damaged frames) is a `Decoded` variant.
pub fn decode<F: FlashDevice>(
    flash: &mut F,
    sector: Sector,
    cursor: u32,
    storage_size: u32,
) -> Result<Decoded, F::Error> {
    let sector_size = flash.sector_size();
    let remaining = sector_size.saturating_sub(cursor);
    if remaining == 0 {
        return Ok(Decoded::EndOfLog);
    }

    let mut header = [0u8; FRAME_HEADER_LEN as usize];
    let header_len = remaining.min(FRAME_HEADER_LEN) as usize;
    flash.read(sector, cursor, &mut header[..header_len])?;

    if is_erased(&header[..header_len]) {
        return Ok(Decoded::EndOfLog);
    }
    if header_len < FRAME_HEADER_LEN as usize {
        return Ok(Decoded::Corrupt(Corruption::Garbage));
    }

    let raw_kind = LittleEndian::read_u16(&header[0..2]);
    if raw_kind == ERASED_WORD {
        return Ok(Decoded::Corrupt(Corruption::Garbage));
    }
    let kind = match RecordKind::from_u16(raw_kind) {
        Some(kind) => kind,
        None => return Ok(Decoded::Corrupt(Corruption::UnknownKind(raw_kind))),
    };

    let offset = LittleEndian::read_u32(&header[2..6]);
    let length = LittleEndian::read_u32(&header[6..10]);
    let in_range = offset
        .checked_add(length)
        .map_or(false, |end| end <= storage_size);
    if length == 0 || offset % 2 != 0 || length % 2 != 0 || !in_range {
        return Ok(Decoded::Corrupt(Corruption::BadRange { offset, length }));
    }

    match frame_size(length) {
        Some(size) if size <= remaining => {}
        _ => return Ok(Decoded::Corrupt(Corruption::Overrun)),
    }

    let mut body = vec![0u8; (length + TRAILER_LEN) as usize];
    flash.read(sector, cursor + FRAME_HEADER_LEN, &mut body)?;

    let (payload, trailer) = body.split_at(length as usize);
    let commit = LittleEndian::read_u16(&trailer[4..6]);
    if commit == ERASED_WORD {
        return Ok(Decoded::Corrupt(Corruption::Torn { length }));
    }
    if commit != COMMITTED {
        return Ok(Decoded::Corrupt(Corruption::Garbage));
    }

    let stored = LittleEndian::read_u32(&trailer[0..4]);
    let computed = checksum(&header, payload);
    if stored != computed {
        return Ok(Decoded::Corrupt(Corruption::Checksum { stored, computed }));
    }

    body.truncate(length as usize);
    Ok(Decoded::Record(Record {
        kind,
        offset,
        payload: body,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::RamFlash;

    const SECTOR: u32 = 1024;
    const STORAGE: u32 = 256;

    fn flash_with(frame: &[u8]) -> RamFlash {
        let mut flash = RamFlash::new(SECTOR);
        flash.write(Sector::First, 0, frame).unwrap();
        flash
    }

    #[test]
    fn test_encode_decode_update() {
        let frame = encode(RecordKind::Update, 36, &[1, 2, 3, 4]).unwrap();
        assert_eq!(frame.len(), 4 + FRAME_OVERHEAD as usize);

        let mut flash = flash_with(&frame);
        let decoded = decode(&mut flash, Sector::First, 0, STORAGE).unwrap();
        assert_eq!(
            decoded,
            Decoded::Record(Record {
                kind: RecordKind::Update,
                offset: 36,
                payload: vec![1, 2, 3, 4],
            })
        );

        // The next slot is still erased.
        let next = decode(&mut flash, Sector::First, frame.len() as u32, STORAGE).unwrap();
        assert_eq!(next, Decoded::EndOfLog);
    }

    #[test]
    fn test_encode_rejects_misaligned() {
        assert_eq!(
            encode(RecordKind::Update, 37, &[1, 2]),
            Err(FrameError::Misaligned { offset: 37, length: 2 })
        );
        assert_eq!(
            encode(RecordKind::Update, 36, &[1]),
            Err(FrameError::Misaligned { offset: 36, length: 1 })
        );
        assert_eq!(encode(RecordKind::Update, 36, &[]), Err(FrameError::Empty));
    }

    #[test]
    fn test_missing_commit_is_torn() {
        let frame = encode(RecordKind::Update, 0, &[9, 9]).unwrap();
        let body = &frame[..frame.len() - COMMIT_LEN];
        let mut flash = flash_with(body);
        assert_eq!(
            decode(&mut flash, Sector::First, 0, STORAGE).unwrap(),
            Decoded::Corrupt(Corruption::Torn { length: 2 })
        );
        assert_eq!(Corruption::Torn { length: 2 }.skippable_size(), Some(frame.len() as u32));
    }

    #[test]
    fn test_only_torn_frames_are_skippable() {
        assert_eq!(Corruption::Garbage.skippable_size(), None);
        assert_eq!(Corruption::Overrun.skippable_size(), None);
        assert_eq!(Corruption::BadRange { offset: 0, length: 3 }.skippable_size(), None);
        assert_eq!(Corruption::Checksum { stored: 1, computed: 2 }.skippable_size(), None);
    }

    #[test]
    fn test_erased_length_is_not_torn() {
        // Power cut after kind and offset: the length words are still erased.
        let frame = encode(RecordKind::Update, 4, &[1, 2]).unwrap();
        let mut flash = flash_with(&frame[..6]);
        assert!(matches!(
            decode(&mut flash, Sector::First, 0, STORAGE).unwrap(),
            Decoded::Corrupt(Corruption::BadRange { offset: 4, .. })
        ));
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut frame = encode(RecordKind::Update, 0, &[0xF0, 0x0F]).unwrap();
        // Clearing bits in the payload keeps the write legal for NOR.
        frame[FRAME_HEADER_LEN as usize] = 0x00;
        let mut flash = flash_with(&frame);
        assert!(matches!(
            decode(&mut flash, Sector::First, 0, STORAGE).unwrap(),
            Decoded::Corrupt(Corruption::Checksum { .. })
        ));
    }

    #[test]
    fn test_range_outside_image_is_corrupt() {
        let frame = encode(RecordKind::Update, STORAGE, &[1, 2]).unwrap();
        let mut flash = flash_with(&frame);
        assert_eq!(
            decode(&mut flash, Sector::First, 0, STORAGE).unwrap(),
            Decoded::Corrupt(Corruption::BadRange { offset: STORAGE, length: 2 })
        );
    }

    #[test]
    fn test_programmed_bytes_behind_erased_kind() {
        let mut flash = RamFlash::new(SECTOR);
        flash.write(Sector::First, 4, &[0x12, 0x34]).unwrap();
        assert_eq!(
            decode(&mut flash, Sector::First, 0, STORAGE).unwrap(),
            Decoded::Corrupt(Corruption::Garbage)
        );
    }

    #[test]
    fn test_frame_past_sector_end() {
        let frame = encode(RecordKind::Update, 0, &[0u8; 64]).unwrap();
        let mut flash = RamFlash::new(SECTOR);
        let at = SECTOR - 40;
        flash.write(Sector::First, at, &frame[..40]).unwrap();
        assert_eq!(
            decode(&mut flash, Sector::First, at, STORAGE).unwrap(),
            Decoded::Corrupt(Corruption::Overrun)
        );
    }
}
