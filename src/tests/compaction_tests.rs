// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
#![allow(dead_code)]

use super::{active, fresh, reboot};
use crate::codec::header::{HeaderState, SectorHeader, HEADER_SIZE};
use crate::codec::record::{decode, frame_size, Decoded, RecordKind, FRAME_OVERHEAD};
use crate::error::Error;
use crate::flash::{FlashDevice, ERASED};
use crate::sector::read_header;
use crate::sim::RamFlash;
use crate::{FlashStorage, Recovery, Sector};

const STORAGE: u32 = 256;
const SECTOR: u32 = 1024;

/// Fill the active sector with small updates until the next one would not fit.
fn fill_sector(storage: &mut FlashStorage<RamFlash>) -> u32 {
    let sector_size = storage.config().sector_size;
    let mut n = 0u32;
    while active(storage).remaining(sector_size) >= 2 + FRAME_OVERHEAD {
        let offset = (n * 2) % STORAGE;
        storage.update(offset, &[n as u8, (n >> 8) as u8]).unwrap();
        n += 1;
    }
    n
}

#[test]
fn test_compaction_moves_image_to_spare() {
    let mut storage = fresh(STORAGE, SECTOR);
    fill_sector(&mut storage);
    assert_eq!(active(&storage).sector, Sector::First);

    storage.update(100, &[0xEE, 0xEE]).unwrap();
    let log = active(&storage);
    assert_eq!(log.sector, Sector::Second);
    assert_eq!(log.generation, 2);
    // Snapshot only: the triggering update is already part of it.
    assert_eq!(log.cursor, HEADER_SIZE + frame_size(STORAGE).unwrap());

    assert!(storage.flash().sector(Sector::First).iter().all(|&b| b == ERASED));
    assert_eq!(
        read_header(storage.flash_mut(), Sector::Second).unwrap(),
        HeaderState::Valid(SectorHeader::new(2))
    );

    let image = storage.buffer().to_vec();
    match decode(storage.flash_mut(), Sector::Second, HEADER_SIZE, STORAGE).unwrap() {
        Decoded::Record(record) => {
            assert_eq!(record.kind, RecordKind::Snapshot);
            assert_eq!(record.offset, 0);
            assert_eq!(record.payload, image);
        }
        other => panic!("expected snapshot, got {:?}", other),
    }

    let mut storage = reboot(storage);
    assert_eq!(storage.buffer(), &image[..]);
    match storage.init().unwrap() {
        Recovery::Restored(report) => {
            assert_eq!(report.sector, Sector::Second);
            assert_eq!(report.generation, 2);
            assert_eq!(report.records, 1);
            assert_eq!(report.truncated, None);
        }
        Recovery::Fresh => panic!("expected restored image"),
    }
}

#[test]
fn test_compactions_alternate_sectors() {
    let mut storage = fresh(STORAGE, SECTOR);
    let mut expected_sector = Sector::First;
    for round in 0..6u32 {
        fill_sector(&mut storage);
        storage.update(0, &[round as u8, 0xA5]).unwrap();
        expected_sector = expected_sector.other();

        let log = active(&storage);
        assert_eq!(log.sector, expected_sector);
        assert_eq!(log.generation, round + 2);
        assert!(storage
            .flash()
            .sector(expected_sector.other())
            .iter()
            .all(|&b| b == ERASED));

        let image = storage.buffer().to_vec();
        storage = reboot(storage);
        assert_eq!(storage.buffer(), &image[..]);
    }
}

#[test]
fn test_dirty_spare_erased_before_snapshot() {
    let mut storage = fresh(STORAGE, SECTOR);
    // Leftovers of an earlier life in the spare, behind a blank header.
    storage
        .flash_mut()
        .write(Sector::Second, 600, &[0x12, 0x34, 0x56, 0x78])
        .unwrap();

    fill_sector(&mut storage);
    storage.update(2, &[9, 9]).unwrap();
    assert_eq!(active(&storage).sector, Sector::Second);
    let image = storage.buffer().to_vec();

    let storage = reboot(storage);
    assert_eq!(storage.buffer(), &image[..]);
    assert_eq!(&storage.flash().sector(Sector::Second)[600..604], &[0xFF; 4]);
}

#[test]
fn test_erase_denied_defers_compaction() {
    let mut storage = fresh(STORAGE, SECTOR);
    storage.flash_mut().set_erase_allowed(false);

    // Normal appends need no erase.
    let mut durable = storage.buffer().to_vec();
    let mut n = 0u32;
    let err = loop {
        let offset = (n * 4) % STORAGE;
        match storage.update(offset, &[n as u8; 4]) {
            Ok(()) => durable = storage.buffer().to_vec(),
            Err(e) => break e,
        }
        n += 1;
    };
    assert!(matches!(err, Error::CompactionDeferred));
    assert!(err.is_transient());
    assert_eq!(active(&storage).sector, Sector::First);

    // Still deferred, and flash is not touched.
    let ops = storage.flash().ops();
    assert!(matches!(storage.update(200, &[1, 1]), Err(Error::CompactionDeferred)));
    assert_eq!(storage.flash().ops(), ops);

    // The buffer keeps the pending bytes; flash still holds the last
    // durable image.
    let pending = storage.buffer().to_vec();
    assert_ne!(pending, durable);
    let mut storage = reboot(storage);
    assert_eq!(storage.buffer(), &durable[..]);

    storage.flash_mut().set_erase_allowed(true);
    storage.update(200, &[1, 1]).unwrap();
    assert_eq!(active(&storage).sector, Sector::Second);
    let mut expected = durable.clone();
    expected[200..202].copy_from_slice(&[1, 1]);
    let storage = reboot(storage);
    assert_eq!(storage.buffer(), &expected[..]);
}

#[test]
fn test_pending_bytes_flushed_once_gate_opens() {
    let mut storage = fresh(STORAGE, SECTOR);
    storage.flash_mut().set_erase_allowed(false);
    fill_sector(&mut storage);

    // Accepted into the buffer, not into flash.
    for offset in [40u32, 80, 120] {
        let err = storage.update(offset, &[0x77, 0x77]).unwrap_err();
        assert!(matches!(err, Error::CompactionDeferred));
    }

    storage.flash_mut().set_erase_allowed(true);
    storage.update(160, &[0x66, 0x66]).unwrap();
    let image = storage.buffer().to_vec();

    let storage = reboot(storage);
    assert_eq!(storage.buffer(), &image[..]);
    for offset in [40usize, 80, 120] {
        assert_eq!(&storage.buffer()[offset..offset + 2], &[0x77, 0x77]);
    }
}

#[test]
fn test_snapshot_too_large() {
    let mut storage = fresh(64 * 1024, 32 * 1024);
    let mut durable = storage.buffer().to_vec();
    let mut n = 0u32;
    let err = loop {
        let offset = (n * 64) % (64 * 1024);
        match storage.update(offset, &[0x3C; 64]) {
            Ok(()) => durable = storage.buffer().to_vec(),
            Err(e) => break e,
        }
        n += 1;
    };
    assert!(matches!(err, Error::SnapshotTooLarge { available, .. } if available == 32 * 1024));
    assert!(err.is_transient());
    assert_eq!(active(&storage).sector, Sector::First);
    assert!(storage.flash().sector(Sector::Second).iter().all(|&b| b == ERASED));

    let storage = reboot(storage);
    assert_eq!(storage.buffer(), &durable[..]);
}

#[test]
fn test_failed_erase_of_retired_sector_still_succeeds() {
    let mut storage = fresh(STORAGE, SECTOR);
    fill_sector(&mut storage);

    // Enough budget for the spare check, snapshot and header, not the erase.
    let words = (frame_size(STORAGE).unwrap() + HEADER_SIZE) / 2;
    let before = storage.flash().ops();
    storage.flash_mut().cut_power_after(words as u64);
    storage.update(50, &[4, 2]).unwrap();
    assert_eq!(storage.flash().ops() - before, words as u64);
    assert!(!storage.flash().is_powered());
    let image = storage.buffer().to_vec();

    // The interrupted erase wiped the old header, so only the new sector
    // is valid. Its leftovers get erased by the next compaction.
    let mut storage = reboot(storage);
    assert_eq!(active(&storage).sector, Sector::Second);
    assert_eq!(storage.buffer(), &image[..]);
    assert!(!storage.flash().sector(Sector::First).iter().all(|&b| b == ERASED));

    fill_sector(&mut storage);
    storage.update(52, &[4, 3]).unwrap();
    assert_eq!(active(&storage).sector, Sector::First);
    let image = storage.buffer().to_vec();
    let storage = reboot(storage);
    assert_eq!(storage.buffer(), &image[..]);
}
