pub mod compaction_tests;

use crate::flash::FlashDevice;
use crate::log::LogWriter;
use crate::sim::RamFlash;
use crate::{EngineState, FlashStorage, StorageConfig};

/// Blank flash, initialized engine.
pub(crate) fn fresh(storage_size: u32, sector_size: u32) -> FlashStorage<RamFlash> {
    let config = StorageConfig::new(storage_size, sector_size);
    let mut storage = FlashStorage::new(RamFlash::new(sector_size), config).unwrap();
    storage.init().unwrap();
    storage
}

/// Engine over `flash` with `init()` already run.
pub(crate) fn boot(flash: RamFlash, storage_size: u32) -> FlashStorage<RamFlash> {
    let config = StorageConfig::new(storage_size, flash.sector_size());
    let mut storage = FlashStorage::new(flash, config).unwrap();
    storage.init().unwrap();
    storage
}

/// Power-cycle: drop all RAM state and recover from flash alone.
pub(crate) fn reboot(storage: FlashStorage<RamFlash>) -> FlashStorage<RamFlash> {
    let storage_size = storage.config().storage_size;
    let mut flash = storage.into_inner();
    flash.restore_power();
    boot(flash, storage_size)
}

pub(crate) fn active(storage: &FlashStorage<RamFlash>) -> LogWriter {
    match storage.state() {
        EngineState::Active(log) => log,
        other => panic!("engine not active: {:?}", other),
    }
}
