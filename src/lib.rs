// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
#![no_std]

//! flashlog: a power-loss-safe byte store on two raw NOR flash sectors.
//!
//! The caller owns a fixed-size logical image through [`FlashStorage`] and
//! persists byte ranges of it with [`FlashStorage::write`]. Updates are
//! appended as framed records to the active sector; when that sector fills
//! up the whole image is compacted into the spare sector as one snapshot
//! record and the old sector is erased. [`FlashStorage::init`] rebuilds the
//! image from whatever the flash holds after a power loss.

extern crate alloc;

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod codec;
pub mod config;
pub mod error;
pub mod flash;
pub mod log;
pub mod replay;
pub mod sector;
pub mod storage;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

#[cfg(test)]
pub mod tests;

pub use config::StorageConfig;
pub use error::{Error, Result};
pub use flash::{FlashDevice, FlashError, Sector};
pub use replay::{Recovery, ReplayReport};
pub use sector::EngineState;
pub use storage::FlashStorage;
