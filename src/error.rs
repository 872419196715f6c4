// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Error types.

use thiserror::Error;

use crate::flash::FlashError;

/// Rejection raised by the record codec before anything reaches flash.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("misaligned frame: offset {offset}, length {length} (must be even)")]
    Misaligned { offset: u32, length: u32 },
    #[error("empty frame payload")]
    Empty,
    #[error("frame payload of {length} bytes is too long")]
    TooLong { length: usize },
}

/// Engine error, generic over the flash device's own error type.
#[derive(Error, Debug)]
pub enum Error<E> {
    #[error("flash device error: {0}")]
    Flash(E),

    #[error("range {offset}+{length} exceeds storage size {size}")]
    OutOfRange { offset: u32, length: u32, size: u32 },

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("storage not initialized")]
    Uninitialized,

    #[error("active sector full and erase not allowed, compaction deferred")]
    CompactionDeferred,

    #[error("snapshot needs {needed} bytes but a sector holds {available}")]
    SnapshotTooLarge { needed: u32, available: u32 },

    #[error("sector must be erased but erase is not allowed")]
    EraseDenied,
}

impl<E> Error<E> {
    /// Backpressure: the in-memory image holds the update, only the durable
    /// copy lags. The caller may retry the write later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::CompactionDeferred | Error::SnapshotTooLarge { .. } | Error::EraseDenied
        )
    }
}

impl<E: FlashError> Error<E> {
    /// Contract violations by the caller, the configuration or the engine's
    /// use of the device. Never retried.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Flash(e) => e.is_fatal(),
            Error::OutOfRange { .. } | Error::Frame(_) | Error::InvalidConfig(_) => true,
            _ => false,
        }
    }
}

pub type Result<T, E> = core::result::Result<T, Error<E>>;
