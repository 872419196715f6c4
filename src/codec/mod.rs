// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! On-flash layout: the per-sector header and the record frames that
//! follow it. All fields are little-endian and 16-bit aligned.
pub mod header;
pub mod record;

/// Value written to a commit word once the field it guards is complete.
pub const COMMITTED: u16 = 0x0000;

/// Size of a commit word.
pub const COMMIT_LEN: usize = 2;
