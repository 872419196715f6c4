// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod format;
pub mod inspect;
pub mod read;
pub mod stress;
pub mod write;
