// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

use std::path::Path;

use anyhow::{Context, Result};
use flashlog::codec::header::HeaderState;
use flashlog::codec::record::RecordKind;
use flashlog::replay::{self, LogEnd, SectorReport};

use crate::image;

/// Scan both sectors without touching the file.
pub fn collect(path: &Path, storage_size: u32) -> Result<Vec<SectorReport>> {
    let mut flash = image::load(path)?;
    replay::inspect(&mut flash, storage_size).context("Failed to scan image")
}

pub fn run(path: &Path, storage_size: u32, json: bool) -> Result<()> {
    let reports = collect(path, storage_size)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    println!("\nFlash Image Report: {}", path.display());
    println!("--------------------");

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Sector", "Header", "Active", "Updates", "Snapshots", "Skipped", "End", "Tail"]);

    for report in &reports {
        let header = match report.header {
            HeaderState::Blank => "BLANK".to_string(),
            HeaderState::Valid(h) => format!("generation {}", h.generation),
            HeaderState::Invalid(fault) => format!("INVALID ({fault:?})"),
        };
        let count = |kind| report.frames.iter().filter(|f| f.kind == kind).count();
        let tail = match report.stop {
            LogEnd::Clean => "clean".to_string(),
            LogEnd::Corrupt(c) => format!("{c:?}"),
        };
        table.add_row(vec![
            report.sector.to_string(),
            header,
            if report.active { "yes" } else { "" }.to_string(),
            count(RecordKind::Update).to_string(),
            count(RecordKind::Snapshot).to_string(),
            report.skipped.to_string(),
            report.end.to_string(),
            tail,
        ]);
    }

    println!("{table}\n");

    Ok(())
}
