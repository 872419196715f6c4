// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use clap::{Parser, Subcommand};
use flashlog::config::{DEFAULT_SECTOR_SIZE, DEFAULT_STORAGE_SIZE};
use flashlog::StorageConfig;
use flashlog_cli::commands::{format, inspect, read, stress, write};
use flashlog_cli::commands::stress::StressOptions;
use flashlog_cli::telemetry;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "flashlog")]
#[command(about = "Two-sector NOR flash log storage: image tool and torture tester", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an erased flash image file
    Format {
        #[arg(long, short)]
        image: PathBuf,

        /// Size of each of the two sectors in bytes
        #[arg(long, default_value_t = DEFAULT_SECTOR_SIZE)]
        sector_size: u32,

        /// Logical image size the file will be used with
        #[arg(long, default_value_t = DEFAULT_STORAGE_SIZE)]
        storage_size: u32,
    },
    /// Write bytes into the logical image and persist them
    Write {
        #[arg(long, short)]
        image: PathBuf,

        #[arg(long, short)]
        offset: u32,

        /// Bytes to write, hex encoded
        #[arg(long)]
        hex: String,

        #[arg(long, default_value_t = DEFAULT_STORAGE_SIZE)]
        storage_size: u32,

        /// Keep the erase gate closed
        #[arg(long)]
        deny_erase: bool,
    },
    /// Recover the logical image and dump a range of it
    Read {
        #[arg(long, short)]
        image: PathBuf,

        #[arg(long, short)]
        offset: u32,

        #[arg(long, short)]
        length: u32,

        #[arg(long, default_value_t = DEFAULT_STORAGE_SIZE)]
        storage_size: u32,
    },
    /// Show sector headers and record streams
    Inspect {
        #[arg(long, short)]
        image: PathBuf,

        #[arg(long, default_value_t = DEFAULT_STORAGE_SIZE)]
        storage_size: u32,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Random writes against a simulated flash, then re-init and compare
    Stress {
        #[arg(long, short = 'n', default_value_t = 100_000)]
        iterations: u64,

        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Allow sector erases only on every K-th write
        #[arg(long, default_value_t = 1000)]
        erase_every: u64,

        #[arg(long, default_value_t = DEFAULT_STORAGE_SIZE)]
        storage_size: u32,

        #[arg(long, default_value_t = DEFAULT_SECTOR_SIZE)]
        sector_size: u32,

        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Format {
            image,
            sector_size,
            storage_size,
        } => format::run(&image, sector_size, storage_size),
        Commands::Write {
            image,
            offset,
            hex,
            storage_size,
            deny_erase,
        } => write::run(&image, offset, &hex, storage_size, deny_erase),
        Commands::Read {
            image,
            offset,
            length,
            storage_size,
        } => read::run(&image, offset, length, storage_size),
        Commands::Inspect {
            image,
            storage_size,
            json,
        } => inspect::run(&image, storage_size, json),
        Commands::Stress {
            iterations,
            seed,
            erase_every,
            storage_size,
            sector_size,
            json,
        } => {
            let opts = StressOptions {
                iterations,
                seed,
                erase_every,
                config: StorageConfig::new(storage_size, sector_size),
            };
            stress::run(&opts, json)
        }
    }
}
