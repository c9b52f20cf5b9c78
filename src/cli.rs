//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use harvester_core::Collection;

/// Harvest complete collections from a windowed, paginated search API.
///
/// Harvester downloads every record of the named collections, partitioning
/// collections larger than the server's result window by prefix on a
/// searchable field, and checkpoints progress after every page so an
/// interrupted run resumes where it left off.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(author, version, about)]
pub struct Args {
    /// Collections to harvest, as NAME or NAME=FILTER (FILTER is passed
    /// through as the server-side scoping expression; defaults to NAME)
    #[arg(required = true)]
    pub collections: Vec<String>,

    /// Search endpoint URL (required here or in the config file)
    #[arg(short = 'e', long)]
    pub endpoint: Option<String>,

    /// Directory for output and checkpoint files
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Records per page (1-10000)
    #[arg(short = 'p', long, value_parser = clap::value_parser!(u64).range(1..=10_000))]
    pub page_size: Option<u64>,

    /// Maximum result window the endpoint accepts for offset + size
    #[arg(short = 'w', long, value_parser = clap::value_parser!(u64).range(2..))]
    pub max_window: Option<u64>,

    /// Searchable field used for prefix segmentation
    #[arg(short = 'f', long)]
    pub segment_field: Option<String>,

    /// Characters appended when expanding segmentation prefixes
    #[arg(short = 'a', long)]
    pub segment_alphabet: Option<String>,

    /// Maximum segmentation prefix depth (1-8)
    #[arg(short = 'd', long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..=8))]
    pub max_depth: Option<usize>,

    /// Maximum attempts per request, including the first (1-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_retries: Option<u32>,

    /// Base backoff delay in seconds (doubles per retry)
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=600))]
    pub retry_base_secs: Option<u64>,

    /// Politeness delay between pages in milliseconds (0 to disable)
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=60_000))]
    pub page_delay_ms: Option<u64>,

    /// Discard existing checkpoint and output before running
    #[arg(long)]
    pub restart: bool,

    /// Path to a config file (defaults to the XDG location)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Parses a collection spec of the form `NAME` or `NAME=FILTER`.
///
/// The filter defaults to the name itself; query building beyond that is the
/// caller's concern.
#[must_use]
pub fn parse_collection_spec(spec: &str) -> Collection {
    match spec.split_once('=') {
        Some((name, filter)) => Collection::new(name.trim(), filter.trim()),
        None => Collection::new(spec.trim(), spec.trim()),
    }
}
