//! CLI entry point for the harvester tool.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use harvester_core::{
    ApiClient, CheckpointStore, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRYABLE_STATUSES, HarvestConfig,
    HarvestStatus, Harvester, RetryPolicy,
};
use indicatif::ProgressBar;
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use cli::{Args, parse_collection_spec};

/// Backoff cap for the retry policy (seconds).
const MAX_BACKOFF_SECS: u64 = 120;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let loaded = app_config::load_config(args.config.as_deref())?;
    if loaded.loaded_from_file
        && let Some(path) = &loaded.path
    {
        info!(path = %path.display(), "loaded config file");
    }
    let file_config = loaded.config.unwrap_or_default();

    let endpoint = args
        .endpoint
        .clone()
        .or_else(|| file_config.endpoint.clone())
        .context("no endpoint configured; pass --endpoint or set `endpoint` in the config file")?;
    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| file_config.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("harvest-output"));

    let defaults = HarvestConfig::default();
    let config = HarvestConfig {
        page_size: args
            .page_size
            .or(file_config.page_size)
            .unwrap_or(defaults.page_size),
        max_window: args
            .max_window
            .or(file_config.max_window)
            .unwrap_or(defaults.max_window),
        segment_field: args
            .segment_field
            .clone()
            .or_else(|| file_config.segment_field.clone())
            .unwrap_or(defaults.segment_field),
        segment_alphabet: args
            .segment_alphabet
            .clone()
            .or_else(|| file_config.segment_alphabet.clone())
            .unwrap_or(defaults.segment_alphabet),
        max_depth: args
            .max_depth
            .or(file_config.max_depth)
            .unwrap_or(defaults.max_depth),
        page_delay: Duration::from_millis(
            args.page_delay_ms.or(file_config.page_delay_ms).unwrap_or(0),
        ),
    };

    let max_retries = args
        .max_retries
        .or(file_config.max_retries)
        .unwrap_or(DEFAULT_MAX_ATTEMPTS);
    let retry_base = Duration::from_secs(
        args.retry_base_secs
            .or(file_config.retry_base_secs)
            .unwrap_or(2),
    );
    let retry_policy = RetryPolicy::new(
        max_retries,
        retry_base,
        Duration::from_secs(MAX_BACKOFF_SECS),
        DEFAULT_RETRYABLE_STATUSES.to_vec(),
    );

    let client = ApiClient::new(&endpoint, retry_policy)?;
    let store = CheckpointStore::new(&output_dir)?;
    let harvester = Harvester::new(client, store, config);

    info!(
        endpoint = %endpoint,
        output_dir = %output_dir.display(),
        collections = args.collections.len(),
        "harvester starting"
    );

    let mut reports = Vec::new();
    for spec in &args.collections {
        let collection = parse_collection_spec(spec);

        let bar = if args.quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };
        bar.set_message(format!("harvesting {}", collection.name));
        bar.enable_steady_tick(Duration::from_millis(120));

        // Collections are independent: one failing never stops the rest.
        let report = harvester.run(&collection, args.restart).await;

        bar.finish_with_message(format!(
            "{}: {} ({} records this run)",
            report.resource, report.status, report.records_written
        ));
        reports.push(report);
    }

    let mut incomplete = 0usize;
    for report in &reports {
        info!(
            collection = %report.resource,
            status = %report.status,
            pages = report.pages_fetched,
            records = report.records_written,
            total = ?report.total,
            "collection summary"
        );
        for warning in &report.warnings {
            warn!(%warning, "capacity warning: some records may be unreachable");
        }
        if let Some(error) = &report.error {
            warn!(collection = %report.resource, %error, "collection did not complete");
        }
        if report.status != HarvestStatus::Completed {
            incomplete += 1;
        }
    }

    if incomplete > 0 {
        bail!(
            "{incomplete} of {} collections did not complete (partial runs resume on rerun)",
            reports.len()
        );
    }

    Ok(())
}
