use anyhow::{Context, Result};
use futures::{stream, TryStreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::{io, path::Path, time::Instant};
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::client::{HttpClient, TileClient};
use crate::config::Config;
use crate::error::{FetchError, RemoteError};
use crate::outcome::{FetchOutcome, FetchStats, FetchSummary};
use crate::tile::Tile;

/// The error with this number is replaced by a notice, later ones are only tallied.
const MAX_REPORTED_ERRORS: usize = 10;

/// Asynchronously fetch the open street map tiles specified in `cfg` and save them
/// to the file system.
///
/// Creates the required directories recursively. Tiles already present with
/// a non-zero size are skipped unless `cfg.force` is set.
///
/// # Example
/// ```rust,no_run
/// use tile_prefetcher::{fetch, Config, Preset};
///
/// # #[tokio::main]
/// # async fn main() {
/// let config = Config::from_preset(Preset::Antananarivo);
///
/// let summary = fetch(config).await.expect("failed fetching tiles");
/// println!("{}", summary);
/// # }
/// ```
///
/// # Errors
/// Fails on invalid configuration and on local I/O errors. Individual tiles
/// that could not be fetched are counted in the returned summary instead.
pub async fn fetch(cfg: Config) -> Result<FetchSummary> {
    cfg.validate()?;
    let client = HttpClient::new(&cfg.user_agent, cfg.timeout)?;

    fetch_with(&client, &cfg).await
}

/// Like [`fetch`], but sends every request through `client`.
pub async fn fetch_with<C: TileClient>(client: &C, cfg: &Config) -> Result<FetchSummary> {
    cfg.validate()?;
    prepare_output(&cfg.output_folder).await?;

    let total = cfg.tile_count();
    info!(
        tiles = total,
        min_zoom = cfg.min_zoom,
        max_zoom = cfg.max_zoom,
        concurrency = cfg.concurrency,
        output = %cfg.output_folder.display(),
        "starting tile fetch"
    );

    let pb = if cfg.show_progress {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:60.cyan/blue} {pos:>7}/{len:7} ETA: {eta} {msg}")
                .context("invalid progress bar template")?
                .progress_chars("##-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let stats = FetchStats::new();
    let started = Instant::now();
    let opts = cfg.fetch_options();

    let stats_ref = &stats;
    let pb_ref = &pb;
    let run = stream::iter(cfg.tiles().map(Ok::<Tile, FetchError>))
        .try_for_each_concurrent(cfg.concurrency as usize, move |tile| async move {
            let report = tile
                .fetch_from(client, &cfg.url, &cfg.output_folder, opts)
                .await?;

            let errors = stats_ref.record(&report);
            if let Some(e) = &report.error {
                pb_ref.suspend(|| report_tile_error(&tile, e, errors));
            }

            pb_ref.inc(1);
            pb_ref.set_message(stats_ref.snapshot(started.elapsed()).counters());

            // the worker keeps its slot while it waits, so the delay
            // applies per worker and the concurrency bound holds
            if report.outcome == FetchOutcome::Downloaded && !cfg.delay.is_zero() {
                tokio::time::sleep(cfg.delay).await;
            }

            Ok(())
        })
        .await;

    pb.finish_and_clear();
    run.context("aborting tile fetch")?;

    let summary = stats.snapshot(started.elapsed());
    info!(
        downloaded = summary.downloaded,
        skipped = summary.skipped,
        not_found = summary.not_found,
        errors = summary.errors,
        bytes = summary.bytes_written,
        elapsed_secs = summary.elapsed.as_secs_f64(),
        "tile fetch finished"
    );

    Ok(summary)
}

/// Total size of the cached tiles with the given extension below `root`.
pub fn cache_size(root: &Path, extension: &str) -> io::Result<u64> {
    let mut total = 0;

    for entry in WalkDir::new(root) {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().map_or(false, |ext| ext == extension)
        {
            total += entry.metadata()?.len();
        }
    }

    Ok(total)
}

async fn prepare_output(output_folder: &Path) -> Result<(), FetchError> {
    match fs::metadata(output_folder).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(FetchError::OutputNotDirectory(output_folder.to_owned())),
        Err(_) => fs::create_dir_all(output_folder)
            .await
            .map_err(|source| FetchError::CreateDir {
                path: output_folder.to_owned(),
                source,
            }),
    }
}

/// How a tile error is surfaced, given the number of errors so far.
#[derive(Debug, PartialEq)]
enum ErrorLog {
    Report,
    Notice,
    Quiet,
}

fn error_log(errors: usize) -> ErrorLog {
    match errors {
        n if n < MAX_REPORTED_ERRORS => ErrorLog::Report,
        MAX_REPORTED_ERRORS => ErrorLog::Notice,
        _ => ErrorLog::Quiet,
    }
}

fn report_tile_error(tile: &Tile, error: &RemoteError, errors: usize) {
    debug!(tile = %tile, error = %error, "tile failed");

    match error_log(errors) {
        ErrorLog::Report => warn!(tile = %tile, error = %error, "failed fetching tile"),
        ErrorLog::Notice => warn!("too many tile errors, further failures are only counted"),
        ErrorLog::Quiet => {}
    }
}
