use std::{
    fmt,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};

use crate::error::RemoteError;

/// What happened to a single tile.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FetchOutcome {
    Downloaded,
    Skipped,
    NotFound,
    Error,
}

/// Outcome of a single tile plus what is needed for the run totals.
#[derive(Clone, Debug, PartialEq)]
pub struct TileReport {
    pub outcome: FetchOutcome,
    pub bytes: u64,
    pub error: Option<RemoteError>,
}

impl TileReport {
    pub(crate) fn new(outcome: FetchOutcome) -> Self {
        Self {
            outcome,
            bytes: 0,
            error: None,
        }
    }

    pub(crate) fn downloaded(bytes: u64) -> Self {
        Self {
            outcome: FetchOutcome::Downloaded,
            bytes,
            error: None,
        }
    }

    pub(crate) fn failed(error: RemoteError) -> Self {
        Self {
            outcome: FetchOutcome::Error,
            bytes: 0,
            error: Some(error),
        }
    }
}

/// Run-level counters, shared by reference between all workers.
#[derive(Debug, Default)]
pub struct FetchStats {
    downloaded: AtomicUsize,
    skipped: AtomicUsize,
    not_found: AtomicUsize,
    errors: AtomicUsize,
    bytes_written: AtomicU64,
}

impl FetchStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one tile report and returns the number of errors counted so far,
    /// including this one.
    pub fn record(&self, report: &TileReport) -> usize {
        match report.outcome {
            FetchOutcome::Downloaded => {
                self.downloaded.fetch_add(1, Ordering::Relaxed);
                self.bytes_written
                    .fetch_add(report.bytes, Ordering::Relaxed);
            }
            FetchOutcome::Skipped => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
            FetchOutcome::NotFound => {
                self.not_found.fetch_add(1, Ordering::Relaxed);
            }
            FetchOutcome::Error => {
                return self.errors.fetch_add(1, Ordering::Relaxed) + 1;
            }
        }

        self.errors.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, elapsed: Duration) -> FetchSummary {
        FetchSummary {
            downloaded: self.downloaded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            elapsed,
        }
    }
}

/// Final tally of a run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FetchSummary {
    pub downloaded: usize,
    pub skipped: usize,
    pub not_found: usize,
    pub errors: usize,
    pub bytes_written: u64,
    pub elapsed: Duration,
}

impl FetchSummary {
    pub fn total(&self) -> usize {
        self.downloaded + self.skipped + self.not_found + self.errors
    }

    /// Short counter line for progress output.
    pub fn counters(&self) -> String {
        format!(
            "↓{} ○{} ?{} ✗{}",
            self.downloaded, self.skipped, self.not_found, self.errors
        )
    }
}

impl fmt::Display for FetchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "downloaded: {}", self.downloaded)?;
        writeln!(f, "skipped:    {}", self.skipped)?;
        writeln!(f, "not found:  {}", self.not_found)?;
        writeln!(f, "errors:     {}", self.errors)?;
        writeln!(
            f,
            "written:    {}",
            pretty_bytes::converter::convert(self.bytes_written as f64)
        )?;
        write!(f, "elapsed:    {:.1}s", self.elapsed.as_secs_f64())
    }
}
