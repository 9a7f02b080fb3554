use anyhow::{bail, ensure, Context, Result};
use std::{fmt::Debug, path::PathBuf, time::Duration};

use crate::bounding_box::{BoundingBox, Preset, TileRange};
use crate::tile::{FetchOptions, Tile};
use crate::url::UrlFormat;

/// Practical zoom ceiling of the public OpenStreetMap tile servers.
pub const MAX_ZOOM: u8 = 19;

/// Upper bound for parallel requests. This is a courtesy limit towards the
/// tile server and is never raised behind the user's back.
pub const MAX_CONCURRENCY: u8 = 4;

pub const DEFAULT_URL: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";
pub const DEFAULT_EXTENSION: &str = "png";
pub const DEFAULT_OUTPUT: &str = "tiles/osm";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_ATTEMPTS: u8 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_DELAY: Duration = Duration::from_millis(250);
pub const DEFAULT_CONCURRENCY: u8 = 1;
pub const DEFAULT_USER_AGENT: &str = concat!(
    "tile-prefetcher/",
    env!("CARGO_PKG_VERSION"),
    " (offline tile cache; contact: offline-maps@example.com)"
);

/// Rough size of a raster tile, used for estimates only.
const ESTIMATED_TILE_SIZE: f64 = 10_000f64;

/// Tile fetching configuration.
#[derive(Debug, PartialEq)]
pub struct Config {
    /// Area to cache.
    pub bounding_box: BoundingBox,

    /// The minimum zoom level to download.
    pub min_zoom: u8,

    /// The maximum zoom level to download.
    pub max_zoom: u8,

    /// Root of the `{z}/{x}/{y}.{ext}` tree.
    pub output_folder: PathBuf,

    /// The URL to download individual tiles from including the replacement
    /// specifiers `{x}`, `{y}` and `{z}`.
    pub url: UrlFormat,

    /// Extension of the files on disk, also available as `{ext}` in the URL.
    pub extension: String,

    /// Timeout for fetching a single tile.
    ///
    /// Pass the zero duration to disable the timeout.
    pub timeout: Duration,

    /// Total number of requests made for one tile before it counts as an error.
    pub max_attempts: u8,

    /// Pause between two attempts on the same tile.
    pub retry_delay: Duration,

    /// Pause a worker takes after each downloaded tile.
    pub delay: Duration,

    /// Maximum number of parallel downloads.
    pub concurrency: u8,

    /// Re-download tiles that are already cached.
    pub force: bool,

    /// Value of the `User-Agent` header, naming the client and a contact.
    pub user_agent: String,

    /// Render a progress bar on the terminal.
    pub show_progress: bool,
}

impl Config {
    /// A configuration for `bounding_box` with every other setting at its default.
    pub fn new(bounding_box: BoundingBox, min_zoom: u8, max_zoom: u8) -> Self {
        Self {
            bounding_box,
            min_zoom,
            max_zoom,
            output_folder: PathBuf::from(DEFAULT_OUTPUT),
            url: UrlFormat::from_string(DEFAULT_URL.to_owned()),
            extension: DEFAULT_EXTENSION.to_owned(),
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            delay: DEFAULT_DELAY,
            concurrency: DEFAULT_CONCURRENCY,
            force: false,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            show_progress: false,
        }
    }

    /// The settings a preset stands for.
    pub fn from_preset(preset: Preset) -> Self {
        let bounding_box = BoundingBox::from(preset);

        match preset {
            Preset::Antananarivo | Preset::AntananarivoExtended => Self {
                output_folder: PathBuf::from("tiles/antananarivo"),
                timeout: Duration::from_secs(15),
                max_attempts: 1,
                delay: Duration::from_millis(500),
                ..Self::new(bounding_box, 10, 16)
            },
            Preset::AntananarivoOffline => Self {
                url: UrlFormat::with_subdomains(
                    "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_owned(),
                    Vec::new(),
                ),
                concurrency: 2,
                ..Self::new(bounding_box, 5, MAX_ZOOM)
            },
        }
    }

    /// Checks the settings that [`BoundingBox::new`] can't.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.min_zoom <= self.max_zoom,
            "minimum zoom {} is above maximum zoom {}",
            self.min_zoom,
            self.max_zoom
        );
        ensure!(
            self.max_zoom <= MAX_ZOOM,
            "zoom {} is beyond the tile server's limit of {}",
            self.max_zoom,
            MAX_ZOOM
        );
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            bail!(
                "concurrency must be between 1 and {}, got {}",
                MAX_CONCURRENCY,
                self.concurrency
            );
        }
        ensure!(self.max_attempts >= 1, "at least one attempt per tile is required");
        ensure!(!self.extension.is_empty(), "tile extension must not be empty");
        self.url
            .check(&self.extension)
            .context("invalid tile URL template")?;

        Ok(())
    }

    /// Tile ranges of every zoom level of the run.
    pub fn tile_ranges(&self) -> impl Iterator<Item = TileRange> + Debug + Clone {
        self.bounding_box.tile_ranges(self.min_zoom, self.max_zoom)
    }

    /// Creates an iterator iterating over all tiles in the contained bounding box.
    pub fn tiles(&self) -> impl Iterator<Item = Tile> + Debug {
        self.bounding_box.tiles(self.min_zoom, self.max_zoom)
    }

    pub fn tile_count(&self) -> u64 {
        self.tile_ranges().map(|r| r.count()).sum()
    }

    /// Lower bound for a cold run: every tile downloaded, each followed by
    /// the per-worker delay. Saturates at [`Duration::MAX`].
    pub fn estimated_duration(&self) -> Duration {
        let per_worker = self.tile_count() as f64 / self.concurrency.max(1) as f64;
        Duration::try_from_secs_f64(per_worker * self.delay.as_secs_f64())
            .unwrap_or(Duration::MAX)
    }

    pub fn estimated_size(&self) -> f64 {
        self.tile_count() as f64 * ESTIMATED_TILE_SIZE
    }

    pub(crate) fn fetch_options(&self) -> FetchOptions<'_> {
        FetchOptions {
            extension: &self.extension,
            max_attempts: self.max_attempts,
            retry_delay: self.retry_delay,
            force: self.force,
        }
    }
}
