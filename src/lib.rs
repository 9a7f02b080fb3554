//! Pre-populate a local OpenStreetMap tile cache for offline use.
//!
//! **Use with absolute caution.** Downloading tiles en-masse can hog
//! down a tile server easily. Keep the concurrency low and the delay
//! between requests in place, as the tile usage policy demands.
//!
//! Tiles are stored as `{output}/{z}/{x}/{y}.png`, the layout a static
//! tile server expects. Tiles already on disk with a non-zero size are
//! skipped, so an interrupted run simply resumes where it stopped.
//!
//! # CLI Example
//!
//! ```bash
//! tile-prefetcher --preset antananarivo --output ./tiles/antananarivo
//!
//! tile-prefetcher \
//!   --south -18.95 --north -18.80 \
//!   --west 47.48 --east 47.58 \
//!   --min-zoom 10 --max-zoom 16 \
//!   --output ./tiles
//! ```
//!
//! # Library Example
//! ```rust,no_run
//! use tile_prefetcher::{fetch, BoundingBox, Config};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bbox = BoundingBox::new(-18.95, -18.80, 47.48, 47.58).unwrap();
//! let mut config = Config::new(bbox, 10, 16);
//! config.output_folder = "./tiles".into();
//!
//! let summary = fetch(config).await.expect("failed fetching tiles");
//! println!("{}", summary);
//! # }
//! ```

mod bounding_box;
mod client;
mod config;
mod error;
mod fetch;
mod outcome;
mod tile;
mod url;

pub use bounding_box::{BoundingBox, BoundingBoxError, Preset, TileRange, MAX_LAT, MIN_LAT};
pub use client::{HttpClient, TileClient, TileResponse};
pub use config::*;
pub use error::{FetchError, RemoteError, TransportError};
pub use fetch::{cache_size, fetch, fetch_with};
pub use outcome::{FetchOutcome, FetchStats, FetchSummary, TileReport};
pub use tile::{lat_lon_to_tile, FetchOptions, Tile};
pub use url::{UrlFormat, OSM_SERVERS};
