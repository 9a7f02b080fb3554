use reqwest::StatusCode;
use std::{
    f64::consts::PI,
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::fs;
use tracing::{debug, trace};

use crate::client::TileClient;
use crate::error::{FetchError, RemoteError};
use crate::outcome::{FetchOutcome, TileReport};
use crate::url::UrlFormat;

/// An OSM slippy-map tile with x, y and z-coordinate.
/// ref: https://wiki.openstreetmap.org/wiki/Slippy_map_tilenames
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

/// Per-tile knobs of the fetch procedure, copied out of the run configuration.
#[derive(Clone, Copy, Debug)]
pub struct FetchOptions<'a> {
    /// File extension of the cached tiles, without the dot.
    pub extension: &'a str,

    /// Total number of requests made for one tile before giving up.
    pub max_attempts: u8,

    /// Fixed pause between two attempts on the same tile.
    pub retry_delay: Duration,

    /// Re-download tiles that are already cached.
    pub force: bool,
}

/// Converts a WGS84 position in degrees to the tile containing it.
///
/// Both indices are truncated toward zero, never rounded, so tile boundaries
/// match other slippy-map tools byte for byte. The latitude is not checked:
/// the projection is undefined at the poles and callers must stay inside the
/// Mercator limits.
///
/// # Example
/// ```rust
/// # use tile_prefetcher::{lat_lon_to_tile, Tile};
/// assert_eq!(lat_lon_to_tile(50.7929, 6.0402, 18), Tile::new(135470, 87999, 18));
/// ```
pub fn lat_lon_to_tile(lat_deg: f64, lon_deg: f64, zoom: u8) -> Tile {
    // scale factor
    let n = 2_f64.powi(zoom as i32);

    let lat_rad = lat_deg.to_radians();

    let x = (lon_deg + 180_f64) / 360_f64 * n;
    let y = (1_f64 - lat_rad.tan().asinh() / PI) / 2_f64 * n;

    Tile::new(x as u32, y as u32, zoom)
}

impl Tile {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Location of the cached tile below `root`: `{root}/{z}/{x}/{y}.{ext}`.
    pub fn path(&self, root: &Path, extension: &str) -> PathBuf {
        let mut target = root.join(self.z.to_string());
        target.push(self.x.to_string());
        target.push(format!("{}.{}", self.y, extension));
        target
    }

    /// Fetches the tile from the tile server and stores it below `output_folder`.
    ///
    /// Remote failures never escape this function, they are folded into the
    /// returned [`TileReport`]. Only local I/O failures (directory creation,
    /// writing the file) are returned as errors since they prevent any
    /// further progress.
    pub async fn fetch_from<C: TileClient>(
        &self,
        client: &C,
        url_fmt: &UrlFormat,
        output_folder: &Path,
        opts: FetchOptions<'_>,
    ) -> Result<TileReport, FetchError> {
        let output_file = self.path(output_folder, opts.extension);

        // a zero-length file is a leftover placeholder, not a cached tile
        if !opts.force && is_cached(&output_file).await {
            trace!(tile = %self, "already cached");
            return Ok(TileReport::new(FetchOutcome::Skipped));
        }

        if let Some(parent) = output_file.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| FetchError::CreateDir {
                    path: parent.to_owned(),
                    source,
                })?;
        }

        let body = match self.download(client, url_fmt, opts).await {
            Ok(body) => body,
            Err(RemoteError::NotFound) => {
                debug!(tile = %self, "tile not found on server");
                return Ok(TileReport::new(FetchOutcome::NotFound));
            }
            Err(e) => {
                debug!(tile = %self, error = %e, "giving up on tile");
                return Ok(TileReport::failed(e));
            }
        };

        write_atomic(&output_file, &body).await?;

        Ok(TileReport::downloaded(body.len() as u64))
    }

    /// Requests the tile until it arrives, is known to be absent, or the
    /// attempt budget runs out.
    async fn download<C: TileClient>(
        &self,
        client: &C,
        url_fmt: &UrlFormat,
        opts: FetchOptions<'_>,
    ) -> Result<Vec<u8>, RemoteError> {
        let attempts = opts.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let url = url_fmt
                .tile_url(self, opts.extension)
                .map_err(|e| RemoteError::Transient(format!("{:#}", e)))?;

            let res = match client.get(&url).await {
                Ok(response) => classify(response.status, response.body),
                Err(e) => Err(RemoteError::Transient(e.to_string())),
            };

            match res {
                Ok(body) => return Ok(body),
                Err(e) if !e.is_retryable() || attempt >= attempts => return Err(e),
                Err(e) => {
                    debug!(tile = %self, url = %url, attempt, error = %e, "tile request failed, retrying");
                }
            }

            tokio::time::sleep(opts.retry_delay).await;
        }
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

fn classify(status: StatusCode, body: Vec<u8>) -> Result<Vec<u8>, RemoteError> {
    match status {
        StatusCode::OK => Ok(body),
        StatusCode::NOT_FOUND => Err(RemoteError::NotFound),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            Err(RemoteError::Transient(format!("server answered {}", status)))
        }
        s if s.is_client_error() => Err(RemoteError::Client(s)),
        s => Err(RemoteError::Transient(format!("server answered {}", s))),
    }
}

async fn is_cached(path: &Path) -> bool {
    match fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}

/// Writes `body` next to `path` and renames it into place, so the final path
/// only ever holds a complete tile.
async fn write_atomic(path: &Path, body: &[u8]) -> Result<(), FetchError> {
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    if let Err(source) = fs::write(&temp_path, body).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(FetchError::Write {
            path: path.to_owned(),
            source,
        });
    }

    if let Err(source) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(FetchError::Write {
            path: path.to_owned(),
            source,
        });
    }

    Ok(())
}
