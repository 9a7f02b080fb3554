use std::fmt::Debug;
use thiserror::Error;

use crate::tile::{lat_lon_to_tile, Tile};

/// Northern and southern limit of the Web-Mercator projection, in degrees.
pub const MAX_LAT: f64 = 85.051_128_78;
pub const MIN_LAT: f64 = -MAX_LAT;

#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum BoundingBoxError {
    #[error("latitude {0}° is outside the Mercator range ±85.0511°")]
    Latitude(f64),

    #[error("longitude {0}° is outside [-180°, 180°]")]
    Longitude(f64),

    #[error("minimum latitude {0}° must be below maximum latitude {1}°")]
    LatitudeOrder(f64, f64),

    #[error("minimum longitude {0}° must be below maximum longitude {1}°")]
    LongitudeOrder(f64, f64),
}

/// A bounding box in degrees.
///
/// # Example
/// ```rust
/// # use tile_prefetcher::BoundingBox;
/// let antananarivo = BoundingBox::new(-18.95, -18.80, 47.48, 47.58).unwrap();
/// assert_eq!(antananarivo.tile_range(10).count(), 1);
/// ```
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

/// Inclusive range of tile indices covering a bounding box at one zoom level.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TileRange {
    pub z: u8,
    pub x_min: u32,
    pub x_max: u32,
    pub y_min: u32,
    pub y_max: u32,
}

impl BoundingBox {
    /// Create a new bounding box from its southern, northern, western and
    /// eastern edges.
    pub fn new(
        lat_min: f64,
        lat_max: f64,
        lon_min: f64,
        lon_max: f64,
    ) -> Result<Self, BoundingBoxError> {
        for lat in [lat_min, lat_max] {
            if !(MIN_LAT..=MAX_LAT).contains(&lat) {
                return Err(BoundingBoxError::Latitude(lat));
            }
        }
        for lon in [lon_min, lon_max] {
            if !(-180_f64..=180_f64).contains(&lon) {
                return Err(BoundingBoxError::Longitude(lon));
            }
        }
        // also rejects NaN
        if !(lat_min < lat_max) {
            return Err(BoundingBoxError::LatitudeOrder(lat_min, lat_max));
        }
        if !(lon_min < lon_max) {
            return Err(BoundingBoxError::LongitudeOrder(lon_min, lon_max));
        }

        Ok(BoundingBox {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        })
    }

    /// Computes the tiles covering the box at `zoom`.
    ///
    /// The northwest corner yields the smallest indices since y grows towards
    /// the south. Indices saturate at `u32::MAX` beyond zoom 32, far past
    /// anything a tile server serves.
    pub fn tile_range(&self, zoom: u8) -> TileRange {
        let nw = lat_lon_to_tile(self.lat_max, self.lon_min, zoom);
        let se = lat_lon_to_tile(self.lat_min, self.lon_max, zoom);

        // an edge on 180° E or the southern limit lands one past the last tile
        let last = 1u64
            .checked_shl(zoom as u32)
            .map_or(u32::MAX, |n| (n - 1).min(u32::MAX as u64) as u32);

        TileRange {
            z: zoom,
            x_min: nw.x.min(last),
            x_max: se.x.min(last),
            y_min: nw.y.min(last),
            y_max: se.y.min(last),
        }
    }

    /// Tile ranges for every zoom level from `min_zoom` to `max_zoom` inclusive.
    pub fn tile_ranges(
        &self,
        min_zoom: u8,
        max_zoom: u8,
    ) -> impl Iterator<Item = TileRange> + Debug + Clone {
        let bbox = *self;
        (min_zoom..=max_zoom).map(move |zoom| bbox.tile_range(zoom))
    }

    /// Creates an iterator iterating over all tiles in the bounding box.
    pub fn tiles(&self, min_zoom: u8, max_zoom: u8) -> impl Iterator<Item = Tile> + Debug {
        self.tile_ranges(min_zoom, max_zoom)
            .flat_map(|range| range.tiles())
    }
}

impl TileRange {
    /// Number of tiles in the range, saturating at `u64::MAX`.
    pub fn count(&self) -> u64 {
        let columns = self.x_max as u64 - self.x_min as u64 + 1;
        let rows = self.y_max as u64 - self.y_min as u64 + 1;
        columns.saturating_mul(rows)
    }

    pub fn contains(&self, tile: &Tile) -> bool {
        tile.z == self.z
            && (self.x_min..=self.x_max).contains(&tile.x)
            && (self.y_min..=self.y_max).contains(&tile.y)
    }

    /// Iterates columns first, then the rows within each column.
    pub fn tiles(&self) -> impl Iterator<Item = Tile> + Debug {
        let TileRange {
            z,
            x_min,
            x_max,
            y_min,
            y_max,
        } = *self;

        (x_min..=x_max).flat_map(move |x| (y_min..=y_max).map(move |y| Tile::new(x, y, z)))
    }
}

/// A named set of run settings for a known area, consolidating the cache
/// layouts this tool has been used to build.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Preset {
    /// Antananarivo city centre, z10-16, rotating over the a/b/c mirrors.
    Antananarivo,
    /// The whole Antananarivo agglomeration, same strategy as the centre.
    AntananarivoExtended,
    /// Wide offline area around Antananarivo, z5-19 from the main host.
    AntananarivoOffline,
}

impl Preset {
    pub const NAMES: &'static [&'static str] = &[
        "antananarivo",
        "antananarivo-extended",
        "antananarivo-offline",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Preset::Antananarivo => Self::NAMES[0],
            Preset::AntananarivoExtended => Self::NAMES[1],
            Preset::AntananarivoOffline => Self::NAMES[2],
        }
    }

    /// Edges as (lat_min, lat_max, lon_min, lon_max).
    fn edges(&self) -> (f64, f64, f64, f64) {
        match self {
            Preset::Antananarivo => (-18.95, -18.80, 47.48, 47.58),
            Preset::AntananarivoExtended => (-19.10, -18.70, 47.30, 47.70),
            Preset::AntananarivoOffline => (-19.05, -18.75, 47.35, 47.65),
        }
    }
}

impl std::str::FromStr for Preset {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "antananarivo" | "tana" => Ok(Preset::Antananarivo),
            "antananarivo-extended" | "tana-extended" => Ok(Preset::AntananarivoExtended),
            "antananarivo-offline" | "tana-offline" => Ok(Preset::AntananarivoOffline),
            _ => Err("unrecognized preset"),
        }
    }
}

impl std::convert::From<Preset> for BoundingBox {
    fn from(preset: Preset) -> Self {
        let (lat_min, lat_max, lon_min, lon_max) = preset.edges();
        BoundingBox {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        }
    }
}
