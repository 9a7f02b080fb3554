use anyhow::{Context, Result};
use maplit::hashmap;
use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};
use strfmt::strfmt;

use crate::tile::Tile;

/// The mirrors `{s}` rotates through unless told otherwise.
pub const OSM_SERVERS: &[&str] = &["a", "b", "c"];

/// A tile URL template with `{s}`, `{z}`, `{x}`, `{y}` and `{ext}` placeholders.
///
/// `{s}` is replaced with the configured subdomains in turn, one per request,
/// to spread the load over the server's mirrors.
pub struct UrlFormat {
    inc: AtomicUsize,
    format_str: String,
    subdomains: Vec<String>,
}

impl UrlFormat {
    /// Creates a format rotating over the default OSM mirrors `a`, `b` and `c`.
    pub fn from_string(format_str: String) -> Self {
        Self::with_subdomains(
            format_str,
            OSM_SERVERS.iter().map(|s| (*s).to_owned()).collect(),
        )
    }

    pub fn with_subdomains(format_str: String, subdomains: Vec<String>) -> Self {
        Self {
            inc: AtomicUsize::new(0),
            format_str,
            subdomains,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.format_str
    }

    pub fn subdomains(&self) -> &[String] {
        &self.subdomains
    }

    fn get_inc(&self) -> usize {
        self.inc.fetch_add(1, Ordering::Relaxed)
    }

    pub fn tile_url(&self, tile: &Tile, extension: &str) -> Result<String> {
        let subdomain = if self.subdomains.is_empty() {
            None
        } else {
            let inc = self.get_inc();
            Some(self.subdomains[inc % self.subdomains.len()].as_str())
        };

        self.format(tile, extension, subdomain)
    }

    /// Fails if the template can't be filled in. Leaves the mirror rotation alone.
    pub fn check(&self, extension: &str) -> Result<()> {
        let subdomain = self.subdomains.first().map(String::as_str);
        self.format(&Tile::new(0, 0, 0), extension, subdomain)?;

        Ok(())
    }

    fn format(&self, tile: &Tile, extension: &str, subdomain: Option<&str>) -> Result<String> {
        let mut vars = hashmap! {
            "x".to_owned() => tile.x.to_string(),
            "y".to_owned() => tile.y.to_string(),
            "z".to_owned() => tile.z.to_string(),
            "ext".to_owned() => extension.to_owned(),
        };
        if let Some(s) = subdomain {
            vars.insert("s".to_owned(), s.to_owned());
        }

        strfmt(&self.format_str, &vars)
            .with_context(|| format!("failed formatting URL for tile {}", tile))
    }
}

impl PartialEq for UrlFormat {
    fn eq(&self, other: &Self) -> bool {
        self.format_str == other.format_str && self.subdomains == other.subdomains
    }
}

impl fmt::Debug for UrlFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlFormat")
            .field("format_str", &self.format_str)
            .field("subdomains", &self.subdomains)
            .finish()
    }
}
