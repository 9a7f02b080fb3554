use anyhow::{Context, Result};
use clap::{command, Arg, ArgAction, ArgMatches};
use std::{path::PathBuf, time::Duration};

use crate::validators::*;
use tile_prefetcher::{BoundingBox, Config, Preset, UrlFormat, MAX_CONCURRENCY};

const PRESET_ARG: &str = "preset";
const BBOX_NORTH_ARG: &str = "north";
const BBOX_SOUTH_ARG: &str = "south";
const BBOX_WEST_ARG: &str = "west";
const BBOX_EAST_ARG: &str = "east";
const ZOOM_ARG: &str = "zoom";
const MIN_ZOOM_ARG: &str = "min_zoom";
const MAX_ZOOM_ARG: &str = "max_zoom";
const OUTPUT_DIR_ARG: &str = "output_dir";
const URL_ARG: &str = "url";
const SUBDOMAINS_ARG: &str = "subdomains";
const EXTENSION_ARG: &str = "extension";
const TIMEOUT_ARG: &str = "timeout";
const REQUEST_RETRIES_ARG: &str = "num_retries";
const RETRY_DELAY_ARG: &str = "retry_delay";
const DELAY_ARG: &str = "delay";
const PARALLEL_FETCHES_ARG: &str = "num_parallel";
const USER_AGENT_ARG: &str = "user_agent";
const FETCH_EXISTING_ARG: &str = "should_fetch_existing";
const DRY_RUN_ARG: &str = "dry_run";
const NO_PROGRESS_ARG: &str = "no_progress";

/// Command line settings. Everything left unset falls back to the preset,
/// or to the library defaults when no preset is given.
#[derive(Debug, Default)]
pub struct Args {
    pub preset: Option<Preset>,
    pub north: Option<f64>,
    pub south: Option<f64>,
    pub east: Option<f64>,
    pub west: Option<f64>,
    pub min_zoom: Option<u8>,
    pub max_zoom: Option<u8>,
    pub output_dir: Option<PathBuf>,
    pub url: Option<String>,
    pub subdomains: Option<Vec<String>>,
    pub extension: Option<String>,
    pub timeout: Option<Duration>,
    pub attempts: Option<u8>,
    pub retry_delay: Option<Duration>,
    pub delay: Option<Duration>,
    pub parallel_fetches: Option<u8>,
    pub user_agent: Option<String>,
    pub fetch_existing: bool,
    pub dry_run: bool,
    pub show_progress: bool,
}

impl std::convert::TryFrom<Args> for Config {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> Result<Self> {
        let (mut lat_min, mut lat_max, mut lon_min, mut lon_max) = match args.preset {
            Some(preset) => {
                let bbox = BoundingBox::from(preset);
                (
                    Some(bbox.lat_min),
                    Some(bbox.lat_max),
                    Some(bbox.lon_min),
                    Some(bbox.lon_max),
                )
            }
            None => (None, None, None, None),
        };
        // explicit edges win over the preset's
        lat_min = args.south.or(lat_min);
        lat_max = args.north.or(lat_max);
        lon_min = args.west.or(lon_min);
        lon_max = args.east.or(lon_max);

        let bounding_box = BoundingBox::new(
            lat_min.context("missing southern edge")?,
            lat_max.context("missing northern edge")?,
            lon_min.context("missing western edge")?,
            lon_max.context("missing eastern edge")?,
        )
        .context("invalid bounding box")?;

        let mut config = match args.preset {
            Some(preset) => Config {
                bounding_box,
                ..Config::from_preset(preset)
            },
            None => Config::new(bounding_box, 1, 18),
        };

        if let Some(min_zoom) = args.min_zoom {
            config.min_zoom = min_zoom;
        }
        if let Some(max_zoom) = args.max_zoom {
            config.max_zoom = max_zoom;
        }
        if let Some(output_dir) = args.output_dir {
            config.output_folder = output_dir;
        }
        if args.url.is_some() || args.subdomains.is_some() {
            let url = args
                .url
                .unwrap_or_else(|| config.url.as_str().to_owned());
            let subdomains = args
                .subdomains
                .unwrap_or_else(|| config.url.subdomains().to_vec());
            config.url = UrlFormat::with_subdomains(url, subdomains);
        }
        if let Some(extension) = args.extension {
            config.extension = extension;
        }
        if let Some(timeout) = args.timeout {
            config.timeout = timeout;
        }
        if let Some(attempts) = args.attempts {
            config.max_attempts = attempts;
        }
        if let Some(retry_delay) = args.retry_delay {
            config.retry_delay = retry_delay;
        }
        if let Some(delay) = args.delay {
            config.delay = delay;
        }
        if let Some(parallel) = args.parallel_fetches {
            config.concurrency = parallel;
        }
        if let Some(user_agent) = args.user_agent {
            config.user_agent = user_agent;
        }
        config.force = args.fetch_existing;
        config.show_progress = args.show_progress;

        Ok(config)
    }
}

impl Args {
    pub fn parse() -> Self {
        Self::from_matches(&get_matches())
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        let (min_zoom, max_zoom) = match matches.get_one::<u8>(ZOOM_ARG) {
            // if `zoom` is set, use it for both min/max
            Some(zoom) => (Some(*zoom), Some(*zoom)),
            // otherwise, parse min/max separately
            None => (
                matches.get_one::<u8>(MIN_ZOOM_ARG).copied(),
                matches.get_one::<u8>(MAX_ZOOM_ARG).copied(),
            ),
        };

        Self {
            preset: matches.get_one::<Preset>(PRESET_ARG).copied(),
            north: matches.get_one::<f64>(BBOX_NORTH_ARG).copied(),
            south: matches.get_one::<f64>(BBOX_SOUTH_ARG).copied(),
            east: matches.get_one::<f64>(BBOX_EAST_ARG).copied(),
            west: matches.get_one::<f64>(BBOX_WEST_ARG).copied(),
            min_zoom,
            max_zoom,
            output_dir: matches.get_one::<String>(OUTPUT_DIR_ARG).map(PathBuf::from),
            url: matches.get_one::<String>(URL_ARG).cloned(),
            subdomains: matches
                .get_many::<String>(SUBDOMAINS_ARG)
                .map(|vals| vals.filter(|s| !s.is_empty()).cloned().collect()),
            extension: matches.get_one::<String>(EXTENSION_ARG).cloned(),
            timeout: matches.get_one::<Duration>(TIMEOUT_ARG).copied(),
            attempts: matches.get_one::<u8>(REQUEST_RETRIES_ARG).copied(),
            retry_delay: matches.get_one::<Duration>(RETRY_DELAY_ARG).copied(),
            delay: matches.get_one::<Duration>(DELAY_ARG).copied(),
            parallel_fetches: matches.get_one::<u8>(PARALLEL_FETCHES_ARG).copied(),
            user_agent: matches.get_one::<String>(USER_AGENT_ARG).cloned(),
            fetch_existing: matches.get_flag(FETCH_EXISTING_ARG),
            dry_run: matches.get_flag(DRY_RUN_ARG),
            show_progress: !matches.get_flag(NO_PROGRESS_ARG),
        }
    }
}

fn get_matches() -> ArgMatches {
    cli().get_matches()
}

fn cli() -> clap::Command {
    command!()
        .arg(
            Arg::new(PRESET_ARG)
                .help(format!(
                    "Use a known area and its download settings ({})",
                    Preset::NAMES.join(", ")
                ))
                .value_parser(is_preset)
                .short('p')
                .long("preset"),
        )
        .arg(
            Arg::new(BBOX_NORTH_ARG)
                .help("Latitude of north bounding box boundary (in degrees)")
                .required_unless_present(PRESET_ARG)
                .value_parser(is_latitude)
                .allow_negative_numbers(true)
                .short('n')
                .long("north"),
        )
        .arg(
            Arg::new(BBOX_SOUTH_ARG)
                .help("Latitude of south bounding box boundary (in degrees)")
                .required_unless_present(PRESET_ARG)
                .value_parser(is_latitude)
                .allow_negative_numbers(true)
                .short('s')
                .long("south"),
        )
        .arg(
            Arg::new(BBOX_EAST_ARG)
                .help("Longitude of east bounding box boundary (in degrees)")
                .required_unless_present(PRESET_ARG)
                .value_parser(is_longitude)
                .allow_negative_numbers(true)
                .short('e')
                .long("east"),
        )
        .arg(
            Arg::new(BBOX_WEST_ARG)
                .help("Longitude of west bounding box boundary (in degrees)")
                .required_unless_present(PRESET_ARG)
                .value_parser(is_longitude)
                .allow_negative_numbers(true)
                .short('w')
                .long("west"),
        )
        .arg(
            Arg::new(MIN_ZOOM_ARG)
                .help("The minimum zoom level to fetch [default: 1]")
                .value_parser(is_numeric_min(0))
                .conflicts_with(ZOOM_ARG)
                .long("min-zoom"),
        )
        .arg(
            Arg::new(MAX_ZOOM_ARG)
                .help("The maximum zoom level to fetch, at most 19 [default: 18]")
                .value_parser(is_numeric_min(0))
                .conflicts_with(ZOOM_ARG)
                .long("max-zoom"),
        )
        .arg(
            Arg::new(ZOOM_ARG)
                .help("Only fetch a single zoom level (implies min=x/max=x)")
                .value_parser(is_numeric_min(0))
                .short('z')
                .long("zoom"),
        )
        .arg(
            Arg::new(OUTPUT_DIR_ARG)
                .help("The folder to output the tiles to, laid out as {z}/{x}/{y}.{ext} [default: tiles/osm]")
                .short('o')
                .long("output"),
        )
        .arg(
            Arg::new(URL_ARG)
                .help("The URL with format specifiers `{x}`, `{y}`, `{z}` and `{ext}` to fetch the tiles from. Also supports the format specifier `{s}` which is replaced with the subdomains in turn to spread the load between different servers.")
                .short('u')
                .long("url"),
        )
        .arg(
            Arg::new(SUBDOMAINS_ARG)
                .help("Comma separated subdomains substituted for `{s}` [default: a,b,c]")
                .value_delimiter(',')
                .long("subdomains"),
        )
        .arg(
            Arg::new(EXTENSION_ARG)
                .help("File extension of the tiles [default: png]")
                .long("ext"),
        )
        .arg(
            Arg::new(TIMEOUT_ARG)
                .help("The timeout (in seconds) for fetching a single tile. Pass 0 for no timeout. [default: 30]")
                .value_parser(is_seconds)
                .short('t')
                .long("timeout"),
        )
        .arg(
            Arg::new(REQUEST_RETRIES_ARG)
                .help("The amount of requests made for a tile before giving up. [default: 3]")
                .value_parser(is_numeric_min(1))
                .long("retries"),
        )
        .arg(
            Arg::new(RETRY_DELAY_ARG)
                .help("Seconds to wait between two requests for the same tile. [default: 1]")
                .value_parser(is_seconds)
                .long("retry-delay"),
        )
        .arg(
            Arg::new(DELAY_ARG)
                .help("Seconds each worker waits after a downloaded tile. [default: 0.25]")
                .value_parser(is_seconds)
                .short('d')
                .long("delay"),
        )
        .arg(
            Arg::new(PARALLEL_FETCHES_ARG)
                .help(format!(
                    "The amount of tiles fetched in parallel, at most {}. [default: 1]",
                    MAX_CONCURRENCY
                ))
                .value_parser(is_numeric_min(1))
                .short('r')
                .long("rate"),
        )
        .arg(
            Arg::new(USER_AGENT_ARG)
                .help("User-Agent header naming this client and a contact, as tile usage policies require")
                .long("user-agent"),
        )
        .arg(
            Arg::new(FETCH_EXISTING_ARG)
                .help("Fetch tiles that we've already downloaded (this usually isn't required)")
                .action(ArgAction::SetTrue)
                .long("fetch-existing"),
        )
        .arg(
            Arg::new(DRY_RUN_ARG)
                .help("Don't actually fetch anything, just determine how many tiles would be fetched.")
                .action(ArgAction::SetTrue)
                .long("dry-run"),
        )
        .arg(
            Arg::new(NO_PROGRESS_ARG)
                .help("Don't render a progress bar")
                .action(ArgAction::SetTrue)
                .long("no-progress"),
        )
}
