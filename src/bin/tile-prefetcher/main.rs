mod args;
mod validators;

use anyhow::Result;
use args::Args;
use tile_prefetcher::{cache_size, fetch, Config};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let args = Args::parse();
    let dry_run = args.dry_run;
    let config = Config::try_from(args)?;
    config.validate()?;

    print_plan(&config);

    if dry_run {
        return Ok(());
    }

    let output_folder = config.output_folder.clone();
    let extension = config.extension.clone();

    let summary = fetch(config).await?;

    eprintln!();
    eprintln!("{}", summary);
    match cache_size(&output_folder, &extension) {
        Ok(size) => eprintln!(
            "cache size: {}",
            pretty_bytes::converter::convert(size as f64)
        ),
        Err(e) => warn!(error = %e, "failed measuring cache size"),
    }
    eprintln!("tiles saved in {}", output_folder.display());

    Ok(())
}

/// Logs go to stderr, filtered by `RUST_LOG` (default `info`).
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_plan(config: &Config) {
    for range in config.tile_ranges() {
        eprintln!(
            "zoom {:2}: {:7} tiles (x: {}-{}, y: {}-{})",
            range.z,
            range.count(),
            range.x_min,
            range.x_max,
            range.y_min,
            range.y_max
        );
    }

    eprintln!(
        "would download {} tiles (approx {}, assuming 10 kb per tile, at least {} min)",
        config.tile_count(),
        pretty_bytes::converter::convert(config.estimated_size()),
        (config.estimated_duration().as_secs_f64() / 60f64).round()
    );
}
