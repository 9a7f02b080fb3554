use std::time::Duration;

use tile_prefetcher::{Preset, MAX_LAT};

pub fn is_numeric_min(min: u8) -> impl Fn(&str) -> Result<u8, String> + Clone + Send + Sync + 'static {
    move |v: &str| {
        let val = v.parse::<u8>().map_err(|_| "must be numeric".to_owned())?;

        if val < min {
            return Err(format!("must be >= {}", min));
        }

        Ok(val)
    }
}

pub fn is_latitude(v: &str) -> Result<f64, String> {
    let val = v.parse::<f64>().map_err(|_| "must be numeric".to_owned())?;

    if !(-MAX_LAT..=MAX_LAT).contains(&val) {
        return Err(format!("must be within ±{:.4}°", MAX_LAT));
    }

    Ok(val)
}

pub fn is_longitude(v: &str) -> Result<f64, String> {
    let val = v.parse::<f64>().map_err(|_| "must be numeric".to_owned())?;

    if val < -180f64 {
        return Err("must be >= -180°".to_owned());
    } else if val > 180f64 {
        return Err("must be <= 180°".to_owned());
    }

    Ok(val)
}

/// Seconds, fractions allowed.
pub fn is_seconds(v: &str) -> Result<Duration, String> {
    let val = v.parse::<f64>().map_err(|_| "must be numeric".to_owned())?;

    Duration::try_from_secs_f64(val)
        .map_err(|_| "must be a positive number of seconds".to_owned())
}

pub fn is_preset(v: &str) -> Result<Preset, String> {
    v.parse::<Preset>()
        .map_err(|_| format!("invalid preset, expected one of: {}", Preset::NAMES.join(", ")))
}
