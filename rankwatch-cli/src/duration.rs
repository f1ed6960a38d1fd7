use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Suffix to seconds multiplier (longer suffixes first so "ms" wins over "s")
const UNITS: &[(&str, f64)] = &[
    ("ms", 1e-3),
    ("us", 1e-6),
    ("µs", 1e-6),
    ("m", 60.0),
    ("s", 1.0),
];

/// Parse durations like "30s", "250ms", "2m" or a bare number of seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let (number, scale) = UNITS
        .iter()
        .find_map(|(suffix, scale)| s.strip_suffix(suffix).map(|n| (n, *scale)))
        .unwrap_or((s, 1.0));

    let value: f64 = number
        .trim()
        .parse()
        .with_context(|| format!("invalid duration: {:?}", s))?;
    if !value.is_finite() || value < 0.0 {
        bail!("duration must be a non-negative number: {:?}", s);
    }
    Duration::try_from_secs_f64(value * scale)
        .with_context(|| format!("duration out of range: {:?}", s))
}
