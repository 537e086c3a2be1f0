use std::time::Duration;

use tracing::debug;

use crate::{Filter, JanitorError, Result};

/// Split a comma separated list into a filter set. Blank items are dropped,
/// an empty substring would otherwise match every image.
pub fn parse_filter_list(raw: &str) -> Filter {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_interval(raw: &str) -> Result<Duration> {
    let interval = parse_duration(raw)?;
    if interval.is_zero() {
        return Err(JanitorError::Config(format!(
            "interval must be greater than zero, got {raw:?}"
        )));
    }
    Ok(interval)
}

/// An empty value disables the freshness check.
pub fn parse_freshness(raw: &str) -> Result<Option<Duration>> {
    if raw.trim().is_empty() {
        debug!("Freshness isn't set, unused images are deleted regardless of age");
        return Ok(None);
    }
    parse_duration(raw).map(Some)
}

fn parse_duration(raw: &str) -> Result<Duration> {
    humantime::parse_duration(raw.trim()).map_err(|source| JanitorError::InvalidDuration {
        value: raw.to_string(),
        source,
    })
}
