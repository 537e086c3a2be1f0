// Shared option and filter types for the janitor crates

use std::collections::BTreeSet;
use std::time::Duration;

pub use serde::{Deserialize, Serialize};
use thiserror::Error;

mod config;

pub use config::{parse_filter_list, parse_freshness, parse_interval};

#[derive(Error, Debug)]
pub enum JanitorError {
    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Invalid duration {value:?}: {source}")]
    InvalidDuration {
        value: String,
        #[source]
        source: humantime::DurationError,
    },
}

pub type Result<T> = std::result::Result<T, JanitorError>;

/// Set of user supplied exclusion strings. Empty means the filter is disabled.
pub type Filter = BTreeSet<String>;

/// Exclusion rules applied to the repository tags of unused images.
///
/// fullname: `my.repo.com/ki/base/system:latest` (exact match)
/// name:     `my.repo.com/ki/base/system` (substring match)
/// tag:      `latest` (substring match)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    pub fullname: Filter,
    pub name: Filter,
    pub tag: Filter,
}

impl Filters {
    pub fn from_lists(fullnames: &str, names: &str, tags: &str) -> Self {
        Self {
            fullname: parse_filter_list(fullnames),
            name: parse_filter_list(names),
            tag: parse_filter_list(tags),
        }
    }

    /// True when no exclusion of any kind is configured.
    pub fn is_empty(&self) -> bool {
        self.fullname.is_empty() && self.name.is_empty() && self.tag.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Options {
    // Compute and log decisions, never mutate the host
    pub dry_run: bool,
    pub clear_containers: bool,
    pub clear_volumes: bool,
    pub clear_networks: bool,
    pub clear_images: bool,
    pub filters: Filters,
    // Unused images younger than this are kept. None disables the check.
    pub freshness: Option<Duration>,
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dry_run: false,
            clear_containers: false,
            clear_volumes: false,
            clear_networks: false,
            clear_images: false,
            filters: Filters::default(),
            freshness: None,
            interval: Duration::from_secs(12 * 60 * 60),
        }
    }
}

impl Options {
    pub fn any_cleaner_enabled(&self) -> bool {
        self.clear_containers || self.clear_volumes || self.clear_networks || self.clear_images
    }

    pub fn filters_enabled(&self) -> bool {
        !self.filters.is_empty()
    }

    /// With neither freshness nor filters every unused image can go in one prune call.
    pub fn prunes_all_unused_images(&self) -> bool {
        self.freshness.is_none() && !self.filters_enabled()
    }
}
