use clap::builder::BoolishValueParser;
use clap::Parser;
use janitor_common::{parse_freshness, parse_interval, Filters, Options, Result};

/// Every flag can also be set through the environment variable named next to it.
#[derive(Parser, Debug)]
#[command(name = "docker-janitor", version, about = "Removes unused docker containers, volumes, networks and images")]
pub struct Args {
    /// Execute clean task once and exit
    #[arg(long, env = "ONCE", value_parser = BoolishValueParser::new())]
    pub once: bool,

    /// Sets log level to debug
    #[arg(long, env = "DEBUG", value_parser = BoolishValueParser::new())]
    pub debug: bool,

    /// Do not change anything, just print what would be done
    #[arg(long, env = "DRY_RUN", value_parser = BoolishValueParser::new())]
    pub dry_run: bool,

    /// Clear unused containers, same as "docker container prune"
    #[arg(long, env = "CLEAR_CONTAINERS", value_parser = BoolishValueParser::new())]
    pub clear_containers: bool,

    /// Clear unused networks, same as "docker network prune"
    #[arg(long, env = "CLEAR_NETWORKS", value_parser = BoolishValueParser::new())]
    pub clear_networks: bool,

    /// Clear unused volumes, same as "docker volume prune"
    #[arg(long, env = "CLEAR_VOLUMES", value_parser = BoolishValueParser::new())]
    pub clear_volumes: bool,

    /// Clear unused images, same as "docker image prune -a"
    #[arg(long, env = "CLEAR_IMAGES", value_parser = BoolishValueParser::new())]
    pub clear_images: bool,

    /// Comma separated image fullnames (repo[:port]/path:tag) to keep, e.g.
    /// registry.domain:9000/path/name:v1.0.0
    #[arg(long, env = "EXCLUDE_FULLNAMES", default_value = "")]
    pub exclude_fullnames: String,

    /// Comma separated image name substrings (repo[:port]/path) to keep, e.g.
    /// registry.domain/path/name,ubuntu
    #[arg(long, env = "EXCLUDE_NAMES", default_value = "")]
    pub exclude_names: String,

    /// Comma separated tag substrings to keep, e.g. latest,stable,5.22
    #[arg(long, env = "EXCLUDE_TAGS", default_value = "")]
    pub exclude_tags: String,

    /// Keep unused images created within this period (e.g. 24h). Empty disables it
    #[arg(long, env = "FRESHNESS", default_value = "")]
    pub freshness: String,

    /// Interval to check on unused elements
    #[arg(long, env = "INTERVAL", default_value = "12h")]
    pub interval: String,
}

impl Args {
    pub fn options(&self) -> Result<Options> {
        Ok(Options {
            dry_run: self.dry_run,
            clear_containers: self.clear_containers,
            clear_volumes: self.clear_volumes,
            clear_networks: self.clear_networks,
            clear_images: self.clear_images,
            filters: Filters::from_lists(
                &self.exclude_fullnames,
                &self.exclude_names,
                &self.exclude_tags,
            ),
            freshness: parse_freshness(&self.freshness)?,
            interval: parse_interval(&self.interval)?,
        })
    }
}
