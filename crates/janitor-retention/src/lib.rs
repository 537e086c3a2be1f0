// Image retention engine - decides which unused images and tags may be removed
use thiserror::Error;

mod executor;
mod filter;
mod inventory;
mod janitor;
mod planner;
mod runtime;
mod types;
mod usage;

pub use executor::{delete_entries, delete_entry, DeletionOutcome};
pub use filter::{select_deletable_tags, split_repo_tag};
pub use inventory::collect_inventory;
pub use janitor::{format_megabytes, Janitor};
pub use planner::{plan_retention, prunable_dangling, RetentionPolicy};
pub use runtime::{InMemoryRuntime, RuntimeClient};
pub use types::*;
pub use usage::{compute_used_images, ImageIndex, UsageSet};

pub use janitor_common as common;

// Error Types
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Runtime request failed: {0}")]
    Request(String),
    #[error("No such image: {0}")]
    ImageNotFound(String),
    #[error("No such container: {0}")]
    ContainerNotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

