use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Repository tag docker reports for images that lost their name.
pub const NONE_TAG: &str = "<none>:<none>";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub repo_tags: Vec<String>,
    pub parent_id: Option<String>,
    pub size: u64,
    pub created: DateTime<Utc>,
}

impl ImageRecord {
    /// An image without a single `name:tag` reference.
    pub fn is_dangling(&self) -> bool {
        !self
            .repo_tags
            .iter()
            .any(|tag| tag != NONE_TAG && tag.contains(':'))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: String,
    pub image_id: String,
    pub running: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveOptions {
    pub force: bool,
    pub prune_children: bool,
}

/// One line of the runtime's answer to an image removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovedRef {
    Untagged(String),
    Deleted(String),
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub space_reclaimed: u64,
    pub deleted: Vec<String>,
}

/// Images and resolved containers seen at the start of a cycle.
#[derive(Debug, Default, Clone)]
pub struct Inventory {
    pub images: Vec<ImageRecord>,
    pub containers: Vec<ContainerRecord>,
}

/// A single removal to perform. Without a tag the whole image goes, by ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeletionEntry {
    pub image_id: String,
    pub tag: Option<String>,
    pub size: u64,
}

impl DeletionEntry {
    pub fn whole_image(image: &ImageRecord) -> Self {
        Self {
            image_id: image.id.clone(),
            tag: None,
            size: image.size,
        }
    }

    pub fn for_tag(image: &ImageRecord, tag: &str) -> Self {
        Self {
            image_id: image.id.clone(),
            tag: Some(tag.to_string()),
            size: image.size,
        }
    }

    /// Reference handed to the runtime.
    pub fn target(&self) -> &str {
        match self.tag.as_deref() {
            None | Some("") | Some(NONE_TAG) => &self.image_id,
            Some(tag) => tag,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetainReason {
    InUse { container_id: String },
    TooFresh,
    FilteredOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetentionDecision {
    Retain(RetainReason),
    // never empty
    Delete(Vec<DeletionEntry>),
}

impl RetentionDecision {
    pub fn entries(&self) -> &[DeletionEntry] {
        match self {
            RetentionDecision::Retain(_) => &[],
            RetentionDecision::Delete(entries) => entries,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, RetentionDecision::Delete(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDecision {
    pub image_id: String,
    pub decision: RetentionDecision,
}

/// What happened to images during a cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImagePhase {
    #[default]
    Disabled,
    PrunedAllUnused,
    Planned,
    // container listing failed, no usage information to decide with
    Skipped,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: String,
    pub image_phase: ImagePhase,
    pub decisions: Vec<ImageDecision>,
    pub deleted_count: usize,
    pub interval_reclaimed: u64,
    pub total_reclaimed: u64,
    pub pruned_containers: usize,
    pub pruned_volumes: usize,
    pub pruned_networks: usize,
}

impl CycleReport {
    /// Every entry selected for deletion this cycle, across images.
    pub fn worklist(&self) -> Vec<&DeletionEntry> {
        self.decisions
            .iter()
            .flat_map(|d| d.decision.entries())
            .collect()
    }
}
