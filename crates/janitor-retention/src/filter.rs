use std::collections::BTreeMap;

use janitor_common::Filters;
use tracing::debug;

use crate::{DeletionEntry, ImageRecord};

/// Split `repo[:port]/path:tag` at the last colon into name and tag.
pub fn split_repo_tag(reference: &str) -> Option<(&str, &str)> {
    reference.rsplit_once(':')
}

/// Tags of `image` that survive the exclusion filters, sorted by tag.
///
/// A tag is kept back when, checked in this order, its full reference equals
/// a fullname filter, its name contains a name filter, or its tag contains a
/// tag filter. Every surviving tag carries the full image size.
pub fn select_deletable_tags(filters: &Filters, image: &ImageRecord) -> Vec<DeletionEntry> {
    let mut repo_tags = BTreeMap::new();
    for reference in &image.repo_tags {
        match split_repo_tag(reference) {
            Some((name, tag)) => {
                debug!(image_id = %image.id, %reference, %name, %tag, "Image tag parts");
                repo_tags.insert(reference.as_str(), (name, tag));
            }
            None => debug!(image_id = %image.id, %reference, "Tag has invalid format"),
        }
    }

    repo_tags
        .into_iter()
        .filter(|(reference, (name, tag))| !is_excluded(filters, reference, name, tag))
        .map(|(reference, _)| DeletionEntry::for_tag(image, reference))
        .collect()
}

fn is_excluded(filters: &Filters, reference: &str, name: &str, tag: &str) -> bool {
    if filters.fullname.contains(reference) {
        debug!(%reference, "Image was fully filtered");
        return true;
    }

    if let Some(filter) = filters.name.iter().find(|f| name.contains(f.as_str())) {
        debug!(%name, %filter, "Name was filtered");
        return true;
    }

    if let Some(filter) = filters.tag.iter().find(|f| tag.contains(f.as_str())) {
        debug!(%tag, %filter, "Tag was filtered");
        return true;
    }

    false
}
