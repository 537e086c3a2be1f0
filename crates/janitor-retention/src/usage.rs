use std::collections::HashMap;

use tracing::{debug, warn};

use crate::{ContainerRecord, ImageRecord};

/// ID -> image lookup built once per cycle. Parents are back-references only,
/// children are never indexed.
#[derive(Debug, Default)]
pub struct ImageIndex<'a> {
    by_id: HashMap<&'a str, &'a ImageRecord>,
}

impl<'a> ImageIndex<'a> {
    pub fn new(images: &'a [ImageRecord]) -> Self {
        Self {
            by_id: images.iter().map(|i| (i.id.as_str(), i)).collect(),
        }
    }

    pub fn get(&self, image_id: &str) -> Option<&'a ImageRecord> {
        self.by_id.get(image_id).copied()
    }

    /// Parent ID of an indexed image, if it has a non-empty one.
    pub fn parent_of(&self, image_id: &str) -> Option<&'a str> {
        self.get(image_id)
            .and_then(|image| image.parent_id.as_deref())
            .filter(|parent| !parent.is_empty())
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Images in use, each with one container that justifies keeping it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UsageSet {
    witnesses: HashMap<String, String>,
}

impl UsageSet {
    pub fn witness(&self, image_id: &str) -> Option<&str> {
        self.witnesses.get(image_id).map(String::as_str)
    }

    pub fn contains(&self, image_id: &str) -> bool {
        self.witnesses.contains_key(image_id)
    }

    pub fn len(&self) -> usize {
        self.witnesses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.witnesses.is_empty()
    }

    pub fn image_ids(&self) -> impl Iterator<Item = &str> {
        self.witnesses.keys().map(String::as_str)
    }

    // Returns false when the image already had a witness.
    fn mark(&mut self, image_id: &str, container_id: &str) -> bool {
        if self.witnesses.contains_key(image_id) {
            return false;
        }
        self.witnesses
            .insert(image_id.to_string(), container_id.to_string());
        true
    }
}

/// Marks every container's image as used, then walks up its parent chain.
///
/// The walk stops at the first empty parent or a parent missing from the
/// index (already removed by the runtime). It also stops at an image that is
/// already marked, since its ancestors were marked along with it. Parent
/// metadata is unchecked input, so the walk never takes more steps than there
/// are indexed images.
pub fn compute_used_images(images: &[ImageRecord], containers: &[ContainerRecord]) -> UsageSet {
    let index = ImageIndex::new(images);
    let mut used = UsageSet::default();

    for container in containers {
        if !used.mark(&container.image_id, &container.id) {
            continue;
        }

        let mut current = container.image_id.as_str();
        let mut steps = 0;
        while let Some(parent) = index.parent_of(current) {
            if index.get(parent).is_none() {
                debug!(image_id = %current, %parent, "Parent image no longer exists on host");
                break;
            }
            if steps >= index.len() {
                warn!(
                    container_id = %container.id,
                    image_id = %container.image_id,
                    "Parent chain longer than the image list, stopping ancestor walk"
                );
                break;
            }
            if !used.mark(parent, &container.id) {
                break;
            }
            current = parent;
            steps += 1;
        }
    }

    debug!(used = used.len(), images = images.len(), "Computed images in use");
    used
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn image(id: &str, parent: Option<&str>) -> ImageRecord {
        ImageRecord {
            id: id.to_string(),
            repo_tags: vec![],
            parent_id: parent.map(str::to_string),
            size: 1,
            created: Utc::now(),
        }
    }

    fn container(id: &str, image_id: &str) -> ContainerRecord {
        ContainerRecord {
            id: id.to_string(),
            image_id: image_id.to_string(),
            running: true,
        }
    }

    #[test]
    fn test_ancestors_marked_with_same_witness() {
        let images = vec![
            image("m1", Some("")),
            image("m2", Some("m1")),
            image("m3", Some("m2")),
            image("other", None),
        ];
        let used = compute_used_images(&images, &[container("c1", "m3")]);

        assert_eq!(used.len(), 3);
        for id in ["m1", "m2", "m3"] {
            assert_eq!(used.witness(id), Some("c1"), "{id} should be used by c1");
        }
        assert!(!used.contains("other"));
    }

    #[test]
    fn test_walk_stops_at_missing_parent() {
        let images = vec![image("child", Some("gone")), image("root", None)];
        let used = compute_used_images(&images, &[container("c1", "child")]);

        assert!(used.contains("child"));
        assert!(!used.contains("gone"));
        assert!(!used.contains("root"));
    }

    #[test]
    fn test_unknown_container_image_is_still_marked() {
        let used = compute_used_images(&[], &[container("c1", "sha256:not-listed")]);
        assert_eq!(used.witness("sha256:not-listed"), Some("c1"));
    }

    #[test]
    fn test_first_container_stays_witness() {
        let images = vec![image("base", None), image("app", Some("base"))];
        let used = compute_used_images(
            &images,
            &[container("c1", "base"), container("c2", "app")],
        );

        assert_eq!(used.witness("base"), Some("c1"));
        assert_eq!(used.witness("app"), Some("c2"));
    }

    #[test]
    fn test_cyclic_parents_terminate() {
        let images = vec![image("a", Some("b")), image("b", Some("c")), image("c", Some("a"))];
        let used = compute_used_images(&images, &[container("c1", "a")]);
        assert_eq!(used.len(), 3);
    }

    #[test]
    fn test_index_parent_of_ignores_empty() {
        let images = vec![image("a", Some("")), image("b", Some("a"))];
        let index = ImageIndex::new(&images);
        assert_eq!(index.parent_of("a"), None);
        assert_eq!(index.parent_of("b"), Some("a"));
        assert_eq!(index.parent_of("missing"), None);
        assert_eq!(index.len(), 2);
    }
}
