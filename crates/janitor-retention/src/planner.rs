use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use janitor_common::Filters;
use tracing::debug;

use crate::{
    select_deletable_tags, DeletionEntry, ImageDecision, ImageRecord, RetainReason,
    RetentionDecision, UsageSet,
};

/// Freshness cutoff and exclusion filters for one decision cycle.
#[derive(Debug, Clone)]
pub struct RetentionPolicy<'a> {
    filters: &'a Filters,
    fresh_after: Option<DateTime<Utc>>,
}

impl<'a> RetentionPolicy<'a> {
    pub fn new(filters: &'a Filters, freshness: Option<Duration>, now: DateTime<Utc>) -> Self {
        // a window too large to subtract protects everything
        let fresh_after = freshness.map(|window| {
            chrono::Duration::from_std(window)
                .ok()
                .and_then(|window| now.checked_sub_signed(window))
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        });
        Self {
            filters,
            fresh_after,
        }
    }

    pub fn is_fresh(&self, image: &ImageRecord) -> bool {
        self.fresh_after
            .map_or(false, |cutoff| image.created >= cutoff)
    }

    pub fn decide(&self, image: &ImageRecord, used: &UsageSet) -> RetentionDecision {
        if let Some(container_id) = used.witness(&image.id) {
            debug!(image_id = %image.id, %container_id, "Skip, image is used by container");
            return RetentionDecision::Retain(RetainReason::InUse {
                container_id: container_id.to_string(),
            });
        }

        debug!(image_id = %image.id, tags = %image.repo_tags.join(","), "Unused image");

        if self.is_fresh(image) {
            debug!(image_id = %image.id, created = %image.created, "Deletion skipped: too fresh");
            return RetentionDecision::Retain(RetainReason::TooFresh);
        }

        let entries = if self.filters.is_empty() {
            vec![DeletionEntry::whole_image(image)]
        } else {
            select_deletable_tags(self.filters, image)
        };

        if entries.is_empty() {
            debug!(image_id = %image.id, "Image filtered out and will not be deleted");
            RetentionDecision::Retain(RetainReason::FilteredOut)
        } else {
            debug!(image_id = %image.id, count = entries.len(), "Tags selected for deletion");
            RetentionDecision::Delete(entries)
        }
    }
}

/// Dangling images the runtime's dangling prune removes: unused and not the
/// parent of another listed image.
pub fn prunable_dangling<'a>(images: &'a [ImageRecord], used: &UsageSet) -> Vec<&'a ImageRecord> {
    let parents: HashSet<&str> = images
        .iter()
        .filter_map(|image| image.parent_id.as_deref())
        .filter(|parent| !parent.is_empty())
        .collect();
    images
        .iter()
        .filter(|image| image.is_dangling())
        .filter(|image| !used.contains(&image.id) && !parents.contains(image.id.as_str()))
        .collect()
}

/// One decision per image, in listing order. Prunable dangling images are left
/// to the dangling prune and get no decision.
pub fn plan_retention(
    images: &[ImageRecord],
    used: &UsageSet,
    policy: &RetentionPolicy<'_>,
) -> Vec<ImageDecision> {
    let dangling: HashSet<&str> = prunable_dangling(images, used)
        .into_iter()
        .map(|image| image.id.as_str())
        .collect();
    images
        .iter()
        .filter(|image| {
            let skip = dangling.contains(image.id.as_str());
            if skip {
                debug!(image_id = %image.id, "Dangling image left to the dangling prune");
            }
            !skip
        })
        .map(|image| ImageDecision {
            image_id: image.id.clone(),
            decision: policy.decide(image, used),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compute_used_images, ContainerRecord, NONE_TAG};
    use chrono::Duration as ChronoDuration;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn image(id: &str, tags: &[&str], age_hours: i64, now: DateTime<Utc>) -> ImageRecord {
        ImageRecord {
            id: id.to_string(),
            repo_tags: tags.iter().map(|t| t.to_string()).collect(),
            parent_id: None,
            size: 1_000_000,
            created: now - ChronoDuration::hours(age_hours),
        }
    }

    #[test]
    fn test_unused_without_filters_deletes_whole_image() {
        let now = Utc::now();
        let filters = Filters::default();
        let policy = RetentionPolicy::new(&filters, None, now);
        let x = image("X", &["a/b:latest", "a/b:old"], 72, now);

        let decision = policy.decide(&x, &UsageSet::default());
        assert_eq!(
            decision,
            RetentionDecision::Delete(vec![DeletionEntry {
                image_id: "X".to_string(),
                tag: None,
                size: 1_000_000,
            }])
        );
    }

    #[test]
    fn test_name_filter_retains_image() {
        let now = Utc::now();
        let filters = Filters::from_lists("", "a/b", "");
        let policy = RetentionPolicy::new(&filters, None, now);
        let x = image("X", &["a/b:latest", "a/b:old"], 72, now);

        assert_eq!(
            policy.decide(&x, &UsageSet::default()),
            RetentionDecision::Retain(RetainReason::FilteredOut)
        );
    }

    #[test]
    fn test_tag_filter_retains_image() {
        let now = Utc::now();
        let filters = Filters::from_lists("", "", "stable");
        let policy = RetentionPolicy::new(&filters, None, now);
        let y = image("Y", &["repo:stable", "repo:stable-2"], 72, now);

        assert_eq!(
            policy.decide(&y, &UsageSet::default()),
            RetentionDecision::Retain(RetainReason::FilteredOut)
        );
    }

    #[test]
    fn test_fresh_image_retained_regardless_of_filters() {
        let now = Utc::now();
        for filters in [Filters::default(), Filters::from_lists("", "", "nomatch")] {
            let policy = RetentionPolicy::new(&filters, Some(DAY), now);
            let z = image("Z", &["z:1"], 2, now);
            assert_eq!(
                policy.decide(&z, &UsageSet::default()),
                RetentionDecision::Retain(RetainReason::TooFresh)
            );
        }
    }

    #[test]
    fn test_stale_image_past_freshness_is_deleted() {
        let now = Utc::now();
        let filters = Filters::default();
        let policy = RetentionPolicy::new(&filters, Some(DAY), now);
        let old = image("old", &["old:1"], 48, now);
        assert!(policy.decide(&old, &UsageSet::default()).is_delete());
    }

    #[test]
    fn test_used_image_retained_with_witness() {
        let now = Utc::now();
        let filters = Filters::default();
        let policy = RetentionPolicy::new(&filters, None, now);
        let images = vec![image("app", &["app:1"], 100, now)];
        let used = compute_used_images(
            &images,
            &[ContainerRecord {
                id: "c1".to_string(),
                image_id: "app".to_string(),
                running: false,
            }],
        );

        let plan = plan_retention(&images, &used, &policy);
        assert_eq!(plan.len(), 1);
        assert_eq!(
            plan[0].decision,
            RetentionDecision::Retain(RetainReason::InUse {
                container_id: "c1".to_string()
            })
        );
    }

    #[test]
    fn test_filtered_image_emits_entry_per_tag() {
        let now = Utc::now();
        let filters = Filters::from_lists("keep:me", "", "");
        let policy = RetentionPolicy::new(&filters, None, now);
        let img = image("multi", &["keep:me", "drop:1", "drop:2"], 100, now);

        let entries = policy.decide(&img, &UsageSet::default()).entries().to_vec();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.size == 1_000_000));
        assert!(entries.iter().all(|e| e.tag.as_deref() != Some("keep:me")));
    }

    #[test]
    fn test_prunable_dangling_images_get_no_decision() {
        let now = Utc::now();
        let mut layer = image("layer", &[], 100, now);
        layer.parent_id = Some(String::new());
        let mut child = image("child", &["child:1"], 100, now);
        child.parent_id = Some("layer".to_string());
        let images = vec![
            image("orphan", &[NONE_TAG], 1, now),
            image("used-orphan", &[NONE_TAG], 100, now),
            layer,
            child,
        ];
        let used = compute_used_images(
            &images,
            &[ContainerRecord {
                id: "c1".to_string(),
                image_id: "used-orphan".to_string(),
                running: false,
            }],
        );

        let prunable: Vec<&str> = prunable_dangling(&images, &used)
            .iter()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(prunable, vec!["orphan"]);

        for filters in [Filters::default(), Filters::from_lists("", "", "1")] {
            let policy = RetentionPolicy::new(&filters, Some(DAY), now);
            let plan = plan_retention(&images, &used, &policy);
            let ids: Vec<&str> = plan.iter().map(|d| d.image_id.as_str()).collect();
            assert_eq!(ids, vec!["used-orphan", "layer", "child"]);
        }
    }

    #[test]
    fn test_huge_freshness_protects_everything() {
        let now = Utc::now();
        let filters = Filters::default();
        let policy = RetentionPolicy::new(&filters, Some(Duration::MAX), now);
        let ancient = image("ancient", &["a:1"], 24 * 365 * 20, now);
        assert!(policy.is_fresh(&ancient));
    }
}
