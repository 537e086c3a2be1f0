use bollard::models::{ContainerInspectResponse, ImageDeleteResponseItem, ImageSummary};
use chrono::{TimeZone, Utc};
use janitor_retention::{ContainerRecord, ImageRecord, PruneReport, RemovedRef};

use crate::{DockerError, Result};

pub(crate) fn image_record(summary: ImageSummary) -> ImageRecord {
    let parent_id = Some(summary.parent_id).filter(|p| !p.is_empty());
    ImageRecord {
        id: summary.id,
        repo_tags: summary.repo_tags,
        parent_id,
        size: u64::try_from(summary.size).unwrap_or(0),
        // an unreadable timestamp counts as fresh
        created: Utc
            .timestamp_opt(summary.created, 0)
            .single()
            .unwrap_or_else(Utc::now),
    }
}

pub(crate) fn container_record(
    container_id: &str,
    inspected: ContainerInspectResponse,
) -> Result<ContainerRecord> {
    let image_id = inspected
        .image
        .filter(|image| !image.is_empty())
        .ok_or_else(|| DockerError::MissingImage(container_id.to_string()))?;
    let running = inspected
        .state
        .and_then(|state| state.running)
        .unwrap_or(false);
    Ok(ContainerRecord {
        id: inspected.id.unwrap_or_else(|| container_id.to_string()),
        image_id,
        running,
    })
}

pub(crate) fn removed_refs(items: Vec<ImageDeleteResponseItem>) -> Vec<RemovedRef> {
    let mut removed = Vec::with_capacity(items.len());
    for item in items {
        if let Some(untagged) = item.untagged.filter(|u| !u.is_empty()) {
            removed.push(RemovedRef::Untagged(untagged));
        }
        if let Some(deleted) = item.deleted.filter(|d| !d.is_empty()) {
            removed.push(RemovedRef::Deleted(deleted));
        }
    }
    removed
}

pub(crate) fn prune_report(space_reclaimed: Option<i64>, deleted: Option<Vec<String>>) -> PruneReport {
    PruneReport {
        space_reclaimed: space_reclaimed
            .and_then(|s| u64::try_from(s).ok())
            .unwrap_or(0),
        deleted: deleted.unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::ContainerState;

    #[test]
    fn test_image_record_from_summary() {
        let summary = ImageSummary {
            id: "sha256:aa".to_string(),
            parent_id: String::new(),
            repo_tags: vec!["app:1".to_string()],
            created: 1_700_000_000,
            size: 2048,
            ..Default::default()
        };
        let record = image_record(summary);
        assert_eq!(record.parent_id, None);
        assert_eq!(record.size, 2048);
        assert_eq!(record.created.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_container_record_requires_image() {
        let inspected = ContainerInspectResponse {
            id: Some("c1".to_string()),
            image: Some("sha256:bb".to_string()),
            state: Some(ContainerState {
                running: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        let record = container_record("c1", inspected).unwrap();
        assert_eq!(record.image_id, "sha256:bb");
        assert!(record.running);

        let missing = container_record("c2", ContainerInspectResponse::default());
        assert!(matches!(missing, Err(DockerError::MissingImage(_))));
    }

    #[test]
    fn test_removed_refs_split_untag_and_delete() {
        let items = vec![
            ImageDeleteResponseItem {
                untagged: Some("app:1".to_string()),
                deleted: None,
            },
            ImageDeleteResponseItem {
                untagged: None,
                deleted: Some("sha256:aa".to_string()),
            },
        ];
        assert_eq!(
            removed_refs(items),
            vec![
                RemovedRef::Untagged("app:1".to_string()),
                RemovedRef::Deleted("sha256:aa".to_string()),
            ]
        );
    }

    #[test]
    fn test_prune_report_clamps_negative_space() {
        let report = prune_report(Some(-1), None);
        assert_eq!(report.space_reclaimed, 0);
        assert!(report.deleted.is_empty());
    }
}
