use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    compute_used_images, ContainerRecord, ImageRecord, PruneReport, RemoveOptions, RemovedRef,
    Result, RuntimeError,
};

/// Container runtime operations the janitor depends on.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// All images, intermediate layers included.
    async fn list_images(&self) -> Result<Vec<ImageRecord>>;
    /// IDs of all containers, stopped ones included.
    async fn list_containers(&self) -> Result<Vec<String>>;
    async fn inspect_container(&self, container_id: &str) -> Result<ContainerRecord>;
    async fn remove_image(&self, reference: &str, options: RemoveOptions)
        -> Result<Vec<RemovedRef>>;
    async fn prune_containers(&self) -> Result<PruneReport>;
    async fn prune_volumes(&self) -> Result<PruneReport>;
    async fn prune_networks(&self) -> Result<PruneReport>;
    async fn prune_images(&self, dangling_only: bool) -> Result<PruneReport>;
}

#[derive(Debug, Default)]
struct HostState {
    images: HashMap<String, ImageRecord>,
    containers: HashMap<String, ContainerRecord>,
    unused_volumes: Vec<String>,
    unused_networks: Vec<String>,
    failing_inspects: HashSet<String>,
    failing_removals: HashSet<String>,
    list_containers_fails: bool,
}

// In-memory runtime implementation for development/testing
#[derive(Clone, Default)]
pub struct InMemoryRuntime {
    state: Arc<RwLock<HostState>>,
    mutations: Arc<AtomicUsize>,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_image(&self, image: ImageRecord) {
        self.state
            .write()
            .await
            .images
            .insert(image.id.clone(), image);
    }

    pub async fn add_container(&self, container: ContainerRecord) {
        self.state
            .write()
            .await
            .containers
            .insert(container.id.clone(), container);
    }

    pub async fn add_unused_volume(&self, name: &str) {
        self.state.write().await.unused_volumes.push(name.to_string());
    }

    pub async fn add_unused_network(&self, name: &str) {
        self.state.write().await.unused_networks.push(name.to_string());
    }

    pub async fn fail_inspect_of(&self, container_id: &str) {
        self.state
            .write()
            .await
            .failing_inspects
            .insert(container_id.to_string());
    }

    pub async fn fail_removal_of(&self, reference: &str) {
        self.state
            .write()
            .await
            .failing_removals
            .insert(reference.to_string());
    }

    pub async fn fail_container_listing(&self, fails: bool) {
        self.state.write().await.list_containers_fails = fails;
    }

    pub async fn has_image(&self, image_id: &str) -> bool {
        self.state.read().await.images.contains_key(image_id)
    }

    pub async fn image(&self, image_id: &str) -> Option<ImageRecord> {
        self.state.read().await.images.get(image_id).cloned()
    }

    pub async fn image_count(&self) -> usize {
        self.state.read().await.images.len()
    }

    pub async fn container_count(&self) -> usize {
        self.state.read().await.containers.len()
    }

    /// Number of mutating calls received so far.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    fn record_mutation(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

impl HostState {
    fn images_in_use(&self) -> HashSet<String> {
        let images: Vec<ImageRecord> = self.images.values().cloned().collect();
        let containers: Vec<ContainerRecord> = self.containers.values().cloned().collect();
        compute_used_images(&images, &containers)
            .image_ids()
            .map(str::to_string)
            .collect()
    }

    fn is_parent(&self, image_id: &str) -> bool {
        self.images
            .values()
            .any(|i| i.parent_id.as_deref() == Some(image_id))
    }

    fn is_referenced(&self, image_id: &str) -> bool {
        self.containers.values().any(|c| c.image_id == image_id)
    }

    fn delete_image(&mut self, image_id: &str) -> Vec<RemovedRef> {
        let mut removed = Vec::new();
        if let Some(image) = self.images.remove(image_id) {
            removed.extend(image.repo_tags.into_iter().map(RemovedRef::Untagged));
            removed.push(RemovedRef::Deleted(image.id));
        }
        removed
    }
}

#[async_trait]
impl RuntimeClient for InMemoryRuntime {
    async fn list_images(&self) -> Result<Vec<ImageRecord>> {
        let mut images: Vec<ImageRecord> = self.state.read().await.images.values().cloned().collect();
        images.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(images)
    }

    async fn list_containers(&self) -> Result<Vec<String>> {
        let state = self.state.read().await;
        if state.list_containers_fails {
            return Err(RuntimeError::Request("container listing unavailable".to_string()));
        }
        let mut ids: Vec<String> = state.containers.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn inspect_container(&self, container_id: &str) -> Result<ContainerRecord> {
        let state = self.state.read().await;
        if state.failing_inspects.contains(container_id) {
            return Err(RuntimeError::Request(format!(
                "inspect of {container_id} failed"
            )));
        }
        state
            .containers
            .get(container_id)
            .cloned()
            .ok_or_else(|| RuntimeError::ContainerNotFound(container_id.to_string()))
    }

    async fn remove_image(
        &self,
        reference: &str,
        options: RemoveOptions,
    ) -> Result<Vec<RemovedRef>> {
        self.record_mutation();
        let mut state = self.state.write().await;

        if state.failing_removals.contains(reference) {
            return Err(RuntimeError::Request(format!("removal of {reference} failed")));
        }

        if state.images.contains_key(reference) {
            if state.is_referenced(reference) && !options.force {
                return Err(RuntimeError::Conflict(format!(
                    "image {reference} is being used by a container"
                )));
            }
            return Ok(state.delete_image(reference));
        }

        let image_id = state
            .images
            .values()
            .find(|i| i.repo_tags.iter().any(|t| t == reference))
            .map(|i| i.id.clone())
            .ok_or_else(|| RuntimeError::ImageNotFound(reference.to_string()))?;

        let mut removed = vec![RemovedRef::Untagged(reference.to_string())];
        let last_reference = match state.images.get_mut(&image_id) {
            Some(image) => {
                image.repo_tags.retain(|t| t != reference);
                image.repo_tags.is_empty()
            }
            None => false,
        };
        if last_reference && !state.is_referenced(&image_id) {
            removed.push(RemovedRef::Deleted(image_id.clone()));
            state.images.remove(&image_id);
        }
        Ok(removed)
    }

    async fn prune_containers(&self) -> Result<PruneReport> {
        self.record_mutation();
        let mut state = self.state.write().await;
        let stopped: Vec<String> = state
            .containers
            .values()
            .filter(|c| !c.running)
            .map(|c| c.id.clone())
            .collect();
        for id in &stopped {
            state.containers.remove(id);
        }
        Ok(PruneReport {
            space_reclaimed: 0,
            deleted: stopped,
        })
    }

    async fn prune_volumes(&self) -> Result<PruneReport> {
        self.record_mutation();
        let deleted = std::mem::take(&mut self.state.write().await.unused_volumes);
        Ok(PruneReport {
            space_reclaimed: 0,
            deleted,
        })
    }

    async fn prune_networks(&self) -> Result<PruneReport> {
        self.record_mutation();
        let deleted = std::mem::take(&mut self.state.write().await.unused_networks);
        Ok(PruneReport {
            space_reclaimed: 0,
            deleted,
        })
    }

    async fn prune_images(&self, dangling_only: bool) -> Result<PruneReport> {
        self.record_mutation();
        let mut state = self.state.write().await;
        let used = state.images_in_use();

        let mut candidates: Vec<String> = state
            .images
            .values()
            .filter(|i| !used.contains(&i.id))
            // dangling prune leaves untagged parents of remaining images alone
            .filter(|i| !dangling_only || (i.is_dangling() && !state.is_parent(&i.id)))
            .map(|i| i.id.clone())
            .collect();
        candidates.sort();

        let mut report = PruneReport::default();
        for id in candidates {
            if let Some(size) = state.images.get(&id).map(|i| i.size) {
                report.space_reclaimed += size;
            }
            report.deleted.extend(
                state
                    .delete_image(&id)
                    .into_iter()
                    .filter_map(|r| match r {
                        RemovedRef::Deleted(id) => Some(id),
                        RemovedRef::Untagged(_) => None,
                    }),
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn image(id: &str, tags: &[&str], parent: Option<&str>) -> ImageRecord {
        ImageRecord {
            id: id.to_string(),
            repo_tags: tags.iter().map(|t| t.to_string()).collect(),
            parent_id: parent.map(str::to_string),
            size: 100,
            created: Utc::now(),
        }
    }

    const FORCE: RemoveOptions = RemoveOptions {
        force: true,
        prune_children: false,
    };

    #[tokio::test]
    async fn test_remove_by_tag_untags_until_last_reference() {
        let runtime = InMemoryRuntime::new();
        runtime.add_image(image("img", &["app:1", "app:2"], None)).await;

        let first = runtime.remove_image("app:1", FORCE).await.unwrap();
        assert_eq!(first, vec![RemovedRef::Untagged("app:1".to_string())]);
        assert!(runtime.has_image("img").await);

        let second = runtime.remove_image("app:2", FORCE).await.unwrap();
        assert!(second.contains(&RemovedRef::Deleted("img".to_string())));
        assert!(!runtime.has_image("img").await);
        assert_eq!(runtime.mutation_count(), 2);
    }

    #[tokio::test]
    async fn test_remove_unknown_reference() {
        let runtime = InMemoryRuntime::new();
        let err = runtime.remove_image("ghost:1", FORCE).await.unwrap_err();
        assert!(matches!(err, RuntimeError::ImageNotFound(_)));
    }

    #[tokio::test]
    async fn test_dangling_prune_keeps_tagged_and_parents() {
        let runtime = InMemoryRuntime::new();
        runtime.add_image(image("layer", &[], None)).await;
        runtime.add_image(image("app", &["app:1"], Some("layer"))).await;
        runtime.add_image(image("orphan", &["<none>:<none>"], None)).await;

        let report = runtime.prune_images(true).await.unwrap();
        assert_eq!(report.deleted, vec!["orphan".to_string()]);
        assert_eq!(report.space_reclaimed, 100);
        assert!(runtime.has_image("layer").await);
        assert!(runtime.has_image("app").await);
    }

    #[tokio::test]
    async fn test_full_prune_keeps_used_chain() {
        let runtime = InMemoryRuntime::new();
        runtime.add_image(image("base", &["base:1"], None)).await;
        runtime.add_image(image("app", &["app:1"], Some("base"))).await;
        runtime.add_image(image("stale", &["stale:1"], None)).await;
        runtime
            .add_container(ContainerRecord {
                id: "c1".to_string(),
                image_id: "app".to_string(),
                running: false,
            })
            .await;

        let report = runtime.prune_images(false).await.unwrap();
        assert_eq!(report.deleted, vec!["stale".to_string()]);
        assert_eq!(runtime.image_count().await, 2);
    }

    #[tokio::test]
    async fn test_prune_containers_removes_stopped_only() {
        let runtime = InMemoryRuntime::new();
        for (id, running) in [("up", true), ("down", false)] {
            runtime
                .add_container(ContainerRecord {
                    id: id.to_string(),
                    image_id: "img".to_string(),
                    running,
                })
                .await;
        }

        let report = runtime.prune_containers().await.unwrap();
        assert_eq!(report.deleted, vec!["down".to_string()]);
        assert_eq!(runtime.container_count().await, 1);
    }
}
