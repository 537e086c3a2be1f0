//! Docker Engine backed runtime client for the janitor, built on bollard.

use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, ListContainersOptions, PruneContainersOptions};
use bollard::errors::Error as BollardError; // Alias bollard error
use bollard::image::{ListImagesOptions, PruneImagesOptions, RemoveImageOptions};
use bollard::network::PruneNetworksOptions;
use bollard::volume::PruneVolumesOptions;
use bollard::Docker;
use janitor_retention::{
    ContainerRecord, ImageRecord, PruneReport, RemoveOptions, RemovedRef, RuntimeClient,
    RuntimeError,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

mod convert;

pub use bollard;
use convert::{container_record, image_record, prune_report, removed_refs};

// --- Custom Error Type ---
#[derive(Error, Debug)]
pub enum DockerError {
    #[error("Docker connection failed: {0}")]
    ConnectionFailed(#[source] BollardError),
    #[error("Image listing failed: {0}")]
    ListImagesFailed(#[source] BollardError),
    #[error("Container listing failed: {0}")]
    ListContainersFailed(#[source] BollardError),
    #[error("Container inspect failed for {id}: {source}")]
    InspectFailed {
        id: String,
        #[source]
        source: BollardError,
    },
    #[error("Image removal failed for {reference}: {source}")]
    RemovalFailed {
        reference: String,
        #[source]
        source: BollardError,
    },
    #[error("Prune of {kind} failed: {source}")]
    PruneFailed {
        kind: &'static str,
        #[source]
        source: BollardError,
    },
    #[error("Container {0} reports no image")]
    MissingImage(String),
}

impl DockerError {
    fn status_code(&self) -> Option<u16> {
        let source = match self {
            DockerError::ConnectionFailed(source)
            | DockerError::ListImagesFailed(source)
            | DockerError::ListContainersFailed(source)
            | DockerError::InspectFailed { source, .. }
            | DockerError::RemovalFailed { source, .. }
            | DockerError::PruneFailed { source, .. } => source,
            DockerError::MissingImage(_) => return None,
        };
        match source {
            BollardError::DockerResponseServerError { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

// Implement conversion from DockerError to the retention engine's RuntimeError
impl From<DockerError> for RuntimeError {
    fn from(err: DockerError) -> Self {
        match (&err, err.status_code()) {
            (DockerError::RemovalFailed { reference, .. }, Some(404)) => {
                RuntimeError::ImageNotFound(reference.clone())
            }
            (DockerError::InspectFailed { id, .. }, Some(404)) => {
                RuntimeError::ContainerNotFound(id.clone())
            }
            (_, Some(409)) => RuntimeError::Conflict(err.to_string()),
            _ => RuntimeError::Request(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DockerError>;

// --- DockerRuntime Implementation ---

#[derive(Clone)]
pub struct DockerRuntime {
    docker_client: Arc<Docker>,
}

impl DockerRuntime {
    pub fn new(docker_client: Arc<Docker>) -> Self {
        Self { docker_client }
    }

    /// Connects using DOCKER_HOST or the platform's default socket.
    pub fn connect_with_defaults() -> Result<Self> {
        let docker = Docker::connect_with_defaults().map_err(DockerError::ConnectionFailed)?;
        Ok(Self::new(Arc::new(docker)))
    }

    /// Asks the daemon for its version, mostly to log what we talk to.
    pub async fn server_version(&self) -> Result<String> {
        let version = self
            .docker_client
            .version()
            .await
            .map_err(DockerError::ConnectionFailed)?;
        Ok(format!(
            "{} (API {})",
            version.version.unwrap_or_default(),
            version.api_version.unwrap_or_default()
        ))
    }

    async fn list_images_inner(&self) -> Result<Vec<ImageRecord>> {
        let options = ListImagesOptions::<String> {
            all: true,
            ..Default::default()
        };
        let images = self
            .docker_client
            .list_images(Some(options))
            .await
            .map_err(DockerError::ListImagesFailed)?;
        debug!(count = images.len(), "Listed images");
        Ok(images.into_iter().map(image_record).collect())
    }

    async fn list_containers_inner(&self) -> Result<Vec<String>> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        let containers = self
            .docker_client
            .list_containers(Some(options))
            .await
            .map_err(DockerError::ListContainersFailed)?;
        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }

    async fn inspect_container_inner(&self, container_id: &str) -> Result<ContainerRecord> {
        let inspected = self
            .docker_client
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .map_err(|source| DockerError::InspectFailed {
                id: container_id.to_string(),
                source,
            })?;
        container_record(container_id, inspected)
    }

    async fn remove_image_inner(
        &self,
        reference: &str,
        options: RemoveOptions,
    ) -> Result<Vec<RemovedRef>> {
        let options = RemoveImageOptions {
            force: options.force,
            noprune: !options.prune_children,
        };
        let removed = self
            .docker_client
            .remove_image(reference, Some(options), None)
            .await
            .map_err(|source| DockerError::RemovalFailed {
                reference: reference.to_string(),
                source,
            })?;
        Ok(removed_refs(removed))
    }

    async fn prune_images_inner(&self, dangling_only: bool) -> Result<PruneReport> {
        let filters = HashMap::from([("dangling".to_string(), vec![dangling_only.to_string()])]);
        let response = self
            .docker_client
            .prune_images(Some(PruneImagesOptions { filters }))
            .await
            .map_err(|source| DockerError::PruneFailed {
                kind: "images",
                source,
            })?;
        let deleted: Vec<String> = response
            .images_deleted
            .map(removed_refs)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| match r {
                RemovedRef::Deleted(id) => Some(id),
                RemovedRef::Untagged(_) => None,
            })
            .collect();
        Ok(prune_report(response.space_reclaimed, Some(deleted)))
    }
}

#[async_trait]
impl RuntimeClient for DockerRuntime {
    async fn list_images(&self) -> janitor_retention::Result<Vec<ImageRecord>> {
        Ok(self.list_images_inner().await?)
    }

    async fn list_containers(&self) -> janitor_retention::Result<Vec<String>> {
        Ok(self.list_containers_inner().await?)
    }

    async fn inspect_container(
        &self,
        container_id: &str,
    ) -> janitor_retention::Result<ContainerRecord> {
        Ok(self.inspect_container_inner(container_id).await?)
    }

    #[instrument(skip(self, options))]
    async fn remove_image(
        &self,
        reference: &str,
        options: RemoveOptions,
    ) -> janitor_retention::Result<Vec<RemovedRef>> {
        Ok(self.remove_image_inner(reference, options).await?)
    }

    async fn prune_containers(&self) -> janitor_retention::Result<PruneReport> {
        let response = self
            .docker_client
            .prune_containers(Some(PruneContainersOptions::<String>::default()))
            .await
            .map_err(|source| DockerError::PruneFailed {
                kind: "containers",
                source,
            })?;
        info!(deleted = ?response.containers_deleted, "Pruned containers");
        Ok(prune_report(response.space_reclaimed, response.containers_deleted))
    }

    async fn prune_volumes(&self) -> janitor_retention::Result<PruneReport> {
        let response = self
            .docker_client
            .prune_volumes(Some(PruneVolumesOptions::<String>::default()))
            .await
            .map_err(|source| DockerError::PruneFailed {
                kind: "volumes",
                source,
            })?;
        info!(deleted = ?response.volumes_deleted, "Pruned volumes");
        Ok(prune_report(response.space_reclaimed, response.volumes_deleted))
    }

    async fn prune_networks(&self) -> janitor_retention::Result<PruneReport> {
        let response = self
            .docker_client
            .prune_networks(Some(PruneNetworksOptions::<String>::default()))
            .await
            .map_err(|source| DockerError::PruneFailed {
                kind: "networks",
                source,
            })?;
        info!(deleted = ?response.networks_deleted, "Pruned networks");
        Ok(prune_report(None, response.networks_deleted))
    }

    async fn prune_images(&self, dangling_only: bool) -> janitor_retention::Result<PruneReport> {
        Ok(self.prune_images_inner(dangling_only).await?)
    }
}
