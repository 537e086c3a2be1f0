use tracing::{debug, error};

use crate::{Inventory, RuntimeClient};

/// Lists images and resolves every container to the image it runs.
///
/// An image listing failure leaves the image list empty, so nothing is
/// selected. A container listing failure returns `None`: without usage
/// information every image would look unused. A failed inspect only drops
/// that container.
pub async fn collect_inventory(runtime: &dyn RuntimeClient) -> Option<Inventory> {
    let images = runtime.list_images().await.unwrap_or_else(|e| {
        error!(error = %e, "Failed to list images on host");
        Vec::new()
    });

    let container_ids = match runtime.list_containers().await {
        Ok(ids) => ids,
        Err(e) => {
            error!(error = %e, "Failed to list containers on host, skipping image selection");
            return None;
        }
    };

    let mut containers = Vec::with_capacity(container_ids.len());
    for container_id in container_ids {
        match runtime.inspect_container(&container_id).await {
            Ok(container) => containers.push(container),
            Err(e) => debug!(%container_id, error = %e, "Error getting container info"),
        }
    }

    debug!(
        images = images.len(),
        containers = containers.len(),
        "Collected host inventory"
    );
    Some(Inventory { images, containers })
}
