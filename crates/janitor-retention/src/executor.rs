use tracing::{debug, error};

use crate::{DeletionEntry, RemoveOptions, RemovedRef, RuntimeClient};

const REMOVE_OPTIONS: RemoveOptions = RemoveOptions {
    force: true,
    prune_children: false,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeletionOutcome {
    pub reclaimed: u64,
    pub removed: usize,
    pub failed: usize,
}

/// Removes one entry and returns the bytes it freed.
///
/// The entry's size counts only when the runtime reports an actual deletion;
/// an untag-only answer frees nothing.
pub async fn delete_entry(runtime: &dyn RuntimeClient, entry: &DeletionEntry) -> crate::Result<u64> {
    let target = entry.target();
    let removed = runtime.remove_image(target, REMOVE_OPTIONS).await?;

    let mut reclaimed = 0;
    for item in removed {
        match item {
            RemovedRef::Deleted(reference) => {
                debug!(%reference, space_reclaimed = entry.size, "Deleted");
                reclaimed = entry.size;
            }
            RemovedRef::Untagged(reference) => debug!(%reference, "Untagged"),
        }
    }
    Ok(reclaimed)
}

/// Applies every entry in order. Failures are logged and do not stop the rest.
pub async fn delete_entries(runtime: &dyn RuntimeClient, entries: &[DeletionEntry]) -> DeletionOutcome {
    let mut outcome = DeletionOutcome::default();
    for entry in entries {
        match delete_entry(runtime, entry).await {
            Ok(reclaimed) => {
                outcome.reclaimed += reclaimed;
                outcome.removed += 1;
            }
            Err(e) => {
                error!(image_id = %entry.image_id, target = %entry.target(), error = %e, "Can't remove image");
                outcome.failed += 1;
            }
        }
    }
    outcome
}
