use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use janitor_common::Options;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::{
    collect_inventory, compute_used_images, delete_entries, plan_retention, prunable_dangling,
    CycleReport, ImagePhase, PruneReport, RetentionDecision, RetentionPolicy, RuntimeClient,
};

pub fn format_megabytes(bytes: u64) -> f64 {
    bytes as f64 / 1000.0 / 1000.0
}

/// Drives cleanup cycles against a runtime. Owns the only state that survives
/// between cycles: the bytes reclaimed since start.
pub struct Janitor {
    runtime: Arc<dyn RuntimeClient>,
    options: Options,
    total_reclaimed: u64,
    cycles_run: u64,
}

impl Janitor {
    pub fn new(runtime: Arc<dyn RuntimeClient>, options: Options) -> Self {
        Self {
            runtime,
            options,
            total_reclaimed: 0,
            cycles_run: 0,
        }
    }

    pub fn total_reclaimed(&self) -> u64 {
        self.total_reclaimed
    }

    pub fn cycles_run(&self) -> u64 {
        self.cycles_run
    }

    /// Runs a cycle right away, then one per interval until `shutdown`
    /// resolves. A cycle always completes before the next tick is taken.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(cycles = self.cycles_run, "Shutdown requested, janitor stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }
    }

    #[instrument(skip(self), fields(cycle_id = tracing::field::Empty))]
    pub async fn run_cycle(&mut self) -> CycleReport {
        let cycle_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("cycle_id", cycle_id.as_str());

        let mut report = CycleReport {
            cycle_id,
            ..Default::default()
        };

        if self.options.clear_containers {
            debug!("Pruning unused containers");
            if !self.options.dry_run {
                report.pruned_containers =
                    log_prune("containers", self.runtime.prune_containers().await);
            }
        }

        if self.options.clear_volumes {
            debug!("Pruning unused volumes");
            if !self.options.dry_run {
                report.pruned_volumes = log_prune("volumes", self.runtime.prune_volumes().await);
            }
        }

        if self.options.clear_networks {
            debug!("Pruning unused networks");
            if !self.options.dry_run {
                report.pruned_networks =
                    log_prune("networks", self.runtime.prune_networks().await);
            }
        }

        if self.options.clear_images {
            self.clean_images(&mut report).await;
        }

        self.total_reclaimed = self.total_reclaimed.saturating_add(report.interval_reclaimed);
        report.total_reclaimed = self.total_reclaimed;
        self.cycles_run += 1;

        if report.interval_reclaimed > 0 || report.deleted_count > 0 {
            info!(
                "Total cleaned from start: {:.2}MB; iteration cleaned: {:.2}MB; deleted count: {}",
                format_megabytes(report.total_reclaimed),
                format_megabytes(report.interval_reclaimed),
                report.deleted_count
            );
        } else {
            debug!("Nothing has been deleted in this iteration");
        }

        report
    }

    async fn clean_images(&self, report: &mut CycleReport) {
        // dangling images are never worth keeping
        if !self.options.dry_run {
            if let Some(pruned) = self.prune_images(true).await {
                report.interval_reclaimed += pruned.space_reclaimed;
                report.deleted_count += pruned.deleted.len();
            }
        }

        if self.options.prunes_all_unused_images() {
            debug!("Pruning all unused images");
            report.image_phase = ImagePhase::PrunedAllUnused;
            if !self.options.dry_run {
                if let Some(pruned) = self.prune_images(false).await {
                    report.interval_reclaimed += pruned.space_reclaimed;
                    report.deleted_count += pruned.deleted.len();
                }
            }
            return;
        }

        let Some(inventory) = collect_inventory(self.runtime.as_ref()).await else {
            report.image_phase = ImagePhase::Skipped;
            return;
        };

        let used = compute_used_images(&inventory.images, &inventory.containers);
        if self.options.dry_run {
            for image in prunable_dangling(&inventory.images, &used) {
                info!(image_id = %image.id, "Dry-run, dangling image would be pruned");
            }
        }
        let policy = RetentionPolicy::new(
            &self.options.filters,
            self.options.freshness,
            Utc::now(),
        );
        debug!(
            freshness = ?self.options.freshness,
            images = inventory.images.len(),
            "Images created within the freshness window will be skipped"
        );
        report.decisions = plan_retention(&inventory.images, &used, &policy);
        report.image_phase = ImagePhase::Planned;

        for decision in &report.decisions {
            let RetentionDecision::Delete(entries) = &decision.decision else {
                continue;
            };

            if self.options.dry_run {
                info!(
                    image_id = %decision.image_id,
                    tags = entries.len(),
                    "Dry-run, image would be deleted"
                );
                continue;
            }

            debug!(image_id = %decision.image_id, count = entries.len(), "Deleting tags for image");
            let outcome = delete_entries(self.runtime.as_ref(), entries).await;
            report.interval_reclaimed += outcome.reclaimed;
            if outcome.removed > 0 {
                report.deleted_count += 1;
            }
        }
    }

    async fn prune_images(&self, dangling_only: bool) -> Option<PruneReport> {
        match self.runtime.prune_images(dangling_only).await {
            Ok(pruned) => {
                debug!(
                    dangling_only,
                    deleted = pruned.deleted.len(),
                    space_reclaimed = pruned.space_reclaimed,
                    "Pruned images"
                );
                Some(pruned)
            }
            Err(e) => {
                error!(dangling_only, error = %e, "Failed to prune unused images");
                None
            }
        }
    }
}

fn log_prune(kind: &str, result: crate::Result<PruneReport>) -> usize {
    match result {
        Ok(pruned) => {
            debug!(kind, deleted = pruned.deleted.len(), "Pruned unused {kind}");
            pruned.deleted.len()
        }
        Err(e) => {
            error!(kind, error = %e, "Failed to prune unused {kind}");
            0
        }
    }
}
