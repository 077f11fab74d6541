//! Migration of image objects between stores.
//!
//! A run walks every record that points at the source store, copies its
//! objects to the destination and then flips `store_name` for whole batches
//! of records in one transaction. A record's pointer only changes after all
//! of its objects are confirmed at the destination, and source objects are
//! only removed after the pointer change committed.
//!
//! ```text
//! page ──► transfer (N tasks) ──► PendingBatch ──► update_store ──► cleanup
//! ```

mod batch;
mod report;
mod transfer;

pub use batch::{Batch, PendingBatch};
pub use report::MigrationReport;
pub use transfer::{transfer_record, RecordOutcome, RecordTransfer};

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use imgshift_common::{ImageId, ObjectKey, StoreName};
use imgshift_db::models::ImageRecord;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::MigrateConfig;
use crate::records::RecordSource;
use crate::storage::{AbsentStore, ImageStore};

/// Knobs for a migration run.
#[derive(Debug, Clone)]
pub struct MigrateOptions {
    /// Delete source objects once their records are committed.
    pub clean_source: bool,
    /// Copy objects even when the destination already has them.
    pub force: bool,
    /// Inspect only. Nothing is written, committed or deleted.
    pub dry_run: bool,
    pub page_size: usize,
    pub batch_size: usize,
    pub concurrency: usize,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self::from_config(&MigrateConfig::default())
    }
}

impl MigrateOptions {
    pub fn from_config(config: &MigrateConfig) -> Self {
        Self {
            clean_source: false,
            force: false,
            dry_run: false,
            page_size: config.page_size.max(1),
            batch_size: config.batch_size.max(1),
            concurrency: config.concurrency.max(1),
        }
    }
}

/// Moves records and their objects from one store to another.
pub struct Migrator {
    source: Arc<dyn ImageStore>,
    destination: Arc<dyn ImageStore>,
    records: Arc<dyn RecordSource>,
    options: MigrateOptions,
}

impl Migrator {
    pub fn new(
        source: Arc<dyn ImageStore>,
        destination: Arc<dyn ImageStore>,
        records: Arc<dyn RecordSource>,
        options: MigrateOptions,
    ) -> Self {
        Self {
            source,
            destination,
            records,
            options,
        }
    }

    /// Run the migration to completion or until `cancel` fires.
    ///
    /// Errors are returned only for setup failures and for failures to read
    /// records. Per-object and per-batch failures are counted in the report.
    pub async fn run(&self, cancel: CancellationToken) -> Result<MigrationReport> {
        let from = self.source.name();
        let to = self.destination.name();
        if from == to {
            anyhow::bail!("Source and destination are the same store: {}", from.cli_name());
        }

        // A dry run must not create the bucket or the images folder.
        let (source, destination) = if self.options.dry_run {
            (self.inspect(&self.source).await?, self.inspect(&self.destination).await?)
        } else {
            self.destination
                .prepare()
                .await
                .with_context(|| format!("Failed to prepare {} store", to.cli_name()))?;
            self.source
                .prepare()
                .await
                .with_context(|| format!("Failed to prepare {} store", from.cli_name()))?;
            (self.source.clone(), self.destination.clone())
        };

        let total = self.count(from).await?;
        info!(
            from = from.cli_name(),
            to = to.cli_name(),
            records = total,
            dry_run = self.options.dry_run,
            "Starting migration"
        );

        let report = Arc::new(Mutex::new(MigrationReport::new(from, to, self.options.dry_run)));
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency));
        let mut pending = PendingBatch::new();
        let mut cursor: Option<ImageId> = None;
        let mut page_number = 0usize;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let page = self.page(from, cursor).await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(last.id);
            page_number += 1;
            info!(page = page_number, records = page.len(), "Processing page");

            // In-flight transfers always run to completion, so a cancelled
            // run never leaves a half-written object behind.
            let mut tasks = JoinSet::new();
            for record in page {
                if cancel.is_cancelled() {
                    break;
                }
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .context("Transfer semaphore closed")?;
                if cancel.is_cancelled() {
                    break;
                }

                let source = source.clone();
                let destination = destination.clone();
                let task_report = report.clone();
                let (force, dry_run) = (self.options.force, self.options.dry_run);
                tasks.spawn(async move {
                    let _permit = permit;
                    let transfer =
                        transfer_record(&*source, &*destination, &record, force, dry_run).await;
                    {
                        let mut report = task_report.lock();
                        report.objects_transferred += transfer.objects_transferred;
                        report.objects_skipped += transfer.objects_skipped;
                    }
                    (record.id, transfer)
                });

                // Drain finished transfers so batches fill while the page is
                // still in flight.
                while let Some(joined) = tasks.try_join_next() {
                    self.collect(joined, &report, &mut pending);
                    if pending.len() >= self.options.batch_size && !cancel.is_cancelled() {
                        self.flush(&mut pending, &report).await;
                    }
                }
            }

            while let Some(joined) = tasks.join_next().await {
                self.collect(joined, &report, &mut pending);
                if pending.len() >= self.options.batch_size && !cancel.is_cancelled() {
                    self.flush(&mut pending, &report).await;
                }
            }
        }

        if cancel.is_cancelled() {
            let dropped = pending.len();
            warn!(dropped, "Migration cancelled, pending batch not committed");
            report.lock().cancelled = true;
        } else if !pending.is_empty() {
            self.flush(&mut pending, &report).await;
        }

        let report = report.lock().clone();
        info!(
            transferred = report.transferred,
            skipped = report.skipped,
            failed = report.failed,
            missing = report.missing,
            batches_failed = report.batches_failed,
            "Migration finished"
        );
        Ok(report)
    }

    fn collect(
        &self,
        joined: std::result::Result<(ImageId, RecordTransfer), JoinError>,
        report: &Mutex<MigrationReport>,
        pending: &mut PendingBatch,
    ) {
        let (id, transfer) = match joined {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Transfer task failed");
                report.lock().failed += 1;
                return;
            }
        };

        match transfer.outcome {
            RecordOutcome::Failed => report.lock().failed += 1,
            RecordOutcome::Missing => report.lock().missing += 1,
            RecordOutcome::Transferred | RecordOutcome::Skipped => {}
        }
        pending.push(id, transfer);
    }

    /// Commit the pending batch and clean up behind it.
    async fn flush(&self, pending: &mut PendingBatch, report: &Mutex<MigrationReport>) {
        let batch = pending.take();
        if batch.ids.is_empty() {
            return;
        }
        let count = batch.ids.len();
        let to = self.destination.name();

        if self.options.dry_run {
            info!(records = count, to = to.cli_name(), "Would update records");
            let mut report = report.lock();
            report.transferred += batch.transferred;
            report.skipped += batch.skipped;
            return;
        }

        let records = self.records.clone();
        let ids = batch.ids;
        let committed = tokio::task::spawn_blocking(move || records.update_store(&ids, to))
            .await
            .map_err(anyhow::Error::from)
            .and_then(|r| r.map_err(anyhow::Error::from));

        match committed {
            Ok(updated) => {
                info!(records = updated, to = to.cli_name(), "Committed batch");
                let mut report = report.lock();
                report.batches_committed += 1;
                report.transferred += batch.transferred;
                report.skipped += batch.skipped;
            }
            Err(e) => {
                warn!(
                    records = count,
                    error = %e,
                    "Failed to update store_name, records stay on source"
                );
                let mut report = report.lock();
                report.batches_failed += 1;
                report.uncommitted += count as u64;
                return;
            }
        }

        if self.options.clean_source {
            self.clean(batch.source_keys, report).await;
        }
    }

    async fn clean(&self, keys: Vec<ObjectKey>, report: &Mutex<MigrationReport>) {
        let source = &self.source;
        let results: Vec<bool> = stream::iter(keys)
            .map(|key| async move {
                match source.delete(&key).await {
                    Ok(()) => {
                        info!(key = %key, "Removed from source");
                        true
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "Failed to remove from source");
                        false
                    }
                }
            })
            .buffer_unordered(self.options.concurrency)
            .collect()
            .await;

        let cleaned = results.iter().filter(|ok| **ok).count() as u64;
        let mut report = report.lock();
        report.cleaned += cleaned;
        report.cleanup_failed += results.len() as u64 - cleaned;
    }

    /// Read-only stand-in for `prepare`: a missing store is treated as empty.
    async fn inspect(&self, store: &Arc<dyn ImageStore>) -> Result<Arc<dyn ImageStore>> {
        let name = store.name();
        let present = store
            .is_present()
            .await
            .with_context(|| format!("Failed to inspect {} store", name.cli_name()))?;
        if present {
            return Ok(store.clone());
        }
        info!(store = name.cli_name(), "Store does not exist yet, treating it as empty");
        Ok(Arc::new(AbsentStore::new(name)))
    }

    async fn page(
        &self,
        store: StoreName,
        after: Option<ImageId>,
    ) -> Result<Vec<ImageRecord>> {
        let records = self.records.clone();
        let limit = self.options.page_size;
        tokio::task::spawn_blocking(move || records.page(store, after, limit))
            .await
            .context("Record query task failed")?
            .context("Failed to fetch image records")
    }

    async fn count(&self, store: StoreName) -> Result<u64> {
        let records = self.records.clone();
        tokio::task::spawn_blocking(move || records.count(store))
            .await
            .context("Record query task failed")?
            .context("Failed to count image records")
    }
}
