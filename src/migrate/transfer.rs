//! Moving the objects of a single record.

use std::fmt;

use imgshift_common::ObjectKey;
use imgshift_db::models::ImageRecord;
use tracing::{debug, warn};

use crate::storage::{ImageStore, StoreResult};

/// Where a record ended up after its objects were processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// At least one object was copied; the rest were already present.
    Transferred,
    /// Every object was already at the destination.
    Skipped,
    /// An object could not be moved. The record stays on the source.
    Failed,
    /// The primary object exists in neither store.
    Missing,
}

impl RecordOutcome {
    /// Whether the record may be pointed at the destination.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Transferred | Self::Skipped)
    }
}

impl fmt::Display for RecordOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Transferred => "transferred",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::Missing => "missing",
        };
        f.write_str(s)
    }
}

/// Result of processing one record.
#[derive(Debug, Clone)]
pub struct RecordTransfer {
    pub outcome: RecordOutcome,
    /// Objects the source holds for this record. Cleanup deletes these.
    pub source_keys: Vec<ObjectKey>,
    pub objects_transferred: u64,
    pub objects_skipped: u64,
}

impl RecordTransfer {
    fn finished(outcome: RecordOutcome) -> Self {
        Self {
            outcome,
            source_keys: Vec::new(),
            objects_transferred: 0,
            objects_skipped: 0,
        }
    }
}

/// Copy every object of `record` from `source` to `destination`.
///
/// Never returns an error: failures are logged with the key and cause and
/// reported as [`RecordOutcome::Failed`].
pub async fn transfer_record(
    source: &dyn ImageStore,
    destination: &dyn ImageStore,
    record: &ImageRecord,
    force: bool,
    dry_run: bool,
) -> RecordTransfer {
    let keys = match source.variants(record).await {
        Ok(keys) => keys,
        Err(e) => {
            warn!(id = %record.id, error = %e, "Failed to locate objects on source");
            return RecordTransfer::finished(RecordOutcome::Failed);
        }
    };

    let primary = record.object_key();
    if !keys.contains(&primary) {
        match destination.exists(&primary).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(id = %record.id, key = %primary, "Image not found in either store");
                return RecordTransfer::finished(RecordOutcome::Missing);
            }
            Err(e) => {
                warn!(id = %record.id, key = %primary, error = %e, "Failed to check destination");
                return RecordTransfer::finished(RecordOutcome::Failed);
            }
        }
    }

    let mut result = RecordTransfer::finished(RecordOutcome::Skipped);
    for key in &keys {
        match copy_object(source, destination, record, key, force, dry_run).await {
            Ok(true) => result.objects_transferred += 1,
            Ok(false) => result.objects_skipped += 1,
            Err(e) => {
                warn!(id = %record.id, key = %key, error = %e, "Failed to transfer object");
                result.outcome = RecordOutcome::Failed;
                return result;
            }
        }
    }

    if result.objects_transferred > 0 {
        result.outcome = RecordOutcome::Transferred;
    }
    result.source_keys = keys;
    result
}

/// Copy one object. Returns `false` when the destination already had it.
async fn copy_object(
    source: &dyn ImageStore,
    destination: &dyn ImageStore,
    record: &ImageRecord,
    key: &ObjectKey,
    force: bool,
    dry_run: bool,
) -> StoreResult<bool> {
    if !force && destination.exists(key).await? {
        debug!(key = %key, "Already at destination");
        return Ok(false);
    }
    if dry_run {
        debug!(key = %key, "Would transfer");
        return Ok(true);
    }

    let data = source.get(key).await?;
    let size = data.len();
    let content_type = key.format().unwrap_or(record.format).content_type();
    destination.put(key, data, content_type).await?;

    debug!(key = %key, size, "Transferred");
    Ok(true)
}
