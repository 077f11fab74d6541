use imgshift_common::{ImageId, ObjectKey};

use super::transfer::{RecordOutcome, RecordTransfer};

/// Records whose objects are at the destination but whose pointer has not
/// been committed yet.
#[derive(Debug, Default)]
pub struct PendingBatch {
    ids: Vec<ImageId>,
    source_keys: Vec<ObjectKey>,
    transferred: u64,
    skipped: u64,
}

impl PendingBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a record. Records that are not ready are ignored.
    pub fn push(&mut self, id: ImageId, transfer: RecordTransfer) {
        match transfer.outcome {
            RecordOutcome::Transferred => self.transferred += 1,
            RecordOutcome::Skipped => self.skipped += 1,
            RecordOutcome::Failed | RecordOutcome::Missing => return,
        }
        self.ids.push(id);
        self.source_keys.extend(transfer.source_keys);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Take the queued records, leaving the batch empty.
    pub fn take(&mut self) -> Batch {
        let batch = std::mem::take(self);
        Batch {
            ids: batch.ids,
            source_keys: batch.source_keys,
            transferred: batch.transferred,
            skipped: batch.skipped,
        }
    }
}

/// A batch on its way to the database.
#[derive(Debug)]
pub struct Batch {
    pub ids: Vec<ImageId>,
    pub source_keys: Vec<ObjectKey>,
    pub transferred: u64,
    pub skipped: u64,
}
