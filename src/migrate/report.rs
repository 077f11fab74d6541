use std::fmt;

use imgshift_common::StoreName;

/// Counters collected over one migration run.
///
/// Record counters (`transferred`, `skipped`) are credited when the batch
/// holding the record commits, so they always match what the database says.
/// Object counters are credited as soon as the bytes move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub source: StoreName,
    pub destination: StoreName,
    /// Records whose objects were copied and whose pointer now names the destination.
    pub transferred: u64,
    /// Records already present at the destination; pointer flipped without copying.
    pub skipped: u64,
    /// Records left on the source because an object could not be moved.
    pub failed: u64,
    /// Records with no object in either store.
    pub missing: u64,
    pub objects_transferred: u64,
    pub objects_skipped: u64,
    /// Records that were ready but whose batch failed to commit.
    pub uncommitted: u64,
    pub batches_committed: u64,
    pub batches_failed: u64,
    /// Source objects removed after their batch committed.
    pub cleaned: u64,
    pub cleanup_failed: u64,
    pub cancelled: bool,
    pub dry_run: bool,
}

impl MigrationReport {
    pub fn new(source: StoreName, destination: StoreName, dry_run: bool) -> Self {
        Self {
            source,
            destination,
            transferred: 0,
            skipped: 0,
            failed: 0,
            missing: 0,
            objects_transferred: 0,
            objects_skipped: 0,
            uncommitted: 0,
            batches_committed: 0,
            batches_failed: 0,
            cleaned: 0,
            cleanup_failed: 0,
            cancelled: false,
            dry_run,
        }
    }

    /// Whether every ready record reached the database. A run with failed
    /// objects can still be complete; those records are retried next run.
    pub fn is_complete(&self) -> bool {
        self.batches_failed == 0 && !self.cancelled
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.cancelled {
            "cancelled"
        } else if self.batches_failed > 0 {
            "incomplete"
        } else {
            "complete"
        };
        write!(
            f,
            "Migration {} -> {} {}",
            self.source.cli_name(),
            self.destination.cli_name(),
            status
        )?;
        if self.dry_run {
            write!(f, " (dry run, nothing was changed)")?;
        }
        writeln!(f)?;

        let verb = if self.dry_run { "would transfer" } else { "transferred" };
        writeln!(f, "  Records {}: {}", verb, self.transferred)?;
        writeln!(f, "  Records already at destination: {}", self.skipped)?;
        writeln!(f, "  Records failed: {}", self.failed)?;
        writeln!(f, "  Records missing: {}", self.missing)?;
        writeln!(
            f,
            "  Objects {}: {} (skipped {})",
            verb, self.objects_transferred, self.objects_skipped
        )?;
        if !self.dry_run {
            writeln!(
                f,
                "  Batches committed: {} (failed {}, {} records uncommitted)",
                self.batches_committed, self.batches_failed, self.uncommitted
            )?;
        }
        if self.cleaned > 0 || self.cleanup_failed > 0 {
            writeln!(
                f,
                "  Source objects cleaned: {} (failed {})",
                self.cleaned, self.cleanup_failed
            )?;
        }
        Ok(())
    }
}
