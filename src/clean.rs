//! Bulk removal of every object in a store.
//!
//! This does not look at the database. Running it against a store that
//! records still point at destroys those images, so only use it after a
//! migration away from the store has finished with no failures.

use std::fmt;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::storage::ImageStore;

/// Outcome of a bulk cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// Objects deleted (or that would be, in a dry run).
    pub removed: u64,
    /// Objects that could not be deleted, including ones whose names are not
    /// valid keys.
    pub failed: u64,
    /// Leftovers of interrupted writes removed (or found, in a dry run).
    pub incomplete: u64,
    pub cancelled: bool,
    pub dry_run: bool,
}

impl fmt::Display for CleanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.dry_run { "Would remove" } else { "Removed" };
        write!(f, "{} {} objects", verb, self.removed)?;
        if self.incomplete > 0 {
            write!(f, ", {} incomplete writes", self.incomplete)?;
        }
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

/// Delete every object `store` holds.
///
/// The store is never created: a missing root folder or bucket is simply
/// empty. Individual delete failures are logged and counted; only inspection
/// and listing failures abort the run.
pub async fn clean_store(
    store: &dyn ImageStore,
    dry_run: bool,
    cancel: CancellationToken,
) -> Result<CleanReport> {
    let name = store.name().cli_name();
    let mut report = CleanReport {
        dry_run,
        ..Default::default()
    };

    let present = store
        .is_present()
        .await
        .with_context(|| format!("Failed to inspect {} store", name))?;
    if !present {
        info!(store = name, "Store does not exist, nothing to clean");
        return Ok(report);
    }

    let listing = store
        .scan(None)
        .await
        .with_context(|| format!("Failed to list {} store", name))?;
    info!(
        store = name,
        objects = listing.keys.len(),
        unusable = listing.rejected.len(),
        dry_run,
        "Cleaning store"
    );

    for raw in &listing.rejected {
        warn!(object = %raw, "Object name is not a valid key, leaving it in place");
        report.failed += 1;
    }

    for key in listing.keys {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        if dry_run {
            info!(key = %key, "Would remove");
            report.removed += 1;
            continue;
        }
        match store.delete(&key).await {
            Ok(()) => {
                info!(key = %key, "Removed");
                report.removed += 1;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to remove");
                report.failed += 1;
            }
        }
    }

    if !report.cancelled {
        report.incomplete = store
            .sweep_incomplete(dry_run)
            .await
            .with_context(|| format!("Failed to sweep incomplete writes in {} store", name))?;
    }

    Ok(report)
}
