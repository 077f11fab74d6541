//! Storage backends for image bytes.
//!
//! [`ImageStore`] is the single interface the migration and cleanup code talk
//! to. Two implementations exist and are picked at construction time:
//!
//! - [`LocalStore`]: files under a root folder on the local filesystem
//! - [`S3Store`]: objects in an S3-compatible bucket
//!
//! Both address objects by the same relative [`ObjectKey`], so a key read
//! from one store can be written to the other unchanged.

mod absent;
mod local;
mod s3;

pub use absent::AbsentStore;
pub use local::LocalStore;
pub use s3::{bucket_policy, S3Store};

use async_trait::async_trait;
use bytes::Bytes;
use imgshift_common::{ObjectKey, StoreName};
use imgshift_db::models::ImageRecord;
use tracing::warn;

/// Errors raised by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The object does not exist.
    #[error("Object not found: {key}")]
    NotFound {
        /// Key that was looked up.
        key: String,
    },

    /// A filesystem operation failed.
    #[error("IO error on {key}: {source}")]
    Io {
        /// Key being accessed.
        key: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The remote object store returned an error.
    #[error("Object store error on {key}: {message}")]
    Backend {
        /// Key being accessed (empty for bucket-level calls).
        key: String,
        /// Human-readable error description.
        message: String,
    },

    /// The backend could not be made ready (credentials, endpoint, bucket).
    #[error("Storage setup failed: {0}")]
    Setup(String),
}

impl StoreError {
    /// Whether this error means the object is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub(crate) fn io(key: &ObjectKey, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound {
                key: key.to_string(),
            }
        } else {
            Self::Io {
                key: key.to_string(),
                source,
            }
        }
    }
}

/// Result alias for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Raw result of walking a store.
///
/// Names that are not valid [`ObjectKey`]s (`a//b`, a file name with a
/// backslash) are kept apart so one odd object cannot fail a whole listing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Listing {
    pub keys: Vec<ObjectKey>,
    pub rejected: Vec<String>,
}

impl Listing {
    /// Sort a raw object name into `keys` or `rejected`.
    pub fn push_raw(&mut self, raw: String) {
        match ObjectKey::parse(raw.as_str()) {
            Ok(key) => self.keys.push(key),
            Err(_) => self.rejected.push(raw),
        }
    }
}

/// A backend that holds image objects.
///
/// All key-level operations are idempotent where that makes sense: `put`
/// overwrites, `delete` of a missing object succeeds, and `exists` reports a
/// missing object as `Ok(false)` rather than an error.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Which backend this is; also the value written to `images.store_name`.
    fn name(&self) -> StoreName;

    /// Make the backend ready for use, creating it if needed. Failures here
    /// are fatal for a run.
    async fn prepare(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Whether the backend (root folder, bucket) exists. Never creates it.
    async fn is_present(&self) -> StoreResult<bool> {
        Ok(true)
    }

    /// Read an object.
    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes>;

    /// Write an object, replacing any previous content.
    async fn put(&self, key: &ObjectKey, data: Bytes, content_type: &str) -> StoreResult<()>;

    /// Remove an object. Removing a missing object is not an error.
    async fn delete(&self, key: &ObjectKey) -> StoreResult<()>;

    /// Check whether an object exists without reading its content.
    async fn exists(&self, key: &ObjectKey) -> StoreResult<bool>;

    /// Walk every object, optionally restricted to a key prefix.
    async fn scan(&self, prefix: Option<&str>) -> StoreResult<Listing>;

    /// Remove leftovers of interrupted writes. Returns how many were found;
    /// with `dry_run` they are only counted.
    async fn sweep_incomplete(&self, _dry_run: bool) -> StoreResult<u64> {
        Ok(0)
    }

    /// Every addressable object key, optionally restricted to a key prefix.
    /// Objects whose names are not valid keys are logged and left out.
    async fn list(&self, prefix: Option<&str>) -> StoreResult<Vec<ObjectKey>> {
        let listing = self.scan(prefix).await?;
        for raw in &listing.rejected {
            warn!(store = self.name().cli_name(), object = %raw, "Skipping object with an unusable key");
        }
        Ok(listing.keys)
    }

    /// Read the primary object of a record.
    async fn get_record(&self, record: &ImageRecord) -> StoreResult<Bytes> {
        self.get(&record.object_key()).await
    }

    /// Write the primary object of a record.
    async fn save_record(&self, record: &ImageRecord, data: Bytes) -> StoreResult<()> {
        self.put(&record.object_key(), data, record.format.content_type())
            .await
    }

    /// Remove the primary object of a record.
    async fn delete_record(&self, record: &ImageRecord) -> StoreResult<()> {
        self.delete(&record.object_key()).await
    }

    /// Check whether the primary object of a record exists.
    async fn exists_record(&self, record: &ImageRecord) -> StoreResult<bool> {
        self.exists(&record.object_key()).await
    }

    /// Every object this store holds for a record: the primary object and
    /// any legacy variants sharing its shard folder and hash stem.
    async fn variants(&self, record: &ImageRecord) -> StoreResult<Vec<ObjectKey>> {
        let shard = record.shard();
        let mut keys = self.list(Some(&shard.variant_prefix())).await?;
        keys.retain(|key| key.belongs_to(&shard));
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_separates_unusable_names() {
        let mut listing = Listing::default();
        for raw in ["ab/c/good.jpg", "ab//c.jpg", "/abs.jpg", "ab/c/we\\ird.jpg"] {
            listing.push_raw(raw.to_string());
        }

        assert_eq!(listing.keys, vec![ObjectKey::parse("ab/c/good.jpg").unwrap()]);
        assert_eq!(listing.rejected.len(), 3);
    }
}
