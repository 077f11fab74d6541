//! Stand-in for a backend that has not been created yet.

use async_trait::async_trait;
use bytes::Bytes;
use imgshift_common::{ObjectKey, StoreName};

use super::{ImageStore, Listing, StoreError, StoreResult};

/// An empty store whose root folder or bucket does not exist.
///
/// Dry runs read through this instead of calling `prepare`, so inspecting a
/// fresh destination never creates it. Writes are refused.
#[derive(Debug, Clone, Copy)]
pub struct AbsentStore {
    name: StoreName,
}

impl AbsentStore {
    pub fn new(name: StoreName) -> Self {
        Self { name }
    }
}

#[async_trait]
impl ImageStore for AbsentStore {
    fn name(&self) -> StoreName {
        self.name
    }

    async fn is_present(&self) -> StoreResult<bool> {
        Ok(false)
    }

    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes> {
        Err(StoreError::NotFound {
            key: key.to_string(),
        })
    }

    async fn put(&self, key: &ObjectKey, _data: Bytes, _content_type: &str) -> StoreResult<()> {
        Err(StoreError::Setup(format!(
            "Cannot write {}: {} store does not exist",
            key,
            self.name.cli_name()
        )))
    }

    async fn delete(&self, _key: &ObjectKey) -> StoreResult<()> {
        Ok(())
    }

    async fn exists(&self, _key: &ObjectKey) -> StoreResult<bool> {
        Ok(false)
    }

    async fn scan(&self, _prefix: Option<&str>) -> StoreResult<Listing> {
        Ok(Listing::default())
    }
}
