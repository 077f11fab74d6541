//! Rust models matching the database schema.

use chrono::{DateTime, Utc};
use imgshift_common::paths::{self, ObjectKey, Shard};
use imgshift_common::{ImageFormat, ImageId, StoreName};
use serde::{Deserialize, Serialize};

/// Image record model.
///
/// `store_name` is authoritative for where the bytes live. The stored objects
/// themselves are derived from `(id, format)` through the path resolver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageRecord {
    pub id: ImageId,
    pub format: ImageFormat,
    pub store_name: StoreName,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub size_bytes: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl ImageRecord {
    /// Create a record for a freshly stored image.
    pub fn new(format: ImageFormat, store_name: StoreName) -> Self {
        Self {
            id: ImageId::new(),
            format,
            store_name,
            width: None,
            height: None,
            size_bytes: None,
            created_at: Utc::now(),
        }
    }

    /// Key of the primary stored object.
    pub fn object_key(&self) -> ObjectKey {
        paths::resolve(&self.id, self.format)
    }

    /// Shard shared by the primary object and its variants.
    pub fn shard(&self) -> Shard {
        paths::shard(&self.id)
    }
}
