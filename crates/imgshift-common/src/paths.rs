//! Deterministic object keys for stored images.
//!
//! Every image lives at a key derived from the SHA-1 of its id's raw bytes:
//! the first two hex characters name the top-level folder, the third names the
//! sub-folder, and the remaining 37 characters form the file stem. Hashing
//! spreads images evenly over 4096 shards no matter how ids are issued.
//!
//! ```text
//! sha1(id) = e129f27c5103bc5cc44bcdf0a15e160d445066ff
//! key      = e1/2/9f27c5103bc5cc44bcdf0a15e160d445066ff.jpg
//! ```
//!
//! Legacy layouts also wrote size variants next to the original
//! (`<stem>_thumb.jpg` and similar). All of them share the
//! [`Shard::variant_prefix`], which is how a record finds the full set of
//! objects it owns.

use std::fmt;
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};

use crate::{Error, ImageFormat, ImageId, Result};

/// Number of hex characters used for the top-level shard folder.
const TOP_LEVEL_LEN: usize = 2;

/// Number of hex characters used for the second-level shard folder.
const SUB_LEVEL_LEN: usize = 1;

/// Shard location of an image: its folder and hash stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shard {
    /// Two-level folder, e.g. `e1/2`.
    pub folder: String,
    /// Remaining hash characters used as the file stem.
    pub stem: String,
}

impl Shard {
    /// Key prefix shared by the original object and all of its variants.
    pub fn variant_prefix(&self) -> String {
        format!("{}/{}", self.folder, self.stem)
    }
}

/// Compute the shard of an image id.
pub fn shard(id: &ImageId) -> Shard {
    let digest = Sha1::digest(id.as_bytes());
    let hex = hex::encode(digest);
    let split = TOP_LEVEL_LEN + SUB_LEVEL_LEN;

    Shard {
        folder: format!("{}/{}", &hex[..TOP_LEVEL_LEN], &hex[TOP_LEVEL_LEN..split]),
        stem: hex[split..].to_string(),
    }
}

/// Resolve the primary object key of an image.
///
/// Pure and total: the same `(id, format)` always yields the same key.
pub fn resolve(id: &ImageId, format: ImageFormat) -> ObjectKey {
    let shard = shard(id);
    ObjectKey(format!(
        "{}/{}.{}",
        shard.folder,
        shard.stem,
        format.extension()
    ))
}

/// Relative, `/`-separated key of a stored object.
///
/// The same key addresses the object in every backend: as a path below the
/// local images folder and as the object name inside the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Validate a key read from an external listing.
    pub fn parse<S: Into<String>>(key: S) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::invalid_input("Object key is empty"));
        }
        if key.starts_with('/') || key.contains('\\') {
            return Err(Error::invalid_input(format!("Object key is not relative: {}", key)));
        }
        if key.split('/').any(|segment| segment.is_empty() || segment == "..") {
            return Err(Error::invalid_input(format!("Malformed object key: {}", key)));
        }
        Ok(Self(key))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join this key below a filesystem root.
    pub fn to_path(&self, root: &Path) -> PathBuf {
        self.0
            .split('/')
            .fold(root.to_path_buf(), |path, segment| path.join(segment))
    }

    /// File name component of the key.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Format inferred from the key's extension.
    pub fn format(&self) -> Option<ImageFormat> {
        let name = self.file_name();
        let (_, ext) = name.rsplit_once('.')?;
        ImageFormat::from_extension(ext)
    }

    /// Whether this key belongs to the given shard (original or variant).
    pub fn belongs_to(&self, shard: &Shard) -> bool {
        self.0.starts_with(&shard.variant_prefix())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
