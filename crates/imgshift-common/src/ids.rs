//! Typed ID wrappers.
//!
//! [`ImageId`] is a newtype around a UUID so image identifiers can't be mixed
//! up with arbitrary strings. Its 16 raw bytes are what the path resolver
//! hashes, and its hyphenated lowercase text form is what the database stores.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Unique, immutable 128-bit identifier for an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(Uuid);

impl ImageId {
    /// Generate a new random image ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Build an ID from its raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// The raw 16 bytes of the identifier.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for ImageId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ImageId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<ImageId> for Uuid {
    fn from(id: ImageId) -> Self {
        id.0
    }
}

impl FromStr for ImageId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::invalid_input(format!("Invalid image id '{}': {}", s, e)))
    }
}

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_id_creation() {
        let id1 = ImageId::new();
        let id2 = ImageId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_image_id_from_uuid() {
        let uuid = Uuid::new_v4();
        let id = ImageId::from(uuid);
        let uuid_back: Uuid = id.into();
        assert_eq!(uuid, uuid_back);
    }

    #[test]
    fn test_image_id_bytes_round_trip() {
        let bytes = [0xa1, 0xb2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01];
        let id = ImageId::from_bytes(bytes);
        assert_eq!(id.as_bytes(), &bytes);
    }

    #[test]
    fn test_image_id_parse() {
        let id = ImageId::new();
        let parsed: ImageId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);

        assert!("not-a-uuid".parse::<ImageId>().is_err());
    }

    #[test]
    fn test_text_order_matches_id_order() {
        let low = ImageId::from_bytes([0x10; 16]);
        let high = ImageId::from_bytes([0xf0; 16]);
        assert!(low < high);
        assert!(low.to_string() < high.to_string());
    }

    #[test]
    fn test_image_id_serialization() {
        let id = ImageId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: ImageId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
