//! Core type definitions for images and storage backends.
//!
//! [`ImageFormat`] maps an encoded image to its file extension and MIME type.
//! [`StoreName`] names the backend that currently holds an image's bytes; its
//! string form is the value persisted in the `images.store_name` column.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Encoding of a stored image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// JPEG image.
    Jpeg,
    /// PNG image.
    Png,
    /// WebP image.
    Webp,
    /// GIF image.
    Gif,
}

impl ImageFormat {
    /// Canonical file extension, without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Gif => "gif",
        }
    }

    /// MIME content type sent to the object store.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
        }
    }

    /// Value stored in the `images.format` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Gif => "gif",
        }
    }

    /// Infer the format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| format!("Invalid image format: {}", s))
    }
}

/// Physical storage backend holding an image's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreName {
    /// Local filesystem under the configured images folder.
    #[serde(rename = "disk")]
    Local,
    /// S3-compatible object store bucket.
    #[serde(rename = "s3")]
    ObjectStore,
}

impl StoreName {
    /// Value stored in the `images.store_name` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "disk",
            Self::ObjectStore => "s3",
        }
    }

    /// Name used on the command line.
    pub fn cli_name(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::ObjectStore => "object-store",
        }
    }

    /// The other backend.
    pub fn other(&self) -> Self {
        match self {
            Self::Local => Self::ObjectStore,
            Self::ObjectStore => Self::Local,
        }
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disk" | "local" => Ok(Self::Local),
            "s3" | "object-store" => Ok(Self::ObjectStore),
            _ => Err(format!("Invalid store name: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_extension_and_content_type() {
        assert_eq!(ImageFormat::Jpeg.extension(), "jpg");
        assert_eq!(ImageFormat::Jpeg.content_type(), "image/jpeg");
        assert_eq!(ImageFormat::Png.extension(), "png");
        assert_eq!(ImageFormat::Png.content_type(), "image/png");
        assert_eq!(ImageFormat::Webp.extension(), "webp");
        assert_eq!(ImageFormat::Webp.content_type(), "image/webp");
        assert_eq!(ImageFormat::Gif.content_type(), "image/gif");
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ImageFormat::from_extension("jpg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("JPEG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("WebP"), Some(ImageFormat::Webp));
        assert_eq!(ImageFormat::from_extension("bmp"), None);
    }

    #[test]
    fn test_format_column_round_trip() {
        for format in [
            ImageFormat::Jpeg,
            ImageFormat::Png,
            ImageFormat::Webp,
            ImageFormat::Gif,
        ] {
            assert_eq!(format.as_str().parse::<ImageFormat>().unwrap(), format);
        }
    }

    #[test]
    fn test_format_serialization() {
        let json = serde_json::to_string(&ImageFormat::Webp).unwrap();
        assert_eq!(json, r#""webp""#);
    }

    #[test]
    fn test_store_name_column_values() {
        assert_eq!(StoreName::Local.to_string(), "disk");
        assert_eq!(StoreName::ObjectStore.to_string(), "s3");
    }

    #[test]
    fn test_store_name_parse() {
        assert_eq!("disk".parse::<StoreName>().unwrap(), StoreName::Local);
        assert_eq!("local".parse::<StoreName>().unwrap(), StoreName::Local);
        assert_eq!("s3".parse::<StoreName>().unwrap(), StoreName::ObjectStore);
        assert_eq!(
            "object-store".parse::<StoreName>().unwrap(),
            StoreName::ObjectStore
        );
        assert!("tape".parse::<StoreName>().is_err());

        for store in [StoreName::Local, StoreName::ObjectStore] {
            assert_eq!(store.cli_name().parse::<StoreName>().unwrap(), store);
        }
    }

    #[test]
    fn test_store_name_other() {
        assert_eq!(StoreName::Local.other(), StoreName::ObjectStore);
        assert_eq!(StoreName::ObjectStore.other(), StoreName::Local);
    }

    #[test]
    fn test_store_name_serialization() {
        let json = serde_json::to_string(&StoreName::ObjectStore).unwrap();
        assert_eq!(json, r#""s3""#);
        let back: StoreName = serde_json::from_str(r#""disk""#).unwrap();
        assert_eq!(back, StoreName::Local);
    }
}
