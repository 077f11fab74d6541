//! Imgshift-Common: Shared types and utilities.
//!
//! This crate provides common functionality used across imgshift:
//!
//! - **Typed IDs**: The 128-bit [`ImageId`] wrapper
//! - **Core Types**: [`ImageFormat`] and [`StoreName`]
//! - **Path Resolution**: Deterministic, sharded object keys for images
//! - **Error Handling**: Common error types and result aliases
//!
//! # Examples
//!
//! ```
//! use imgshift_common::{ImageFormat, ImageId};
//! use imgshift_common::paths::resolve;
//!
//! let id = ImageId::new();
//! let key = resolve(&id, ImageFormat::Jpeg);
//!
//! // Same input, same key.
//! assert_eq!(key, resolve(&id, ImageFormat::Jpeg));
//! assert!(key.as_str().ends_with(".jpg"));
//! ```

pub mod error;
pub mod ids;
pub mod paths;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use paths::ObjectKey;
pub use types::*;
