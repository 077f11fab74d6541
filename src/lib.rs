//! imgshift - content-addressed image storage with local/S3 migration
//!
//! The library crate exposes the storage backends, the record source and the
//! migration engine for integration testing. The `imgshift` binary wires them
//! to configuration and the command line.

pub mod clean;
pub mod config;
pub mod migrate;
pub mod records;
pub mod storage;
