//! Database query modules.
//!
//! - images: Image record reads, cursor pagination, and store pointer updates

pub mod images;
