//! Imgshift-DB: Database schema, migrations, and image record queries
//!
//! This crate provides the relational side of imgshift using SQLite
//! with rusqlite and r2d2 connection pooling. The `images.store_name`
//! column is the location of truth for every stored image.
//!
//! # Modules
//!
//! - `migrations` - Database schema migrations
//! - `pool` - Connection pool management
//! - `models` - Rust models matching database schema
//! - `queries` - Database query operations
//!
//! # Example
//!
//! ```no_run
//! use imgshift_common::StoreName;
//! use imgshift_db::pool::{init_pool, get_conn};
//! use imgshift_db::queries::images;
//!
//! let pool = init_pool("/var/lib/imgshift/db.sqlite").unwrap();
//! let conn = get_conn(&pool).unwrap();
//!
//! let first_page = images::list_images_after(&conn, StoreName::Local, None, 100).unwrap();
//! println!("{} images still on disk", first_page.len());
//! ```

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
