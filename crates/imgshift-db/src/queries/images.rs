//! Image record queries.
//!
//! Besides plain inserts and lookups this module provides the two operations
//! storage migration depends on: keyset pagination over the records that
//! point at a given store, and an all-or-nothing store pointer update.

use chrono::{DateTime, NaiveDateTime, Utc};
use imgshift_common::{Error, ImageFormat, ImageId, Result, StoreName};
use rusqlite::types::Type;
use rusqlite::Connection;

use crate::models::ImageRecord;

/// Largest number of ids bound into a single `IN (...)` clause.
const MAX_IN_CLAUSE: usize = 500;

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Parse an image record from a database row.
///
/// Expects columns in order: id, format, store_name, width, height, size_bytes, created_at.
fn parse_image_row(row: &rusqlite::Row) -> rusqlite::Result<ImageRecord> {
    let id: String = row.get(0)?;
    let format: String = row.get(1)?;
    let store_name: String = row.get(2)?;
    let created_at: String = row.get(6)?;

    Ok(ImageRecord {
        id: id
            .parse::<ImageId>()
            .map_err(|e| conversion_error(0, e.to_string()))?,
        format: format
            .parse::<ImageFormat>()
            .map_err(|e| conversion_error(1, e))?,
        store_name: store_name
            .parse::<StoreName>()
            .map_err(|e| conversion_error(2, e))?,
        width: row.get(3)?,
        height: row.get(4)?,
        size_bytes: row.get(5)?,
        created_at: parse_timestamp(&created_at)
            .ok_or_else(|| conversion_error(6, format!("Invalid timestamp: {}", created_at)))?,
    })
}

/// Insert a new image record.
///
/// # Returns
///
/// * `Ok(ImageId)` - The ID of the inserted record
/// * `Err(Error)` - If a database error occurs
pub fn insert_image(conn: &Connection, image: &ImageRecord) -> Result<ImageId> {
    conn.execute(
        "INSERT INTO images (id, format, store_name, width, height, size_bytes, created_at)
         VALUES (:id, :format, :store_name, :width, :height, :size_bytes, :created_at)",
        rusqlite::named_params! {
            ":id": image.id.to_string(),
            ":format": image.format.as_str(),
            ":store_name": image.store_name.as_str(),
            ":width": image.width,
            ":height": image.height,
            ":size_bytes": image.size_bytes,
            ":created_at": image.created_at.to_rfc3339(),
        },
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(image.id)
}

/// Get an image record by ID.
///
/// # Returns
///
/// * `Ok(Some(ImageRecord))` - The record if found
/// * `Ok(None)` - If the record does not exist
/// * `Err(Error)` - If a database error occurs
pub fn get_image(conn: &Connection, id: ImageId) -> Result<Option<ImageRecord>> {
    let result = conn.query_row(
        "SELECT id, format, store_name, width, height, size_bytes, created_at
         FROM images WHERE id = :id",
        rusqlite::named_params! { ":id": id.to_string() },
        parse_image_row,
    );

    match result {
        Ok(image) => Ok(Some(image)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List records pointing at `store`, ordered by id, strictly after `after`.
///
/// This is keyset pagination: the caller passes the last id of the previous
/// page. Records that leave the filter between pages (because they were
/// migrated) cannot shift later records backwards, so nothing is skipped or
/// returned twice. An empty result marks the end.
pub fn list_images_after(
    conn: &Connection,
    store: StoreName,
    after: Option<ImageId>,
    limit: usize,
) -> Result<Vec<ImageRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, format, store_name, width, height, size_bytes, created_at
             FROM images
             WHERE store_name = :store_name AND id > :after
             ORDER BY id
             LIMIT :limit",
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let after = after.map(|id| id.to_string()).unwrap_or_default();
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);

    let images = stmt
        .query_map(
            rusqlite::named_params! {
                ":store_name": store.as_str(),
                ":after": after,
                ":limit": limit,
            },
            parse_image_row,
        )
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(images)
}

/// Point every record in `ids` at `store`, atomically.
///
/// All ids are updated inside one transaction; if any statement fails the
/// transaction is rolled back and no record changes.
///
/// # Returns
///
/// * `Ok(usize)` - Number of rows updated
/// * `Err(Error)` - If the transaction failed (nothing was changed)
pub fn update_store_name(conn: &Connection, ids: &[ImageId], store: StoreName) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(format!("Failed to start transaction: {}", e)))?;

    let mut updated = 0;
    for chunk in ids.chunks(MAX_IN_CLAUSE) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!(
            "UPDATE images SET store_name = ? WHERE id IN ({})",
            placeholders
        );

        let params = std::iter::once(store.as_str().to_string())
            .chain(chunk.iter().map(ImageId::to_string));

        // Dropping `tx` on the error path rolls the whole batch back.
        updated += tx
            .execute(&sql, rusqlite::params_from_iter(params))
            .map_err(|e| Error::database(format!("Failed to update store_name: {}", e)))?;
    }

    tx.commit()
        .map_err(|e| Error::database(format!("Failed to commit transaction: {}", e)))?;

    Ok(updated)
}

/// Count the records pointing at `store`.
pub fn count_by_store(conn: &Connection, store: StoreName) -> Result<u64> {
    conn.query_row(
        "SELECT COUNT(*) FROM images WHERE store_name = :store_name",
        rusqlite::named_params! { ":store_name": store.as_str() },
        |row| row.get::<_, i64>(0),
    )
    .map(|count| count.max(0) as u64)
    .map_err(|e| Error::database(e.to_string()))
}
