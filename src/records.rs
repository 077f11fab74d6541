//! Access to image records for the migration engine.
//!
//! The migrator only needs three things from the database: a page of records
//! pointing at a store, a way to flip a batch of them to another store, and
//! counts for reporting. [`RecordSource`] captures exactly that so tests can
//! drive the migrator against any backing.

use imgshift_common::{ImageId, Result, StoreName};
use imgshift_db::models::ImageRecord;
use imgshift_db::pool::{get_conn, DbPool};
use imgshift_db::queries::images;

/// Blocking access to image records.
///
/// Callers on the async runtime must go through `spawn_blocking`.
pub trait RecordSource: Send + Sync {
    /// Records on `store` with an id greater than `after`, ordered by id.
    /// An empty page means there are no more records.
    fn page(&self, store: StoreName, after: Option<ImageId>, limit: usize)
        -> Result<Vec<ImageRecord>>;

    /// Point every record in `ids` at `store` in one transaction.
    fn update_store(&self, ids: &[ImageId], store: StoreName) -> Result<usize>;

    /// Number of records on `store`.
    fn count(&self, store: StoreName) -> Result<u64>;
}

/// [`RecordSource`] backed by the SQLite `images` table.
#[derive(Clone)]
pub struct SqliteRecordSource {
    pool: DbPool,
}

impl SqliteRecordSource {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl RecordSource for SqliteRecordSource {
    fn page(
        &self,
        store: StoreName,
        after: Option<ImageId>,
        limit: usize,
    ) -> Result<Vec<ImageRecord>> {
        let conn = get_conn(&self.pool)?;
        images::list_images_after(&conn, store, after, limit)
    }

    fn update_store(&self, ids: &[ImageId], store: StoreName) -> Result<usize> {
        let conn = get_conn(&self.pool)?;
        images::update_store_name(&conn, ids, store)
    }

    fn count(&self, store: StoreName) -> Result<u64> {
        let conn = get_conn(&self.pool)?;
        images::count_by_store(&conn, store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgshift_common::ImageFormat;
    use imgshift_db::pool::init_memory_pool;

    fn source_with(n: usize) -> (SqliteRecordSource, Vec<ImageId>) {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let mut ids = Vec::new();
        for _ in 0..n {
            let record = ImageRecord::new(ImageFormat::Jpeg, StoreName::Local);
            ids.push(images::insert_image(&conn, &record).unwrap());
        }
        drop(conn);
        ids.sort();
        (SqliteRecordSource::new(pool), ids)
    }

    #[test]
    fn test_page_walks_all_records() {
        let (source, ids) = source_with(7);

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = source.page(StoreName::Local, cursor, 3).unwrap();
            if page.is_empty() {
                break;
            }
            cursor = page.last().map(|r| r.id);
            seen.extend(page.into_iter().map(|r| r.id));
        }

        assert_eq!(seen, ids);
    }

    #[test]
    fn test_update_store_and_count() {
        let (source, ids) = source_with(4);

        let updated = source
            .update_store(&ids[..3], StoreName::ObjectStore)
            .unwrap();
        assert_eq!(updated, 3);
        assert_eq!(source.count(StoreName::ObjectStore).unwrap(), 3);
        assert_eq!(source.count(StoreName::Local).unwrap(), 1);
    }

    #[test]
    fn test_update_store_empty_is_noop() {
        let (source, _) = source_with(2);
        assert_eq!(source.update_store(&[], StoreName::ObjectStore).unwrap(), 0);
        assert_eq!(source.count(StoreName::Local).unwrap(), 2);
    }
}
