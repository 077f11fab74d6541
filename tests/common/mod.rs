//! Shared test harness for migration tests.
//!
//! Provides [`TestHarness`] with an in-memory database and two stores rooted
//! in a temp dir. The "object store" side is a [`FaultyStore`] wrapping a
//! local store, so tests can run without network access and inject failures
//! per key.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use imgshift::migrate::{MigrateOptions, MigrationReport, Migrator};
use imgshift::records::SqliteRecordSource;
use imgshift::storage::{ImageStore, Listing, LocalStore, StoreError, StoreResult};
use imgshift_common::{ImageFormat, ImageId, ObjectKey, StoreName};
use imgshift_db::models::ImageRecord;
use imgshift_db::pool::{init_memory_pool, DbPool, PooledConnection};
use imgshift_db::queries::images;
use tokio_util::sync::CancellationToken;

/// Store wrapper that counts writes and fails on demand.
pub struct FaultyStore {
    inner: LocalStore,
    name: StoreName,
    fail_puts: Mutex<HashSet<ObjectKey>>,
    fail_deletes: Mutex<HashSet<ObjectKey>>,
    puts: AtomicUsize,
    deletes: AtomicUsize,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl FaultyStore {
    pub fn new(inner: LocalStore, name: StoreName) -> Self {
        Self {
            inner,
            name,
            fail_puts: Mutex::new(HashSet::new()),
            fail_deletes: Mutex::new(HashSet::new()),
            puts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            cancel_after: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &LocalStore {
        &self.inner
    }

    pub fn fail_put(&self, key: ObjectKey) {
        self.fail_puts.lock().insert(key);
    }

    pub fn fail_delete(&self, key: ObjectKey) {
        self.fail_deletes.lock().insert(key);
    }

    /// Cancel `token` once `puts` writes have succeeded, as if the user hit
    /// Ctrl-C in the middle of a run.
    pub fn cancel_after_puts(&self, puts: usize, token: CancellationToken) {
        *self.cancel_after.lock() = Some((puts, token));
    }

    /// Successful writes so far.
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Successful deletes so far.
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageStore for FaultyStore {
    fn name(&self) -> StoreName {
        self.name
    }

    async fn prepare(&self) -> StoreResult<()> {
        self.inner.prepare().await
    }

    async fn is_present(&self) -> StoreResult<bool> {
        self.inner.is_present().await
    }

    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &ObjectKey, data: Bytes, content_type: &str) -> StoreResult<()> {
        if self.fail_puts.lock().contains(key) {
            return Err(StoreError::Backend {
                key: key.to_string(),
                message: "injected put failure".to_string(),
            });
        }
        self.inner.put(key, data, content_type).await?;
        let puts = self.puts.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, token)) = &*self.cancel_after.lock() {
            if puts >= *after {
                token.cancel();
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
        if self.fail_deletes.lock().contains(key) {
            return Err(StoreError::Backend {
                key: key.to_string(),
                message: "injected delete failure".to_string(),
            });
        }
        self.inner.delete(key).await?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn exists(&self, key: &ObjectKey) -> StoreResult<bool> {
        self.inner.exists(key).await
    }

    async fn scan(&self, prefix: Option<&str>) -> StoreResult<Listing> {
        self.inner.scan(prefix).await
    }

    async fn sweep_incomplete(&self, dry_run: bool) -> StoreResult<u64> {
        self.inner.sweep_incomplete(dry_run).await
    }
}

/// Test harness: in-memory DB, a local store and a fake object store.
pub struct TestHarness {
    _dir: tempfile::TempDir,
    pub db: DbPool,
    pub local: Arc<FaultyStore>,
    pub remote: Arc<FaultyStore>,
}

impl TestHarness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let db = init_memory_pool().expect("failed to create in-memory pool");

        let local = LocalStore::new(dir.path().join("images")).expect("local root");
        let remote = LocalStore::new(dir.path().join("bucket")).expect("remote root");

        Self {
            _dir: dir,
            db,
            local: Arc::new(FaultyStore::new(local, StoreName::Local)),
            remote: Arc::new(FaultyStore::new(remote, StoreName::ObjectStore)),
        }
    }

    /// Get a connection. Drop it before running a migration: the in-memory
    /// pool holds a single connection.
    pub fn conn(&self) -> PooledConnection {
        self.db.get().expect("failed to get connection")
    }

    pub fn store(&self, name: StoreName) -> &Arc<FaultyStore> {
        match name {
            StoreName::Local => &self.local,
            StoreName::ObjectStore => &self.remote,
        }
    }

    /// Insert a record on `store` without any stored object.
    pub fn add_record(&self, format: ImageFormat, store: StoreName) -> ImageRecord {
        let record = ImageRecord::new(format, store);
        images::insert_image(&self.conn(), &record).expect("insert image");
        record
    }

    /// Insert a record on `store` and write its primary object there.
    pub async fn add_image(&self, format: ImageFormat, store: StoreName) -> ImageRecord {
        let record = self.add_record(format, store);
        self.store(store)
            .save_record(&record, image_bytes(&record))
            .await
            .expect("save image");
        record
    }

    /// Write an extra variant object next to a record's primary object.
    pub async fn add_variant(&self, record: &ImageRecord, suffix: &str) -> ObjectKey {
        let key = ObjectKey::parse(format!(
            "{}{}.{}",
            record.shard().variant_prefix(),
            suffix,
            record.format.extension()
        ))
        .expect("variant key");
        self.store(record.store_name)
            .put(&key, Bytes::from(format!("variant {}", suffix)), record.format.content_type())
            .await
            .expect("save variant");
        key
    }

    pub fn store_of(&self, id: ImageId) -> StoreName {
        images::get_image(&self.conn(), id)
            .expect("get image")
            .expect("image exists")
            .store_name
    }

    pub fn count(&self, store: StoreName) -> u64 {
        images::count_by_store(&self.conn(), store).expect("count")
    }

    /// Make every `store_name` update fail.
    pub fn reject_store_updates(&self) {
        self.conn()
            .execute_batch(
                "CREATE TRIGGER reject_store_update BEFORE UPDATE OF store_name ON images
                 BEGIN SELECT RAISE(ABORT, 'store update rejected'); END;",
            )
            .expect("create trigger");
    }

    pub fn allow_store_updates(&self) {
        self.conn()
            .execute_batch("DROP TRIGGER IF EXISTS reject_store_update;")
            .expect("drop trigger");
    }

    pub fn migrator(&self, to: StoreName, options: MigrateOptions) -> Migrator {
        Migrator::new(
            self.store(to.other()).clone(),
            self.store(to).clone(),
            Arc::new(SqliteRecordSource::new(self.db.clone())),
            options,
        )
    }

    pub async fn migrate(&self, to: StoreName, options: MigrateOptions) -> MigrationReport {
        self.migrator(to, options)
            .run(CancellationToken::new())
            .await
            .expect("migration run")
    }
}

/// Distinct content per record so copies can be told apart.
pub fn image_bytes(record: &ImageRecord) -> Bytes {
    Bytes::from(format!("image {}", record.id))
}

pub fn options() -> MigrateOptions {
    MigrateOptions {
        page_size: 3,
        batch_size: 4,
        concurrency: 2,
        ..MigrateOptions::default()
    }
}
