//! Local filesystem image store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use imgshift_common::{ObjectKey, StoreName};
use walkdir::WalkDir;

use super::{ImageStore, Listing, StoreError, StoreResult};

/// Suffix of in-flight writes. Files carrying it are never listed.
const PARTIAL_SUFFIX: &str = ".partial";

/// Image store rooted at a folder on the local filesystem.
///
/// Objects live at `{root}/{key}`. Shard folders are created lazily when the
/// first object in them is written.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `root`. Relative roots are resolved against
    /// the current directory so later `chdir`s can't move the store.
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()?.join(root)
        };
        Ok(Self { root })
    }

    /// Root folder of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path of an object.
    pub fn path_of(&self, key: &ObjectKey) -> PathBuf {
        key.to_path(&self.root)
    }

    /// `/`-joined name of a file below the root, before key validation.
    fn raw_key(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[async_trait]
impl ImageStore for LocalStore {
    fn name(&self) -> StoreName {
        StoreName::Local
    }

    async fn prepare(&self) -> StoreResult<()> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            StoreError::Setup(format!(
                "Failed to create images folder {}: {}",
                self.root.display(),
                e
            ))
        })
    }

    async fn is_present(&self) -> StoreResult<bool> {
        tokio::fs::try_exists(&self.root).await.map_err(|e| {
            StoreError::Setup(format!(
                "Failed to inspect images folder {}: {}",
                self.root.display(),
                e
            ))
        })
    }

    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes> {
        let data = tokio::fs::read(self.path_of(key))
            .await
            .map_err(|e| StoreError::io(key, e))?;
        Ok(Bytes::from(data))
    }

    async fn put(&self, key: &ObjectKey, data: Bytes, _content_type: &str) -> StoreResult<()> {
        let path = self.path_of(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(key, e))?;
        }

        // Write beside the target and rename, so a crash never leaves a
        // truncated file where `exists` would accept it.
        let mut partial = path.clone().into_os_string();
        partial.push(PARTIAL_SUFFIX);
        let partial = PathBuf::from(partial);

        if let Err(e) = tokio::fs::write(&partial, &data).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(StoreError::io(key, e));
        }
        if let Err(e) = tokio::fs::rename(&partial, &path).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(StoreError::io(key, e));
        }
        Ok(())
    }

    async fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
        match tokio::fs::remove_file(self.path_of(key)).await {
            Ok(()) => Ok(()),
            // Already gone, e.g. removed by an earlier interrupted run.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(key, e)),
        }
    }

    async fn exists(&self, key: &ObjectKey) -> StoreResult<bool> {
        match tokio::fs::metadata(self.path_of(key)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(key, e)),
        }
    }

    async fn scan(&self, prefix: Option<&str>) -> StoreResult<Listing> {
        let store = self.clone();
        let prefix = prefix.map(str::to_owned);

        tokio::task::spawn_blocking(move || store.scan_blocking(prefix.as_deref()))
            .await
            .map_err(|e| StoreError::Backend {
                key: String::new(),
                message: format!("Listing task failed: {}", e),
            })?
    }

    async fn sweep_incomplete(&self, dry_run: bool) -> StoreResult<u64> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.sweep_blocking(dry_run))
            .await
            .map_err(|e| StoreError::Backend {
                key: String::new(),
                message: format!("Sweep task failed: {}", e),
            })?
    }
}

fn is_partial(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_file() && entry.file_name().to_string_lossy().ends_with(PARTIAL_SUFFIX)
}

impl LocalStore {
    fn walk_error(&self, root: &Path, e: walkdir::Error) -> StoreError {
        StoreError::Io {
            key: root.display().to_string(),
            source: e.into(),
        }
    }

    fn scan_blocking(&self, prefix: Option<&str>) -> StoreResult<Listing> {
        // Walk only the deepest folder the prefix names; the rest of the
        // prefix is matched against the file names below it.
        let walk_root = match prefix.and_then(|p| p.rsplit_once('/')) {
            Some((folder, _)) => self.root.join(folder),
            None => self.root.clone(),
        };
        let mut listing = Listing::default();
        if !walk_root.exists() {
            return Ok(listing);
        }

        for entry in WalkDir::new(&walk_root).follow_links(false) {
            let entry = entry.map_err(|e| self.walk_error(&walk_root, e))?;
            if !entry.file_type().is_file() || is_partial(&entry) {
                continue;
            }

            let raw = self.raw_key(entry.path());
            if prefix.map_or(true, |p| raw.starts_with(p)) {
                listing.push_raw(raw);
            }
        }

        listing.keys.sort();
        listing.rejected.sort();
        Ok(listing)
    }

    fn sweep_blocking(&self, dry_run: bool) -> StoreResult<u64> {
        if !self.root.exists() {
            return Ok(0);
        }

        let mut found = 0;
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.map_err(|e| self.walk_error(&self.root, e))?;
            if !is_partial(&entry) {
                continue;
            }
            found += 1;
            if dry_run {
                tracing::info!(path = %entry.path().display(), "Would remove incomplete write");
                continue;
            }
            std::fs::remove_file(entry.path()).map_err(|e| StoreError::Io {
                key: self.raw_key(entry.path()),
                source: e,
            })?;
            tracing::info!(path = %entry.path().display(), "Removed incomplete write");
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use imgshift_common::paths::resolve;
    use imgshift_common::{ImageFormat, ImageId};
    use imgshift_db::models::ImageRecord;

    fn key(s: &str) -> ObjectKey {
        ObjectKey::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_put_get_round_trip_creates_folders() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();
        let k = key("ab/c/def.jpg");

        store
            .put(&k, Bytes::from_static(b"jpeg bytes"), "image/jpeg")
            .await
            .unwrap();

        assert!(dir.path().join("ab/c/def.jpg").is_file());
        assert_eq!(store.get(&k).await.unwrap(), Bytes::from_static(b"jpeg bytes"));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();
        let k = key("ab/c/def.jpg");

        store.put(&k, Bytes::from_static(b"old"), "image/jpeg").await.unwrap();
        store.put(&k, Bytes::from_static(b"new"), "image/jpeg").await.unwrap();

        assert_eq!(store.get(&k).await.unwrap(), Bytes::from_static(b"new"));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();

        let err = store.get(&key("ab/c/missing.jpg")).await.unwrap_err();
        assert_matches!(err, StoreError::NotFound { ref key } if key == "ab/c/missing.jpg");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_exists() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();
        let k = key("ab/c/def.png");

        assert!(!store.exists(&k).await.unwrap());
        store.put(&k, Bytes::from_static(b"png"), "image/png").await.unwrap();
        assert!(store.exists(&k).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();
        let k = key("ab/c/def.jpg");

        store.put(&k, Bytes::from_static(b"x"), "image/jpeg").await.unwrap();
        store.delete(&k).await.unwrap();
        assert!(!store.exists(&k).await.unwrap());

        // Second delete of the same key must still succeed.
        store.delete(&k).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_all_and_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();
        for k in ["ab/c/one.jpg", "ab/c/one_thumb.jpg", "ab/d/two.jpg", "cd/e/three.png"] {
            store.put(&key(k), Bytes::from_static(b"x"), "image/jpeg").await.unwrap();
        }

        let all = store.list(None).await.unwrap();
        assert_eq!(all.len(), 4);

        let one = store.list(Some("ab/c/one")).await.unwrap();
        assert_eq!(one, vec![key("ab/c/one.jpg"), key("ab/c/one_thumb.jpg")]);

        let none = store.list(Some("zz/z/nothing")).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_list_skips_partial_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();
        std::fs::create_dir_all(dir.path().join("ab/c")).unwrap();
        std::fs::write(dir.path().join("ab/c/def.jpg.partial"), b"half").unwrap();

        assert!(store.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_level_operations() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();
        let record = ImageRecord::new(ImageFormat::Webp, StoreName::Local);

        assert!(!store.exists_record(&record).await.unwrap());
        store
            .save_record(&record, Bytes::from_static(b"webp"))
            .await
            .unwrap();
        assert!(store.path_of(&record.object_key()).is_file());
        assert_eq!(
            store.get_record(&record).await.unwrap(),
            Bytes::from_static(b"webp")
        );

        store.delete_record(&record).await.unwrap();
        assert!(!store.exists_record(&record).await.unwrap());
    }

    #[tokio::test]
    async fn test_variants_share_shard_and_stem() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();
        let record = ImageRecord::new(ImageFormat::Jpeg, StoreName::Local);
        let shard = record.shard();
        let thumb = key(&format!("{}_thumb.jpg", shard.variant_prefix()));
        let unrelated = resolve(&ImageId::new(), ImageFormat::Jpeg);

        for k in [&record.object_key(), &thumb, &unrelated] {
            store.put(k, Bytes::from_static(b"x"), "image/jpeg").await.unwrap();
        }

        let variants = store.variants(&record).await.unwrap();
        assert_eq!(variants.len(), 2);
        assert!(variants.contains(&record.object_key()));
        assert!(variants.contains(&thumb));
    }

    #[tokio::test]
    async fn test_scan_keeps_unusable_names_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();
        std::fs::create_dir_all(dir.path().join("ab/c")).unwrap();
        std::fs::write(dir.path().join("ab/c/good.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("ab/c/we\\ird.jpg"), b"x").unwrap();

        let listing = store.scan(None).await.unwrap();
        assert_eq!(listing.keys, vec![key("ab/c/good.jpg")]);
        assert_eq!(listing.rejected, vec!["ab/c/we\\ird.jpg".to_string()]);

        assert_eq!(store.list(None).await.unwrap(), vec![key("ab/c/good.jpg")]);
    }

    #[tokio::test]
    async fn test_sweep_incomplete_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();
        store
            .put(&key("ab/c/kept.jpg"), Bytes::from_static(b"x"), "image/jpeg")
            .await
            .unwrap();
        let partial = dir.path().join("ab/c/def.jpg.partial");
        std::fs::write(&partial, b"half").unwrap();

        assert_eq!(store.sweep_incomplete(true).await.unwrap(), 1);
        assert!(partial.exists());

        assert_eq!(store.sweep_incomplete(false).await.unwrap(), 1);
        assert!(!partial.exists());
        assert!(dir.path().join("ab/c/kept.jpg").is_file());
    }

    #[tokio::test]
    async fn test_failed_rename_leaves_no_partial() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();
        // A folder where the object should go makes the rename fail.
        std::fs::create_dir_all(dir.path().join("ab/c/def.jpg/blocker")).unwrap();

        let err = store
            .put(&key("ab/c/def.jpg"), Bytes::from_static(b"x"), "image/jpeg")
            .await
            .unwrap_err();
        assert_matches!(err, StoreError::Io { .. });
        assert!(!dir.path().join("ab/c/def.jpg.partial").exists());
    }

    #[tokio::test]
    async fn test_presence_check_does_not_create_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("fresh");
        let store = LocalStore::new(&root).unwrap();

        assert!(!store.is_present().await.unwrap());
        assert!(!root.exists());

        store.prepare().await.unwrap();
        assert!(store.is_present().await.unwrap());
    }

    #[tokio::test]
    async fn test_prepare_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested/images");
        let store = LocalStore::new(&root).unwrap();

        store.prepare().await.unwrap();
        assert!(root.is_dir());
    }
}
