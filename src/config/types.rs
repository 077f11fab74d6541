use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable overriding `object_store.access_key_id`.
pub const ENV_ACCESS_KEY_ID: &str = "IMGSHIFT_S3_ACCESS_KEY_ID";
/// Environment variable overriding `object_store.secret_access_key`.
pub const ENV_SECRET_ACCESS_KEY: &str = "IMGSHIFT_S3_SECRET_ACCESS_KEY";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub local: LocalConfig,

    #[serde(default)]
    pub object_store: ObjectStoreConfig,

    #[serde(default)]
    pub migrate: MigrateConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite database holding the `images` table
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("imgshift.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LocalConfig {
    /// Root folder of the local store. Empty means `images`.
    #[serde(default)]
    pub images_path: Option<PathBuf>,
}

impl LocalConfig {
    pub fn root(&self) -> PathBuf {
        match &self.images_path {
            Some(path) if !path.as_os_str().is_empty() => path.clone(),
            _ => PathBuf::from("images"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObjectStoreConfig {
    /// Host (and optional port) of the S3 endpoint. A full URL is accepted too.
    #[serde(default)]
    pub endpoint: String,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub bucket: String,

    #[serde(default)]
    pub access_key_id: String,

    #[serde(default, skip_serializing)]
    pub secret_access_key: String,

    #[serde(default = "default_use_ssl")]
    pub use_ssl: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_use_ssl() -> bool {
    true
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: default_region(),
            bucket: String::new(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            use_ssl: default_use_ssl(),
        }
    }
}

impl ObjectStoreConfig {
    /// Endpoint as a URL, with the scheme picked from `use_ssl` when the
    /// configured endpoint has none.
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else if self.use_ssl {
            format!("https://{}", self.endpoint)
        } else {
            format!("http://{}", self.endpoint)
        }
    }

    /// Whether any object store setting was provided at all.
    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty() || !self.bucket.is_empty()
    }

    /// Check that everything needed to talk to the object store is set.
    pub fn ensure_complete(&self) -> anyhow::Result<()> {
        let missing: Vec<&str> = [
            ("object_store.endpoint", self.endpoint.is_empty()),
            ("object_store.bucket", self.bucket.is_empty()),
            ("object_store.access_key_id", self.access_key_id.is_empty()),
            (
                "object_store.secret_access_key",
                self.secret_access_key.is_empty(),
            ),
        ]
        .into_iter()
        .filter_map(|(name, empty)| empty.then_some(name))
        .collect();

        if !missing.is_empty() {
            anyhow::bail!("Object store is not configured, missing: {}", missing.join(", "));
        }
        Ok(())
    }

    /// Apply credential overrides from the environment.
    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var(ENV_ACCESS_KEY_ID) {
            if !value.is_empty() {
                self.access_key_id = value;
            }
        }
        if let Ok(value) = std::env::var(ENV_SECRET_ACCESS_KEY) {
            if !value.is_empty() {
                self.secret_access_key = value;
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MigrateConfig {
    /// Records fetched per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Records per store_name commit
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Records transferred in parallel
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_page_size() -> usize {
    500
}
fn default_batch_size() -> usize {
    1000
}
fn default_concurrency() -> usize {
    8
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
        }
    }
}
