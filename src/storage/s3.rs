//! S3-compatible object store.
//!
//! Objects are stored in a single bucket under the same relative keys the
//! local store uses. The bucket is created on first use if it is missing and
//! given a public-read policy so images can be served straight from it.

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Builder, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use bytes::Bytes;
use imgshift_common::{ObjectKey, StoreName};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{ImageStore, Listing, StoreError, StoreResult};
use crate::config::ObjectStoreConfig;

/// Region S3 treats as the default; it rejects an explicit location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Public-read policy document attached to newly created buckets.
pub fn bucket_policy(bucket: &str) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Principal": { "AWS": ["*"] },
                "Action": ["s3:GetObject"],
                "Resource": [format!("arn:aws:s3:::{}/*", bucket)],
            }
        ]
    })
    .to_string()
}

/// How bucket setup concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BucketSetup {
    /// We created it and must attach the policy.
    Created,
    /// Creation failed but the bucket exists now: another run created it
    /// first, or it was created earlier by these credentials.
    CreatedElsewhere,
}

/// Decide the outcome of a `CreateBucket` call.
///
/// `exists_after` is only consulted when creation failed.
fn creation_outcome(
    bucket: &str,
    created: Result<(), String>,
    exists_after: impl FnOnce() -> bool,
) -> StoreResult<BucketSetup> {
    match created {
        Ok(()) => Ok(BucketSetup::Created),
        Err(_) if exists_after() => Ok(BucketSetup::CreatedElsewhere),
        Err(e) => Err(StoreError::Setup(format!(
            "Failed to create bucket {}: {}",
            bucket, e
        ))),
    }
}

/// Image store backed by an S3-compatible bucket.
pub struct S3Store {
    client: Client,
    bucket: String,
    region: String,
    ready: OnceCell<()>,
}

impl S3Store {
    /// Build a client from configuration. No network calls are made here.
    pub fn new(config: &ObjectStoreConfig) -> StoreResult<Self> {
        config
            .ensure_complete()
            .map_err(|e| StoreError::Setup(e.to_string()))?;

        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "imgshift-config",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint_url())
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            ready: OnceCell::new(),
        })
    }

    /// Name of the bucket objects are stored in.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn backend_error<E>(key: &ObjectKey, err: E) -> StoreError
    where
        E: std::error::Error,
    {
        StoreError::Backend {
            key: key.to_string(),
            message: DisplayErrorContext(err).to_string(),
        }
    }

    async fn bucket_exists(&self) -> StoreResult<bool> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(StoreError::Setup(format!(
                "Failed to check if bucket {} exists: {}",
                self.bucket,
                DisplayErrorContext(err)
            ))),
        }
    }

    async fn ensure_bucket(&self) -> StoreResult<()> {
        if self.bucket_exists().await? {
            debug!(bucket = %self.bucket, "Bucket exists");
            return Ok(());
        }

        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if !self.region.is_empty() && self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        let created = match request.send().await {
            Ok(_) => Ok(()),
            Err(err) => {
                debug!(
                    bucket = %self.bucket,
                    code = ?err.code(),
                    "CreateBucket failed, checking bucket again"
                );
                Err(DisplayErrorContext(err).to_string())
            }
        };

        let exists_after = if created.is_err() {
            self.bucket_exists().await.unwrap_or(false)
        } else {
            true
        };

        match creation_outcome(&self.bucket, created, || exists_after)? {
            BucketSetup::Created => {
                info!(bucket = %self.bucket, region = %self.region, "Created bucket");
                self.client
                    .put_bucket_policy()
                    .bucket(&self.bucket)
                    .policy(bucket_policy(&self.bucket))
                    .send()
                    .await
                    .map_err(|e| {
                        StoreError::Setup(format!(
                            "Failed to set policy on {}: {}",
                            self.bucket,
                            DisplayErrorContext(e)
                        ))
                    })?;
                info!(bucket = %self.bucket, "Set public-read policy");
            }
            BucketSetup::CreatedElsewhere => {
                info!(bucket = %self.bucket, "Bucket already exists, continuing");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ImageStore for S3Store {
    fn name(&self) -> StoreName {
        StoreName::ObjectStore
    }

    async fn prepare(&self) -> StoreResult<()> {
        self.ready
            .get_or_try_init(|| self.ensure_bucket())
            .await
            .map(|_| ())
    }

    async fn is_present(&self) -> StoreResult<bool> {
        self.bucket_exists().await
    }

    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    StoreError::NotFound {
                        key: key.to_string(),
                    }
                } else {
                    Self::backend_error(key, err)
                }
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| Self::backend_error(key, e))?;
        Ok(data.into_bytes())
    }

    async fn put(&self, key: &ObjectKey, data: Bytes, content_type: &str) -> StoreResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| Self::backend_error(key, e))
    }

    async fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if err.code() == Some("NoSuchKey") => Ok(()),
            Err(err) => Err(Self::backend_error(key, err)),
        }
    }

    async fn exists(&self, key: &ObjectKey) -> StoreResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(Self::backend_error(key, err)),
        }
    }

    async fn scan(&self, prefix: Option<&str>) -> StoreResult<Listing> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_prefix(prefix.map(str::to_owned))
            .into_paginator()
            .send();

        let mut listing = Listing::default();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| StoreError::Backend {
                key: prefix.unwrap_or_default().to_string(),
                message: DisplayErrorContext(e).to_string(),
            })?;

            for object in page.contents() {
                if let Some(key) = object.key() {
                    listing.push_raw(key.to_string());
                }
            }
        }

        Ok(listing)
    }
}
