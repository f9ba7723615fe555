//! S3 client implementation.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::SdkConfig;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::store::{content_type_for, RemoteStore};

/// Configuration for the S3 client.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Bucket holding metadata, raw recordings and derived artifacts
    pub bucket_name: String,
    /// AWS region
    pub region: String,
    /// Named profile from the shared AWS config (SSO sessions etc.)
    pub profile: Option<String>,
    /// Endpoint override for S3-compatible stores
    pub endpoint_url: Option<String>,
    /// Static access key ID, used together with `secret_access_key`
    pub access_key_id: Option<String>,
    /// Static secret access key
    pub secret_access_key: Option<String>,
}

impl StoreConfig {
    /// Create config for a bucket with default credential resolution.
    pub fn new(bucket_name: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            region: "us-east-1".to_string(),
            profile: None,
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
        }
    }

    /// Create config from environment variables.
    pub fn from_env(bucket_name: impl Into<String>) -> StorageResult<Self> {
        let bucket_name = bucket_name.into();
        if bucket_name.is_empty() {
            return Err(StorageError::config_error("bucket name is empty"));
        }

        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").ok();
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok();
        if access_key_id.is_some() != secret_access_key.is_some() {
            return Err(StorageError::config_error(
                "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set together",
            ));
        }

        Ok(Self {
            bucket_name,
            region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            profile: std::env::var("AWS_PROFILE").ok(),
            endpoint_url: std::env::var("TRAJ_S3_ENDPOINT_URL").ok(),
            access_key_id,
            secret_access_key,
        })
    }
}

/// S3-backed `RemoteStore`.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

/// One page of a `ListObjectsV2` listing.
struct ListPage {
    keys: Vec<String>,
    next_token: Option<String>,
}

impl S3Store {
    /// Create a new client from configuration.
    pub async fn new(config: StoreConfig) -> StorageResult<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let Some(profile) = &config.profile {
            loader = loader.profile_name(profile);
        }

        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            let credentials = Credentials::new(key_id, secret, None, None, "traj-static");
            loader = loader.credentials_provider(credentials);
        }

        let sdk_config: SdkConfig = loader.load().await;

        let mut builder = Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let client = Client::from_conf(builder.build());

        info!(
            bucket = %config.bucket_name,
            region = %config.region,
            profile = ?config.profile,
            "S3 store configured"
        );

        Ok(Self {
            client,
            bucket: config.bucket_name,
        })
    }

    /// Bucket this store reads from and writes to.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Fetch one page of keys.
    async fn list_page(&self, prefix: &str, token: Option<String>) -> StorageResult<ListPage> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix);

        if let Some(token) = token {
            request = request.continuation_token(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StorageError::ListFailed(DisplayErrorContext(&e).to_string()))?;

        let keys = response
            .contents
            .unwrap_or_default()
            .into_iter()
            .filter_map(|obj| obj.key)
            .collect::<Vec<_>>();

        let next_token = if response.is_truncated == Some(true) {
            response.next_continuation_token
        } else {
            None
        };

        debug!("Listed {} keys under {}", keys.len(), prefix);
        Ok(ListPage { keys, next_token })
    }

    /// `CopySource` value for a key: bucket-qualified and percent-encoded per segment.
    fn copy_source(&self, key: &str) -> String {
        let encoded = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}", self.bucket, encoded)
    }

    /// Check connectivity by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                StorageError::AwsSdk(format!(
                    "S3 connectivity check failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for S3Store {
    fn list<'a>(&'a self, prefix: &'a str) -> BoxStream<'a, StorageResult<String>> {
        debug!("Listing objects with prefix: {}", prefix);

        // `Some(token)` means another page is due; `None` ends the listing.
        stream::try_unfold(Some(None::<String>), move |state| async move {
            let Some(token) = state else {
                return Ok::<_, StorageError>(None);
            };
            let page = self.list_page(prefix, token).await?;
            let next = page.next_token.map(Some);
            let keys = stream::iter(page.keys.into_iter().map(Ok::<_, StorageError>));
            Ok(Some((keys, next)))
        })
        .try_flatten()
        .boxed()
    }

    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        debug!("Downloading {}", key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::not_found(key)
                } else {
                    StorageError::download_failed(DisplayErrorContext(&e).to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    async fn download(&self, key: &str, local_path: &Path) -> StorageResult<()> {
        debug!("Downloading {} to {}", key, local_path.display());

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::not_found(key)
                } else {
                    StorageError::download_failed(DisplayErrorContext(&e).to_string())
                }
            })?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::download_failed(format!("Failed to create directory: {}", e))
            })?;
        }

        // Raw recordings can be several GB, so stream instead of buffering.
        let mut body = response.body.into_async_read();
        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| StorageError::download_failed(format!("Failed to create file: {}", e)))?;
        let written = tokio::io::copy(&mut body, &mut file)
            .await
            .map_err(|e| StorageError::download_failed(format!("Failed to write file: {}", e)))?;
        file.flush().await?;

        info!("Downloaded {} ({} bytes) to {}", key, written, local_path.display());
        Ok(())
    }

    async fn upload(&self, local_path: &Path, key: &str) -> StorageResult<()> {
        debug!("Uploading {} to {}", local_path.display(), key);

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type_for(local_path))
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(DisplayErrorContext(&e).to_string()))?;

        info!("Uploaded {} to {}", local_path.display(), key);
        Ok(())
    }

    async fn copy(&self, src_key: &str, dst_key: &str) -> StorageResult<()> {
        debug!("Copying {} to {}", src_key, dst_key);

        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(self.copy_source(src_key))
            .key(dst_key)
            .send()
            .await
            .map_err(|e| StorageError::copy_failed(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }
}
