//! Blob-store abstraction over S3-compatible object storage.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use forge_common::{Error, Result};
use tracing::{debug, info};

/// Durable object storage for build artifacts and status logs.
///
/// Kept object-safe so the pipeline can run against the in-memory double
/// in tests.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Overwrite `key` with a JSON document.
    async fn put_json(&self, key: &str, value: &serde_json::Value) -> Result<()>;

    /// Overwrite `key` with the contents of a local file, streamed from
    /// disk rather than buffered in memory.
    async fn put_file(&self, key: &str, path: &Path) -> Result<()>;
}

/// S3-backed implementation.
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3BlobStore {
    /// Connect using the ambient AWS credential chain. `endpoint` overrides
    /// the endpoint URL for S3-compatible stores like MinIO.
    pub async fn connect(bucket: String, endpoint: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;
        let client = aws_sdk_s3::Client::new(&config);

        info!("Connected to blob store, bucket: {}", bucket);

        Self { client, bucket }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put_json(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let body = serde_json::to_vec(value)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/json")
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| Error::Storage(format!("put {key}: {e}")))?;

        debug!("Uploaded JSON to {}", key);
        Ok(())
    }

    async fn put_file(&self, key: &str, path: &Path) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| Error::Storage(format!("open {}: {e}", path.display())))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("put {key}: {e}")))?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(())
    }
}

/// In-memory store used by tests and local dry runs.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    /// Every put key, in call order.
    uploads: Mutex<Vec<String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    /// Keys in insertion-independent sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    /// Chronological record of every upload, overwrites included.
    pub fn upload_log(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().unwrap().is_empty()
    }

    fn record(&self, key: &str, body: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), body);
        self.uploads.lock().unwrap().push(key.to_string());
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_json(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let body = serde_json::to_vec(value)?;
        self.record(key, body);
        Ok(())
    }

    async fn put_file(&self, key: &str, path: &Path) -> Result<()> {
        let body = tokio::fs::read(path).await?;
        self.record(key, body);
        Ok(())
    }
}
