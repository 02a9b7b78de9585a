//! Object storage implementation using S3/MinIO
//!
//! This module provides an interface for storing and retrieving document
//! objects: raw uploads, staged copies, extracted images, OCR text and
//! generated markdown.

use crate::{StorageError, StorageResult};
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    types::MetadataDirective,
    Client,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// S3/MinIO configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// AWS region (e.g., "us-west-2") or "us-east-1" for `MinIO`
    pub region: String,

    /// S3 endpoint (custom for `MinIO`, empty for AWS S3)
    pub endpoint: Option<String>,

    /// AWS access key ID
    pub access_key_id: String,

    /// AWS secret access key
    pub secret_access_key: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: "us-west-2".to_string(),
            endpoint: None,
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
        }
    }
}

/// Provenance and user metadata of an object, without the body
#[derive(Debug, Clone, Default)]
pub struct ObjectHead {
    /// Content tag as reported by the store, surrounding quotes included
    pub etag: Option<String>,

    /// Object size in bytes
    pub content_length: u64,

    /// MIME type, when the store reports one
    pub content_type: Option<String>,

    /// User-defined metadata attached to the object
    pub metadata: HashMap<String, String>,
}

/// Object storage trait
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch object provenance and user metadata
    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectHead>;

    /// Retrieve an object body as bytes
    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>>;

    /// Store an object from bytes
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> StorageResult<()>;

    /// Server-side copy preserving the source object's metadata
    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> StorageResult<()>;

    /// Delete an object
    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// List object keys under a prefix
    async fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<String>>;
}

/// S3/MinIO object storage implementation
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Create a new S3 object storage client
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "doc-pipeline-storage",
        );

        let region = Region::new(config.region.clone());

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(region)
            .behavior_version_latest();

        // Set custom endpoint for MinIO
        if let Some(endpoint) = config.endpoint {
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true); // Required for MinIO
        }

        let s3_config = s3_config_builder.build();
        let client = Client::from_conf(s3_config);

        Ok(Self { client })
    }

    /// The x-amz-copy-source header requires a URL-encoded key
    fn copy_source(bucket: &str, key: &str) -> String {
        let encoded_key = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}", bucket, encoded_key)
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectHead> {
        let response = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NotFound") {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::S3Error(e.to_string())
                }
            })?;

        Ok(ObjectHead {
            etag: response.e_tag().map(std::string::ToString::to_string),
            content_length: response.content_length().unwrap_or(0) as u64,
            content_type: response.content_type().map(std::string::ToString::to_string),
            metadata: response.metadata().cloned().unwrap_or_default(),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::S3Error(e.to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3Error(e.to_string()))?;

        Ok(bytes.to_vec())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> StorageResult<()> {
        let byte_stream = ByteStream::from(data.to_vec());

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(byte_stream)
            .send()
            .await
            .map_err(|e| StorageError::S3Error(e.to_string()))?;

        Ok(())
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> StorageResult<()> {
        self.client
            .copy_object()
            .copy_source(Self::copy_source(source_bucket, source_key))
            .bucket(dest_bucket)
            .key(dest_key)
            .metadata_directive(MetadataDirective::Copy)
            .send()
            .await
            .map_err(|e| StorageError::S3Error(e.to_string()))?;

        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::S3Error(e.to_string()))?;

        Ok(())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<String>> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .send()
            .await
            .map_err(|e| StorageError::S3Error(e.to_string()))?;

        let keys = response
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(std::string::ToString::to_string))
            .collect();

        Ok(keys)
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: Option<String>,
    metadata: HashMap<String, String>,
}

impl StoredObject {
    /// Single-part S3 etags are the quoted MD5 of the body
    fn etag(&self) -> String {
        format!("\"{:x}\"", md5::compute(&self.data))
    }
}

/// In-memory object store for tests
///
/// Mirrors the parts of S3 the pipeline relies on: quoted MD5 etags,
/// user metadata preserved across copies, lexicographic listing. A
/// one-shot failure can be armed per operation name to exercise
/// rollback paths.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
    fail_next: Mutex<Option<String>>,
}

impl MemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object with user metadata attached
    pub async fn put_with_metadata(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        metadata: HashMap<String, String>,
    ) {
        let mut objects = self.objects.lock().await;
        objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data: data.to_vec(),
                content_type: None,
                metadata,
            },
        );
    }

    /// Arm a one-shot failure for the named operation
    /// (`"head_object"`, `"get_object"`, `"put_object"`, `"copy_object"`,
    /// `"delete_object"`, `"list_objects"`)
    pub async fn fail_next(&self, op: &str) {
        *self.fail_next.lock().await = Some(op.to_string());
    }

    pub async fn contains(&self, bucket: &str, key: &str) -> bool {
        let objects = self.objects.lock().await;
        objects.contains_key(&(bucket.to_string(), key.to_string()))
    }

    pub async fn object_count(&self) -> usize {
        let objects = self.objects.lock().await;
        objects.len()
    }

    async fn take_failure(&self, op: &str) -> bool {
        let mut fail_next = self.fail_next.lock().await;
        if fail_next.as_deref() == Some(op) {
            *fail_next = None;
            true
        } else {
            false
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectHead> {
        if self.take_failure("head_object").await {
            return Err(StorageError::Other("injected head_object failure".to_string()));
        }

        let objects = self.objects.lock().await;
        let object = objects
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        Ok(ObjectHead {
            etag: Some(object.etag()),
            content_length: object.data.len() as u64,
            content_type: object.content_type.clone(),
            metadata: object.metadata.clone(),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        if self.take_failure("get_object").await {
            return Err(StorageError::Other("injected get_object failure".to_string()));
        }

        let objects = self.objects.lock().await;
        objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|object| object.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> StorageResult<()> {
        if self.take_failure("put_object").await {
            return Err(StorageError::Other("injected put_object failure".to_string()));
        }

        let mut objects = self.objects.lock().await;
        objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data: data.to_vec(),
                content_type: Some(content_type.to_string()),
                metadata: HashMap::new(),
            },
        );

        Ok(())
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> StorageResult<()> {
        if self.take_failure("copy_object").await {
            return Err(StorageError::Other("injected copy_object failure".to_string()));
        }

        let mut objects = self.objects.lock().await;
        let source = objects
            .get(&(source_bucket.to_string(), source_key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(source_key.to_string()))?;

        objects.insert((dest_bucket.to_string(), dest_key.to_string()), source);

        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        if self.take_failure("delete_object").await {
            return Err(StorageError::Other("injected delete_object failure".to_string()));
        }

        // S3 delete succeeds whether or not the key exists
        let mut objects = self.objects.lock().await;
        objects.remove(&(bucket.to_string(), key.to_string()));

        Ok(())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<String>> {
        if self.take_failure("list_objects").await {
            return Err(StorageError::Other("injected list_objects failure".to_string()));
        }

        let objects = self.objects.lock().await;
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();

        Ok(keys)
    }
}
