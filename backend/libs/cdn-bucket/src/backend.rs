/// Remote object operations behind the bucket mirror
use crate::config::BucketConfig;
use crate::error::{BucketError, BucketResult};
use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// One entry of a bucket listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

/// Raw remote bucket operations.
///
/// Implementations do not retry; every failure is returned to the caller.
#[async_trait]
pub trait BucketBackend: Send + Sync {
    /// Full listing of the bucket, in key order
    async fn list(&self) -> BucketResult<Vec<ObjectSummary>>;

    /// Create or replace an object
    async fn put(&self, key: &str, body: Vec<u8>) -> BucketResult<()>;

    /// Apply the canned `public-read` ACL to an existing object
    async fn set_public_read(&self, key: &str) -> BucketResult<()>;

    /// Download an object
    async fn get(&self, key: &str) -> BucketResult<Vec<u8>>;

    /// Connectivity probe
    async fn health_check(&self) -> BucketResult<()>;
}

#[derive(Clone)]
pub struct S3Backend {
    client: Arc<Client>,
    bucket: String,
}

impl S3Backend {
    pub fn new(client: Arc<Client>, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build an S3 client from bucket configuration.
    ///
    /// Explicit credentials win over the default provider chain; a custom
    /// endpoint targets S3-compatible CDN storage.
    pub async fn connect(config: &BucketConfig) -> Self {
        use aws_sdk_s3::config::{Credentials, Region};

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials = Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "cdn_bucket_static",
            );
            loader = loader.credentials_provider(credentials);
        }

        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.path_style)
            .build();

        Self::new(Arc::new(Client::from_conf(s3_config)), config.bucket.clone())
    }

    fn content_type(key: &str) -> &'static str {
        if key.ends_with(".json") {
            "application/json"
        } else if key.ends_with(".png") {
            "image/png"
        } else if key.ends_with(".jpg") || key.ends_with(".jpeg") {
            "image/jpeg"
        } else {
            "application/octet-stream"
        }
    }
}

#[async_trait]
impl BucketBackend for S3Backend {
    async fn list(&self) -> BucketResult<Vec<ObjectSummary>> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| BucketError::remote("list_objects_v2", e))?;

            for object in response.contents() {
                let Some(key) = object.key() else { continue };
                let last_modified = object
                    .last_modified()
                    .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
                    .unwrap_or_default();
                objects.push(ObjectSummary {
                    key: key.to_string(),
                    last_modified,
                });
            }

            match (response.is_truncated(), response.next_continuation_token()) {
                (Some(true), Some(token)) => continuation = Some(token.to_string()),
                _ => break,
            }
        }

        debug!(bucket = %self.bucket, count = objects.len(), "Listed bucket");
        Ok(objects)
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> BucketResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(Self::content_type(key))
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| BucketError::remote("put_object", e))?;
        Ok(())
    }

    async fn set_public_read(&self, key: &str) -> BucketResult<()> {
        self.client
            .put_object_acl()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| BucketError::remote("put_object_acl", e))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> BucketResult<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| get_object_error(key, e))?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| BucketError::remote("get_object body", e))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn health_check(&self) -> BucketResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| BucketError::remote("head_bucket", e))?;
        Ok(())
    }
}

/// A missing key is `NotFound`; everything else is a remote failure
fn get_object_error<R>(key: &str, err: SdkError<GetObjectError, R>) -> BucketError {
    if err
        .as_service_error()
        .is_some_and(|service_err| service_err.is_no_such_key())
    {
        return BucketError::NotFound(key.to_string());
    }
    BucketError::remote("get_object", err)
}

#[derive(Debug, Clone)]
struct MemoryObject {
    body: Vec<u8>,
    last_modified: DateTime<Utc>,
    public_read: bool,
}

/// In-process bucket used by tests and local development
#[derive(Default)]
pub struct MemoryBackend {
    objects: Mutex<BTreeMap<String, MemoryObject>>,
    puts: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object with a fixed modification time
    pub fn insert_object(&self, key: &str, body: &[u8], last_modified: DateTime<Utc>) {
        self.lock().insert(
            key.to_string(),
            MemoryObject {
                body: body.to_vec(),
                last_modified,
                public_read: false,
            },
        );
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().get(key).map(|o| o.body.clone())
    }

    pub fn is_public(&self, key: &str) -> bool {
        self.lock().get(key).map(|o| o.public_read).unwrap_or(false)
    }

    /// Number of successful `put` calls so far
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Make every subsequent `put` fail with a remote error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, MemoryObject>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BucketBackend for MemoryBackend {
    async fn list(&self) -> BucketResult<Vec<ObjectSummary>> {
        Ok(self
            .lock()
            .iter()
            .map(|(key, object)| ObjectSummary {
                key: key.clone(),
                last_modified: object.last_modified,
            })
            .collect())
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> BucketResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BucketError::Remote(format!("put_object: write refused for {key}")));
        }
        self.lock().insert(
            key.to_string(),
            MemoryObject {
                body,
                last_modified: Utc::now(),
                public_read: false,
            },
        );
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_public_read(&self, key: &str) -> BucketResult<()> {
        match self.lock().get_mut(key) {
            Some(object) => {
                object.public_read = true;
                Ok(())
            }
            None => Err(BucketError::NotFound(key.to_string())),
        }
    }

    async fn get(&self, key: &str) -> BucketResult<Vec<u8>> {
        self.object(key)
            .ok_or_else(|| BucketError::NotFound(key.to_string()))
    }

    async fn health_check(&self) -> BucketResult<()> {
        Ok(())
    }
}
