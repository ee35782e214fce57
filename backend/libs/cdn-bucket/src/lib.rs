/// CDN bucket mirror shared by the bulk task service and its workers
///
/// A `Bucket` owns the remote bucket handle and a local mirror directory.
/// Object keys are paths relative to that directory on both sides.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub mod backend;
pub mod config;
mod error;
pub mod manifest;

pub use backend::{BucketBackend, MemoryBackend, ObjectSummary, S3Backend};
pub use config::BucketConfig;
pub use error::{BucketError, BucketResult, Side};
pub use manifest::{ManifestEntry, VersionDocument, MANIFEST_FILE, VERSION_FILE};

#[derive(Clone)]
pub struct Bucket {
    backend: Arc<dyn BucketBackend>,
    local_dir: PathBuf,
}

impl Bucket {
    /// Wrap a backend and make sure the mirror directory exists
    pub fn new(backend: Arc<dyn BucketBackend>, local_dir: impl Into<PathBuf>) -> BucketResult<Self> {
        let local_dir = local_dir.into();
        std::fs::create_dir_all(&local_dir)?;
        Ok(Self { backend, local_dir })
    }

    /// Connect to the configured S3-compatible bucket
    pub async fn open(config: &BucketConfig) -> BucketResult<Self> {
        let backend = S3Backend::connect(config).await;
        Self::new(Arc::new(backend), config.local_dir.clone())
    }

    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    /// Mirror path of an object key
    pub fn local_path(&self, path: &str) -> PathBuf {
        self.local_dir.join(path.trim_start_matches('/'))
    }

    /// Upload a mirror file under the same key and make it publicly readable.
    ///
    /// Refuses to clobber an existing remote key unless `overwrite` is set.
    pub async fn push(&self, path: &str, overwrite: bool) -> BucketResult<()> {
        if !overwrite && self.exists(path).await? {
            return Err(BucketError::AlreadyExists {
                path: path.to_string(),
                side: Side::Remote,
            });
        }

        let body = tokio::fs::read(self.local_path(path)).await?;
        let size = body.len();
        self.backend.put(path, body).await?;
        self.backend.set_public_read(path).await?;

        debug!(path = %path, size, "Pushed file to bucket");
        Ok(())
    }

    /// Download a key into the mirror.
    ///
    /// Refuses to clobber an existing local file unless `overwrite` is set.
    pub async fn pull(&self, path: &str, overwrite: bool) -> BucketResult<()> {
        let target = self.local_path(path);
        if !overwrite && tokio::fs::try_exists(&target).await? {
            return Err(BucketError::AlreadyExists {
                path: path.to_string(),
                side: Side::Local,
            });
        }

        let body = self.backend.get(path).await?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &body).await?;

        debug!(path = %path, size = body.len(), "Pulled file from bucket");
        Ok(())
    }

    /// Membership test against the live listing (O(n) in bucket size)
    pub async fn exists(&self, path: &str) -> BucketResult<bool> {
        Ok(self.backend.list().await?.iter().any(|o| o.key == path))
    }

    /// Keys whose name matches `pattern` from the first character
    pub async fn search(&self, pattern: &str) -> BucketResult<Vec<String>> {
        let regex = regex::Regex::new(&format!("^(?:{pattern})"))?;
        Ok(self
            .backend
            .list()
            .await?
            .into_iter()
            .filter(|o| regex.is_match(&o.key))
            .map(|o| o.key)
            .collect())
    }

    /// Regenerate `keylist.json` and `version.json` from the current listing.
    ///
    /// Both documents are fully rewritten, pushed with overwrite and left
    /// public-read, so repeating the call without bucket changes republishes
    /// identical bytes.
    pub async fn republish_manifest(&self) -> BucketResult<VersionDocument> {
        let objects = self.backend.list().await?;
        let entries = manifest::build_manifest(&objects);
        self.write_and_push(MANIFEST_FILE, &entries).await?;

        let version = manifest::version_of(&entries);
        self.write_and_push(VERSION_FILE, &version).await?;

        info!(
            entries = entries.len(),
            version = ?version.version,
            "Republished bucket manifest"
        );
        Ok(version)
    }

    /// Parse the mirrored `keylist.json`
    pub async fn read_local_manifest(&self) -> BucketResult<Vec<ManifestEntry>> {
        let bytes = tokio::fs::read(self.local_path(MANIFEST_FILE)).await?;
        manifest::parse_manifest(&bytes)
    }

    pub async fn health_check(&self) -> BucketResult<()> {
        self.backend.health_check().await
    }

    async fn write_and_push<T: serde::Serialize>(&self, path: &str, value: &T) -> BucketResult<()> {
        let body = serde_json::to_vec(value)?;
        tokio::fs::write(self.local_path(path), &body).await?;
        self.push(path, true).await
    }
}
