/// CDN bucket configuration shared by the API service and workers
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Bucket name
    pub bucket: String,
    /// Region passed to the SDK (most S3-compatible CDNs ignore it)
    pub region: String,
    /// Custom endpoint for S3-compatible storage
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Whether to use path-style URLs (false = virtual-hosted-style)
    pub path_style: bool,
    /// Local mirror directory; object keys are resolved relative to it
    pub local_dir: PathBuf,
}

impl BucketConfig {
    /// Load bucket configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            bucket: std::env::var("CDN_BUCKET_NAME").unwrap_or_else(|_| "nova-cdn".to_string()),
            region: std::env::var("CDN_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            endpoint: std::env::var("CDN_ENDPOINT").ok(),
            access_key_id: std::env::var("CDN_ACCESS_KEY").ok(),
            secret_access_key: std::env::var("CDN_SECRET_KEY").ok(),
            path_style: std::env::var("CDN_PATH_STYLE")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            local_dir: std::env::var("CDN_LOCAL_DIR")
                .unwrap_or_else(|_| "/var/lib/nova/cdn".to_string())
                .into(),
        }
    }
}

