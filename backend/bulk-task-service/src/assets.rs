//! Media assets mirrored between the bucket and local disk.
//!
//! Logos live under `img/logos/`, maps under `img/maps/`. Uploading pushes the
//! mirror copy; downloading pulls the bucket copy. Either way one signature is
//! built per selected asset, or a placeholder when the asset is unusable.

use crate::export::BuildError;
use crate::tasks::{async_exception_signature, pull_file_signature, push_file_signature};
use cdn_bucket::Bucket;
use serde::{Deserialize, Serialize};
use task_queue::TaskSignature;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Logo,
    Map,
}

impl AssetKind {
    pub fn dir(self) -> &'static str {
        match self {
            AssetKind::Logo => "img/logos",
            AssetKind::Map => "img/maps",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetAction {
    Upload,
    Download,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub kind: AssetKind,
    pub filename: String,
}

impl Asset {
    pub fn new(kind: AssetKind, filename: impl Into<String>) -> Self {
        Self {
            kind,
            filename: filename.into(),
        }
    }

    /// Bucket key of the asset
    pub fn key(&self) -> Result<String, BuildError> {
        let name = self.filename.trim();
        if name.is_empty() {
            return Err(BuildError::InvalidAsset("Asset filename is empty".to_string()));
        }
        if name.contains('/') || name.contains('\\') || name == ".." || name == "." {
            return Err(BuildError::InvalidAsset(format!(
                "Asset filename must be a bare file name: {name}"
            )));
        }
        Ok(format!("{}/{}", self.kind.dir(), name))
    }

    /// Push signature; the mirror copy has to exist already
    pub fn upload_signature(&self, bucket: &Bucket) -> Result<TaskSignature, BuildError> {
        let key = self.key()?;
        std::fs::metadata(bucket.local_path(&key))?;
        Ok(push_file_signature(&key, true))
    }

    pub fn download_signature(&self) -> Result<TaskSignature, BuildError> {
        Ok(pull_file_signature(&self.key()?, true))
    }
}

/// One signature per asset, in selection order
pub fn build_asset_signatures(
    action: AssetAction,
    assets: &[Asset],
    bucket: &Bucket,
) -> Vec<TaskSignature> {
    assets
        .iter()
        .map(|asset| {
            let built = match action {
                AssetAction::Upload => asset.upload_signature(bucket),
                AssetAction::Download => asset.download_signature(),
            };
            built.unwrap_or_else(|e| {
                warn!(filename = %asset.filename, action = ?action, error = %e, "Asset build failed, submitting placeholder");
                async_exception_signature(e.to_string())
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{ASYNC_EXCEPTION_TASK, PULL_FILE_TASK, PUSH_FILE_TASK};
    use cdn_bucket::MemoryBackend;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_asset_keys() {
        assert_eq!(
            Asset::new(AssetKind::Logo, "acme.png").key().unwrap(),
            "img/logos/acme.png"
        );
        assert_eq!(
            Asset::new(AssetKind::Map, "tehran.png").key().unwrap(),
            "img/maps/tehran.png"
        );
        assert!(Asset::new(AssetKind::Map, "  ").key().is_err());
        assert!(Asset::new(AssetKind::Map, "../secrets").key().is_err());
    }

    #[test]
    fn test_upload_requires_mirror_copy() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = Bucket::new(Arc::new(MemoryBackend::new()), dir.path()).unwrap();
        std::fs::create_dir_all(dir.path().join("img/logos")).unwrap();
        std::fs::write(dir.path().join("img/logos/a.png"), b"png").unwrap();

        let assets = vec![
            Asset::new(AssetKind::Logo, "a.png"),
            Asset::new(AssetKind::Logo, "missing.png"),
            Asset::new(AssetKind::Logo, ""),
        ];
        let signatures = build_asset_signatures(AssetAction::Upload, &assets, &bucket);

        assert_eq!(signatures.len(), 3);
        assert_eq!(signatures[0].task, PUSH_FILE_TASK);
        assert_eq!(signatures[0].args, vec![json!("img/logos/a.png"), json!(true)]);
        assert_eq!(signatures[1].task, ASYNC_EXCEPTION_TASK);
        assert_eq!(signatures[2].task, ASYNC_EXCEPTION_TASK);
        assert_eq!(signatures[2].args, vec![json!("Asset filename is empty")]);
    }

    #[test]
    fn test_download_signatures() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = Bucket::new(Arc::new(MemoryBackend::new()), dir.path()).unwrap();

        let signatures = build_asset_signatures(
            AssetAction::Download,
            &[Asset::new(AssetKind::Map, "shiraz.png")],
            &bucket,
        );
        assert_eq!(signatures[0].task, PULL_FILE_TASK);
        assert_eq!(signatures[0].args, vec![json!("img/maps/shiraz.png"), json!(true)]);
    }

    #[test]
    fn test_asset_selection_deserializes() {
        let asset: Asset =
            serde_json::from_value(json!({"kind": "logo", "filename": "x.png"})).unwrap();
        assert_eq!(asset, Asset::new(AssetKind::Logo, "x.png"));
        let action: AssetAction = serde_json::from_value(json!("download")).unwrap();
        assert_eq!(action, AssetAction::Download);
    }
}
