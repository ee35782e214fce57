//! Key table import from the bucket's `keylist.json`.

use crate::error::Result;
use async_trait::async_trait;
use cdn_bucket::{Bucket, ManifestEntry, MANIFEST_FILE};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};

/// Column width of `keys.filename`
pub const MAX_FILENAME_LEN: usize = 50;

/// One rejected manifest entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyValidationError {
    pub index: usize,
    pub field: &'static str,
    pub message: String,
}

#[async_trait]
pub trait KeyRepository: Send + Sync {
    /// Swap the whole table for `keys`; all or nothing
    async fn replace_all(&self, keys: &[ManifestEntry]) -> Result<()>;
}

#[derive(Clone)]
pub struct PgKeyRepository {
    pool: PgPool,
}

impl PgKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyRepository for PgKeyRepository {
    async fn replace_all(&self, keys: &[ManifestEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM keys").execute(&mut *tx).await?;
        for key in keys {
            sqlx::query("INSERT INTO keys (filename, last_modified) VALUES ($1, $2)")
                .bind(&key.filename)
                .bind(key.last_modified)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct KeyImporter {
    bucket: Bucket,
    repo: Arc<dyn KeyRepository>,
}

impl KeyImporter {
    pub fn new(bucket: Bucket, repo: Arc<dyn KeyRepository>) -> Self {
        Self { bucket, repo }
    }

    /// Pull the manifest, validate it and replace the key table.
    ///
    /// Returns the validation errors, empty on success. Nothing is saved
    /// when any entry is rejected.
    pub async fn import(&self) -> Result<Vec<KeyValidationError>> {
        self.bucket.pull(MANIFEST_FILE, true).await?;
        let entries = self.bucket.read_local_manifest().await?;

        let errors = validate(&entries);
        if !errors.is_empty() {
            warn!(rejected = errors.len(), "Key list failed validation");
            return Ok(errors);
        }

        self.repo.replace_all(&entries).await?;
        info!(keys = entries.len(), "Key list imported");
        Ok(Vec::new())
    }
}

pub fn validate(entries: &[ManifestEntry]) -> Vec<KeyValidationError> {
    let mut errors = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        if entry.filename.trim().is_empty() {
            errors.push(KeyValidationError {
                index,
                field: "filename",
                message: "This field may not be blank.".to_string(),
            });
        } else if entry.filename.chars().count() > MAX_FILENAME_LEN {
            errors.push(KeyValidationError {
                index,
                field: "filename",
                message: format!("Ensure this field has no more than {MAX_FILENAME_LEN} characters."),
            });
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(filename: &str) -> ManifestEntry {
        ManifestEntry {
            filename: filename.to_string(),
            last_modified: Utc::now(),
        }
    }

    #[test]
    fn test_validate_reports_each_bad_entry() {
        let long = "x".repeat(MAX_FILENAME_LEN + 1);
        let errors = validate(&[entry("messages.json"), entry(""), entry(&long)]);

        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].index, 1);
        assert_eq!(errors[0].message, "This field may not be blank.");
        assert_eq!(errors[1].index, 2);
    }

    #[test]
    fn test_validate_accepts_clean_list() {
        assert!(validate(&[entry("a.json"), entry("img/logos/b.png")]).is_empty());
    }
}
