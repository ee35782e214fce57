//! Reference-data export to the CDN bucket.
//!
//! Each [`ExportableEntity`] dumps its table as JSON into the bucket's mirror
//! directory and hands back a `bucket.push_file` signature. Building never
//! fails the submission: an entity that cannot be written is replaced by a
//! `tools.async_exception` placeholder carrying the error text, so the group
//! keeps one member per entity and the failure shows up in the final poll.

use crate::error::{AppError, Result};
use crate::tasks::{async_exception_signature, push_file_signature};
use async_trait::async_trait;
use cdn_bucket::Bucket;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use task_queue::TaskSignature;
use thiserror::Error;
use tracing::warn;

pub const MESSAGE_LEVELS_FILE: &str = "messagelevels.json";
pub const MESSAGES_FILE: &str = "messages.json";

/// Why a work unit could not be built; the text travels to the placeholder
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{0}")]
    Source(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    InvalidAsset(String),
}

impl From<AppError> for BuildError {
    fn from(err: AppError) -> Self {
        BuildError::Source(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MessageLevel {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub code: String,
    pub message_en: String,
    pub message_fa: String,
    /// Title of the owning [`MessageLevel`]
    pub level: String,
    pub status_code: i32,
}

/// Read side of the message tables
#[async_trait]
pub trait MessageCatalog: Send + Sync {
    async fn message_levels(&self) -> Result<Vec<MessageLevel>>;
    async fn messages(&self) -> Result<Vec<Message>>;
}

#[derive(Clone)]
pub struct PgMessageCatalog {
    pool: PgPool,
}

impl PgMessageCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageCatalog for PgMessageCatalog {
    async fn message_levels(&self) -> Result<Vec<MessageLevel>> {
        let rows = sqlx::query_as::<_, MessageLevel>(
            "SELECT title FROM message_levels ORDER BY title",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn messages(&self) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, Message>(
            r#"
            SELECT code, message_en, message_fa, level, status_code
            FROM messages
            ORDER BY code
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// An entity that can be exported to the bucket as one work unit
#[async_trait]
pub trait ExportableEntity: Send + Sync {
    /// Bucket key of the exported document
    fn export_file(&self) -> &'static str;

    /// Write the document to the mirror and return the push signature
    async fn build_export_unit(
        &self,
        bucket: &Bucket,
        overwrite: bool,
    ) -> std::result::Result<TaskSignature, BuildError>;
}

pub struct MessageLevelExport {
    catalog: Arc<dyn MessageCatalog>,
}

impl MessageLevelExport {
    pub fn new(catalog: Arc<dyn MessageCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl ExportableEntity for MessageLevelExport {
    fn export_file(&self) -> &'static str {
        MESSAGE_LEVELS_FILE
    }

    async fn build_export_unit(
        &self,
        bucket: &Bucket,
        overwrite: bool,
    ) -> std::result::Result<TaskSignature, BuildError> {
        let rows = self.catalog.message_levels().await?;
        write_export(bucket, self.export_file(), &rows, overwrite).await
    }
}

pub struct MessageExport {
    catalog: Arc<dyn MessageCatalog>,
}

impl MessageExport {
    pub fn new(catalog: Arc<dyn MessageCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl ExportableEntity for MessageExport {
    fn export_file(&self) -> &'static str {
        MESSAGES_FILE
    }

    async fn build_export_unit(
        &self,
        bucket: &Bucket,
        overwrite: bool,
    ) -> std::result::Result<TaskSignature, BuildError> {
        let rows = self.catalog.messages().await?;
        write_export(bucket, self.export_file(), &rows, overwrite).await
    }
}

/// Look up an exportable entity by its URL name
pub fn entity_by_name(
    name: &str,
    catalog: Arc<dyn MessageCatalog>,
) -> Option<Box<dyn ExportableEntity>> {
    match name {
        "messagelevels" | "message-levels" => Some(Box::new(MessageLevelExport::new(catalog))),
        "messages" => Some(Box::new(MessageExport::new(catalog))),
        _ => None,
    }
}

async fn write_export<T: Serialize>(
    bucket: &Bucket,
    file: &str,
    rows: &[T],
    overwrite: bool,
) -> std::result::Result<TaskSignature, BuildError> {
    let body = serde_json::to_vec(rows)?;
    tokio::fs::write(bucket.local_path(file), body).await?;
    Ok(push_file_signature(file, overwrite))
}

/// Exactly one signature per entity, with placeholders for build failures
pub async fn build_signatures(
    entities: &[Box<dyn ExportableEntity>],
    bucket: &Bucket,
) -> Vec<TaskSignature> {
    let mut signatures = Vec::with_capacity(entities.len());
    for entity in entities {
        let signature = match entity.build_export_unit(bucket, true).await {
            Ok(signature) => signature,
            Err(e) => {
                warn!(file = entity.export_file(), error = %e, "Export build failed, submitting placeholder");
                async_exception_signature(e.to_string())
            }
        };
        signatures.push(signature);
    }
    signatures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{ASYNC_EXCEPTION_TASK, PUSH_FILE_TASK};
    use cdn_bucket::MemoryBackend;
    use serde_json::json;

    struct FixedCatalog;

    #[async_trait]
    impl MessageCatalog for FixedCatalog {
        async fn message_levels(&self) -> Result<Vec<MessageLevel>> {
            Ok(vec![MessageLevel {
                title: "err".to_string(),
            }])
        }

        async fn messages(&self) -> Result<Vec<Message>> {
            Err(AppError::DatabaseError("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_build_signatures_substitutes_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = Bucket::new(Arc::new(MemoryBackend::new()), dir.path()).unwrap();
        let catalog: Arc<dyn MessageCatalog> = Arc::new(FixedCatalog);
        let entities: Vec<Box<dyn ExportableEntity>> = vec![
            Box::new(MessageLevelExport::new(catalog.clone())),
            Box::new(MessageExport::new(catalog)),
        ];

        let signatures = build_signatures(&entities, &bucket).await;

        assert_eq!(signatures.len(), 2);
        assert_eq!(signatures[0].task, PUSH_FILE_TASK);
        assert_eq!(signatures[0].args, vec![json!("messagelevels.json"), json!(true)]);
        assert!(signatures[0].immutable);
        assert_eq!(signatures[1].task, ASYNC_EXCEPTION_TASK);
        assert_eq!(
            signatures[1].args,
            vec![json!("Database error: connection refused")]
        );

        let written = std::fs::read(dir.path().join("messagelevels.json")).unwrap();
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&written).unwrap(),
            json!([{"title": "err"}])
        );
    }

    #[test]
    fn test_entity_lookup() {
        let catalog: Arc<dyn MessageCatalog> = Arc::new(FixedCatalog);
        assert_eq!(
            entity_by_name("messages", catalog.clone()).map(|e| e.export_file()),
            Some("messages.json")
        );
        assert_eq!(
            entity_by_name("messagelevels", catalog.clone()).map(|e| e.export_file()),
            Some("messagelevels.json")
        );
        assert!(entity_by_name("users", catalog).is_none());
    }
}
