//! Key manifest (`keylist.json`) and version marker (`version.json`)
//!
//! CDN clients fetch the manifest to learn which files exist and compare the
//! version marker against their cached copy to detect staleness.

use crate::backend::ObjectSummary;
use crate::error::BucketResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MANIFEST_FILE: &str = "keylist.json";
pub const VERSION_FILE: &str = "version.json";

/// Objects never listed in the manifest
const IGNORED_FILES: [&str; 2] = [VERSION_FILE, MANIFEST_FILE];
/// Image assets are served directly and stay out of the manifest
const IMAGE_SEGMENT: &str = "img/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub filename: String,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDocument {
    /// Newest `last_modified` across the manifest; null for an empty manifest
    pub version: Option<DateTime<Utc>>,
}

/// Whether a bucket key belongs in the manifest
pub fn is_listed(key: &str) -> bool {
    !IGNORED_FILES.contains(&key) && !key.contains(IMAGE_SEGMENT)
}

pub fn build_manifest(objects: &[ObjectSummary]) -> Vec<ManifestEntry> {
    objects
        .iter()
        .filter(|o| is_listed(&o.key))
        .map(|o| ManifestEntry {
            filename: o.key.clone(),
            last_modified: o.last_modified,
        })
        .collect()
}

pub fn version_of(entries: &[ManifestEntry]) -> VersionDocument {
    VersionDocument {
        version: entries.iter().map(|e| e.last_modified).max(),
    }
}

pub fn parse_manifest(bytes: &[u8]) -> BucketResult<Vec<ManifestEntry>> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn summary(key: &str, minute: u32) -> ObjectSummary {
        ObjectSummary {
            key: key.to_string(),
            last_modified: Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap(),
        }
    }

    #[test]
    fn test_manifest_excludes_markers_and_images() {
        let objects = vec![
            summary("keylist.json", 1),
            summary("messages.json", 2),
            summary("img/logo.png", 3),
            summary("maps/img/tile.png", 4),
            summary("version.json", 5),
        ];

        let manifest = build_manifest(&objects);
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest[0].filename, "messages.json");
    }

    #[test]
    fn test_version_is_newest_entry() {
        let manifest = build_manifest(&[summary("a.json", 10), summary("b.json", 30)]);
        let version = version_of(&manifest);
        assert_eq!(
            version.version,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_empty_manifest_has_null_version() {
        let json = serde_json::to_string(&version_of(&[])).unwrap();
        assert_eq!(json, r#"{"version":null}"#);
    }

    #[test]
    fn test_parse_manifest_rejects_garbage() {
        assert!(parse_manifest(b"not json").is_err());
    }
}
