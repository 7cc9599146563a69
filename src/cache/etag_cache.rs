use reqwest::header::{HeaderMap, HeaderValue, IF_NONE_MATCH};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;

use crate::utils::Result;

/// Revalidation metadata stored next to a cached artifact
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    #[serde(default)]
    pub etag: Option<String>,
    /// Epoch milliseconds of the last successful check against the origin
    #[serde(rename = "lastChecked", default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<i64>,
    /// RFC 3339 time of the last full download
    #[serde(rename = "lastFetch", default, skip_serializing_if = "Option::is_none")]
    pub last_fetch: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of [`load`]; either half may be missing independently
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheLoad {
    pub content: Option<String>,
    pub metadata: Option<CacheMetadata>,
}

/// Read both artifacts. Missing or unreadable files, and metadata that does
/// not parse, come back as `None` rather than an error.
pub async fn load(content_path: &Path, metadata_path: &Path) -> CacheLoad {
    let content = tokio::fs::read_to_string(content_path).await.ok();

    let metadata = match tokio::fs::read_to_string(metadata_path).await {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                tracing::debug!("Ignoring corrupt cache metadata {}: {}", metadata_path.display(), e);
                None
            }
        },
        Err(_) => None,
    };

    CacheLoad { content, metadata }
}

/// Write content and metadata, creating parent directories as needed
pub async fn store(
    content_path: &Path,
    metadata_path: &Path,
    content: &str,
    metadata: &CacheMetadata,
) -> Result<()> {
    for path in [content_path, metadata_path] {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    tokio::fs::write(content_path, content).await?;
    let json = serde_json::to_string_pretty(metadata)?;
    tokio::fs::write(metadata_path, json).await?;
    Ok(())
}

/// True only if the metadata records a check less than `ttl` before `now_ms`
pub fn is_fresh(metadata: Option<&CacheMetadata>, ttl: Duration, now_ms: i64) -> bool {
    match metadata.and_then(|m| m.last_checked) {
        Some(last_checked) => {
            let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
            now_ms.saturating_sub(last_checked) < ttl_ms
        }
        None => false,
    }
}

/// `If-None-Match` for a known ETag, otherwise no headers at all
pub fn revalidation_headers(metadata: Option<&CacheMetadata>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let etag = metadata
        .and_then(|m| m.etag.as_deref())
        .filter(|etag| !etag.is_empty());

    if let Some(etag) = etag {
        match HeaderValue::from_str(etag) {
            Ok(value) => {
                headers.insert(IF_NONE_MATCH, value);
            }
            Err(_) => tracing::warn!("Cached ETag is not a valid header value: {:?}", etag),
        }
    }
    headers
}
