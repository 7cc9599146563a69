use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::etag_cache::{self, CacheMetadata};
use crate::constants::{INSTRUCTIONS_CACHE_FILE, INSTRUCTIONS_FETCH_TIMEOUT_SECS, INSTRUCTIONS_META_FILE};
use crate::utils::{Result, SwitchyardError};

/// Instruction prelude for the remote backend, fetched conditionally and
/// cached on disk.
///
/// Concurrent refreshes are not coordinated; the last writer wins.
#[derive(Debug, Clone)]
pub struct InstructionCache {
    client: Client,
    url: String,
    content_path: PathBuf,
    metadata_path: PathBuf,
    ttl: Duration,
}

impl InstructionCache {
    pub fn new(url: impl Into<String>, cache_dir: &Path, ttl: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(INSTRUCTIONS_FETCH_TIMEOUT_SECS))
                .build()?,
            url: url.into(),
            content_path: cache_dir.join(INSTRUCTIONS_CACHE_FILE),
            metadata_path: cache_dir.join(INSTRUCTIONS_META_FILE),
            ttl,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn content_path(&self) -> &Path {
        &self.content_path
    }

    /// Current prelude text.
    ///
    /// Served from disk while fresh. Otherwise revalidated with the stored
    /// ETag; any failed fetch falls back to the cached copy, and only errors
    /// when there is nothing cached at all.
    pub async fn get(&self) -> Result<String> {
        let cached = etag_cache::load(&self.content_path, &self.metadata_path).await;
        let now = chrono::Utc::now().timestamp_millis();

        if let Some(content) = &cached.content {
            if etag_cache::is_fresh(cached.metadata.as_ref(), self.ttl, now) {
                tracing::debug!("Instruction cache fresh, skipping fetch");
                return Ok(content.clone());
            }
        }

        match self.fetch(cached.content.as_deref(), cached.metadata.as_ref()).await {
            Ok(content) => Ok(content),
            Err(reason) => match cached.content {
                Some(content) => {
                    tracing::warn!("Using cached instructions: {}", reason);
                    Ok(content)
                }
                None => Err(SwitchyardError::CacheUnavailable {
                    url: self.url.clone(),
                    reason,
                }),
            },
        }
    }

    /// First `chars` characters of the cached prelude, without any network access
    pub async fn cached_prefix(&self, chars: usize) -> Option<String> {
        let content = tokio::fs::read_to_string(&self.content_path).await.ok()?;
        Some(content.chars().take(chars).collect())
    }

    async fn fetch(
        &self,
        cached: Option<&str>,
        metadata: Option<&CacheMetadata>,
    ) -> std::result::Result<String, String> {
        let response = self
            .client
            .get(&self.url)
            .headers(etag_cache::revalidation_headers(metadata))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        let now = chrono::Utc::now();

        if status == StatusCode::NOT_MODIFIED {
            if let Some(content) = cached {
                let refreshed = CacheMetadata {
                    last_checked: Some(now.timestamp_millis()),
                    ..metadata.cloned().unwrap_or_default()
                };
                self.persist(content, &refreshed).await;
                return Ok(content.to_string());
            }
        }

        if status.is_success() {
            let etag = response
                .headers()
                .get(reqwest::header::ETAG)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let content = response.text().await.map_err(|e| e.to_string())?;
            let fetched = CacheMetadata {
                etag,
                last_checked: Some(now.timestamp_millis()),
                last_fetch: Some(now.to_rfc3339()),
                ..CacheMetadata::default()
            };
            self.persist(&content, &fetched).await;
            return Ok(content);
        }

        Err(format!("HTTP {}", status.as_u16()))
    }

    async fn persist(&self, content: &str, metadata: &CacheMetadata) {
        if let Err(e) =
            etag_cache::store(&self.content_path, &self.metadata_path, content, metadata).await
        {
            tracing::warn!("Failed to write instruction cache: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const TTL: Duration = Duration::from_secs(15 * 60);

    fn cache_for(server: &mockito::Server, dir: &Path) -> InstructionCache {
        InstructionCache::new(format!("{}/codex.txt", server.url()), dir, TTL).unwrap()
    }

    async fn seed(dir: &Path, content: &str, metadata: CacheMetadata) {
        etag_cache::store(
            &dir.join(INSTRUCTIONS_CACHE_FILE),
            &dir.join(INSTRUCTIONS_META_FILE),
            content,
            &metadata,
        )
        .await
        .unwrap();
    }

    async fn stored_metadata(dir: &Path) -> CacheMetadata {
        etag_cache::load(&dir.join(INSTRUCTIONS_CACHE_FILE), &dir.join(INSTRUCTIONS_META_FILE))
            .await
            .metadata
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", "/codex.txt").expect(0).create_async().await;
        let temp_dir = TempDir::new().unwrap();
        seed(
            temp_dir.path(),
            "cached prelude",
            CacheMetadata {
                etag: Some("\"v1\"".to_string()),
                last_checked: Some(chrono::Utc::now().timestamp_millis() - 1_000),
                ..CacheMetadata::default()
            },
        )
        .await;

        let content = cache_for(&server, temp_dir.path()).get().await.unwrap();
        assert_eq!(content, "cached prelude");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_full_fetch_stores_etag_and_timestamps() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/codex.txt")
            .with_status(200)
            .with_header("etag", "\"v2\"")
            .with_body("new prelude")
            .create_async()
            .await;
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_for(&server, temp_dir.path());

        assert_eq!(cache.get().await.unwrap(), "new prelude");
        mock.assert_async().await;

        let metadata = stored_metadata(temp_dir.path()).await;
        assert_eq!(metadata.etag.as_deref(), Some("\"v2\""));
        assert!(metadata.last_checked.is_some());
        assert!(metadata.last_fetch.is_some());
        assert_eq!(cache.cached_prefix(3).await.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_not_modified_refreshes_last_checked_only() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/codex.txt")
            .match_header("if-none-match", "\"v1\"")
            .with_status(304)
            .create_async()
            .await;
        let temp_dir = TempDir::new().unwrap();
        seed(
            temp_dir.path(),
            "stale but valid",
            CacheMetadata {
                etag: Some("\"v1\"".to_string()),
                last_checked: Some(1),
                last_fetch: Some("2024-01-01T00:00:00+00:00".to_string()),
                ..CacheMetadata::default()
            },
        )
        .await;

        let content = cache_for(&server, temp_dir.path()).get().await.unwrap();
        assert_eq!(content, "stale but valid");
        mock.assert_async().await;

        let metadata = stored_metadata(temp_dir.path()).await;
        assert_eq!(metadata.etag.as_deref(), Some("\"v1\""));
        assert!(metadata.last_checked.unwrap() > 1);
        assert_eq!(metadata.last_fetch.as_deref(), Some("2024-01-01T00:00:00+00:00"));
    }

    #[tokio::test]
    async fn test_error_status_serves_stale_cache() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/codex.txt")
            .with_status(500)
            .create_async()
            .await;
        let temp_dir = TempDir::new().unwrap();
        seed(temp_dir.path(), "old prelude", CacheMetadata::default()).await;

        let content = cache_for(&server, temp_dir.path()).get().await.unwrap();
        assert_eq!(content, "old prelude");
    }

    #[tokio::test]
    async fn test_no_cache_and_failed_fetch_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/codex.txt")
            .with_status(503)
            .create_async()
            .await;
        let temp_dir = TempDir::new().unwrap();

        let error = cache_for(&server, temp_dir.path()).get().await.unwrap_err();
        assert!(matches!(error, SwitchyardError::CacheUnavailable { .. }));
        assert!(error.to_string().contains("no cache available"));
        assert!(cache_for(&server, temp_dir.path()).cached_prefix(10).await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_origin_serves_cache() {
        let temp_dir = TempDir::new().unwrap();
        seed(temp_dir.path(), "offline copy", CacheMetadata::default()).await;
        // nothing listens on port 9 in the test environment
        let cache = InstructionCache::new("http://127.0.0.1:9/codex.txt", temp_dir.path(), TTL)
            .unwrap();

        assert_eq!(cache.get().await.unwrap(), "offline copy");
    }
}
