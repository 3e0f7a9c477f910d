use crate::config::Config;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),
}

/// On-disk cache of serialized feed documents, one file per fingerprint.
///
/// Validity is the file's age since last write. Reads never fail: any error
/// is logged and reported as a miss. Concurrent writers race with
/// last-writer-wins semantics, each write landing atomically.
#[derive(Debug, Clone)]
pub struct FeedCache {
    dir: PathBuf,
    ttl: Duration,
}

impl FeedCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(2 * 60 * 60);

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_ttl(dir, Self::DEFAULT_TTL)
    }

    pub fn with_ttl(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::with_ttl(&config.cache_dir, config.cache_ttl())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stable key for a request: SHA-256 over the URL and an optional
    /// discriminator, hex encoded.
    pub fn fingerprint(url: &str, extra: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hasher.update(b"|");
        hasher.update(extra.unwrap_or_default().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn path_for(&self, fingerprint: &str) -> Result<PathBuf, CacheError> {
        // SEC-011: Keys become file names, so only accept plain hex digests
        if fingerprint.is_empty() || !fingerprint.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CacheError::InvalidKey(fingerprint.to_string()));
        }
        Ok(self.dir.join(format!("{fingerprint}.xml")))
    }

    /// Cached bytes for `fingerprint`, or `None` when absent, expired or
    /// unreadable.
    pub async fn get(&self, fingerprint: &str) -> Option<Vec<u8>> {
        match self.try_get(fingerprint).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(key = %fingerprint, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    async fn try_get(&self, fingerprint: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.path_for(fingerprint)?;

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // A modification time in the future counts as fresh
        let age = SystemTime::now()
            .duration_since(metadata.modified()?)
            .unwrap_or(Duration::ZERO);
        if age > self.ttl {
            tracing::debug!(key = %fingerprint, age_secs = age.as_secs(), "Cache entry expired");
            return Ok(None);
        }

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            // Removed between stat and read
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Store `bytes` under `fingerprint`. Failures are logged, never returned.
    pub async fn put(&self, fingerprint: &str, bytes: &[u8]) {
        if let Err(e) = self.try_put(fingerprint, bytes).await {
            tracing::warn!(key = %fingerprint, error = %e, "Cache write failed");
        }
    }

    async fn try_put(&self, fingerprint: &str, bytes: &[u8]) -> Result<(), CacheError> {
        let path = self.path_for(fingerprint)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // SEC-009: Randomized temp filename so concurrent writers never share one
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let temp_path = path.with_extension(format!("tmp.{:016x}.{}", suffix, std::process::id()));

        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)
                .await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&temp_path, &path).await
        }
        .await;

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        tracing::debug!(key = %fingerprint, bytes = bytes.len(), "Feed cached");
        Ok(())
    }
}
