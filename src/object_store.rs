//! Artifact storage for finished reports.
//!
//! Artifacts are write-once blobs keyed by a generated path. Completed jobs
//! are handed out as time-limited share URLs: an opaque token carrying the
//! path and expiry, signed with a server-side secret. The default backend is
//! a local directory root (deployments mount the bucket there); anything
//! else slots in behind [`ObjectStore`].

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::stats::error::{Result, StatsError};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores a new artifact. Paths are write-once; overwriting is an error.
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Reads an artifact back (used by the share-download endpoint).
    async fn get(&self, path: &str) -> Result<Vec<u8>>;

    /// Time-limited share URL for a stored path.
    fn share_url(&self, path: &str) -> Result<SharedLink>;

    /// Resolves a share token + signature back to the stored path, rejecting
    /// tampered or expired links.
    fn verify_share_token(&self, token: &str, signature: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct SharedLink {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    secret: String,
    share_ttl: Duration,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(
        root: impl Into<PathBuf>,
        secret: String,
        share_ttl_seconds: i64,
        public_base_url: String,
    ) -> Self {
        Self {
            root: root.into(),
            secret,
            share_ttl: Duration::seconds(share_ttl_seconds),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn signature_for(&self, path: &str, expires_unix: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b"|");
        hasher.update(path.as_bytes());
        hasher.update(b"|");
        hasher.update(expires_unix.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Artifact paths come from our own generator, but the share token is
    /// client-supplied on download, so traversal components are rejected.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let sane = relative.components().all(|c| matches!(c, Component::Normal(_)));
        if !sane || relative.is_absolute() {
            return Err(StatsError::ArtifactStore(format!(
                "illegal artifact path: {path}"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let target = self.resolve(path)?;
        if tokio::fs::try_exists(&target).await? {
            return Err(StatsError::ArtifactStore(format!(
                "artifact already exists: {path}"
            )));
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        info!(path, size = bytes.len(), "Stored artifact");
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let target = self.resolve(path)?;
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StatsError::NotFound {
                what: "artifact",
                id: path.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn share_url(&self, path: &str) -> Result<SharedLink> {
        self.resolve(path)?;
        let expires_at = Utc::now() + self.share_ttl;
        let expires_unix = expires_at.timestamp();
        let token = BASE64_URL.encode(format!("{path}|{expires_unix}"));
        let signature = self.signature_for(path, expires_unix);
        debug!(path, %expires_at, "Issued share link");
        Ok(SharedLink {
            url: format!("{}/files/{token}?sig={signature}", self.public_base_url),
            expires_at,
        })
    }

    fn verify_share_token(&self, token: &str, signature: &str) -> Result<String> {
        let decoded = BASE64_URL
            .decode(token)
            .map_err(|_| StatsError::InvalidShareToken)?;
        let decoded = String::from_utf8(decoded).map_err(|_| StatsError::InvalidShareToken)?;

        let (path, expires) = decoded.rsplit_once('|').ok_or(StatsError::InvalidShareToken)?;
        let expires_unix: i64 = expires.parse().map_err(|_| StatsError::InvalidShareToken)?;

        if self.signature_for(path, expires_unix) != signature {
            return Err(StatsError::InvalidShareToken);
        }
        if Utc::now().timestamp() > expires_unix {
            return Err(StatsError::InvalidShareToken);
        }
        Ok(path.to_string())
    }
}

/// Display name of an artifact, the last path component.
pub fn file_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(ttl_seconds: i64) -> (tempfile::TempDir, LocalObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(
            dir.path(),
            "unit-test-secret".to_string(),
            ttl_seconds,
            "http://localhost:8080".to_string(),
        );
        (dir, store)
    }

    #[tokio::test]
    async fn put_get_round_trip() {
        let (_dir, store) = store(600);
        store.put("statistics/report.csv", b"a,b\n1,2\n").await.unwrap();
        let bytes = store.get("statistics/report.csv").await.unwrap();
        assert_eq!(bytes, b"a,b\n1,2\n");
    }

    #[tokio::test]
    async fn artifacts_are_write_once() {
        let (_dir, store) = store(600);
        store.put("statistics/report.csv", b"first").await.unwrap();
        let err = store.put("statistics/report.csv", b"second").await;
        assert!(matches!(err, Err(StatsError::ArtifactStore(_))));
    }

    #[tokio::test]
    async fn missing_artifact_is_not_found() {
        let (_dir, store) = store(600);
        assert!(matches!(
            store.get("statistics/none.csv").await,
            Err(StatsError::NotFound { .. })
        ));
    }

    #[test]
    fn share_links_verify_and_carry_expiry() {
        let (_dir, store) = store(600);
        let link = store.share_url("statistics/report.csv").unwrap();
        assert!(link.expires_at > Utc::now());

        let (token, signature) = parse_link(&link.url);
        let path = store.verify_share_token(&token, &signature).unwrap();
        assert_eq!(path, "statistics/report.csv");
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let (_dir, store) = store(600);
        let link = store.share_url("statistics/report.csv").unwrap();
        let (token, _) = parse_link(&link.url);
        assert!(matches!(
            store.verify_share_token(&token, "deadbeef"),
            Err(StatsError::InvalidShareToken)
        ));
    }

    #[test]
    fn expired_link_is_rejected() {
        let (_dir, store) = store(-60);
        let link = store.share_url("statistics/report.csv").unwrap();
        let (token, signature) = parse_link(&link.url);
        assert!(matches!(
            store.verify_share_token(&token, &signature),
            Err(StatsError::InvalidShareToken)
        ));
    }

    #[test]
    fn traversal_paths_are_rejected() {
        let (_dir, store) = store(600);
        assert!(store.share_url("../secrets.txt").is_err());
        assert!(store.share_url("/etc/passwd").is_err());
    }

    #[test]
    fn file_name_takes_last_component() {
        assert_eq!(file_name("statistics/42_report.csv"), "42_report.csv");
        assert_eq!(file_name("plain.csv"), "plain.csv");
    }

    fn parse_link(url: &str) -> (String, String) {
        let rest = url.split("/files/").nth(1).unwrap();
        let (token, query) = rest.split_once("?sig=").unwrap();
        (token.to_string(), query.to_string())
    }
}
