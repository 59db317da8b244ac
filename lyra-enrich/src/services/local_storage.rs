//! Filesystem object storage under `<root>/media`
//!
//! Write grants are upload URLs carrying an expiry and a SHA-256 signature
//! over (secret, key, expiry); `PUT /media/upload/{key}` verifies them before
//! writing. Stored files are read back through `GET /media/files/{key}`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lyra_common::{Error, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::services::providers::{ObjectStorage, WriteGrant};

pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: String,
    signing_secret: String,
}

impl LocalObjectStorage {
    pub fn new(root: PathBuf, public_base_url: &str, signing_secret: String) -> Self {
        Self {
            root,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            signing_secret,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a storage key onto a path below the root, rejecting traversal
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        let mut segments = 0;
        for segment in key.split('/') {
            let valid = !segment.is_empty()
                && segment != "."
                && segment != ".."
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
            if !valid {
                return Err(Error::validation("key", format!("invalid storage key '{}'", key)));
            }
            path.push(segment);
            segments += 1;
        }
        if segments == 0 {
            return Err(Error::validation("key", "empty storage key"));
        }
        Ok(path)
    }

    fn signature(&self, key: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.signing_secret.as_bytes());
        hasher.update(b"\n");
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
        hasher.update(expires.to_string().as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Check an upload URL's expiry and signature
    pub fn verify_grant(&self, key: &str, expires: i64, signature: &str) -> Result<()> {
        if Utc::now().timestamp() > expires {
            return Err(Error::Authorization("upload grant expired".into()));
        }

        let expected = self.signature(key, expires);
        let matches = expected.len() == signature.len()
            && expected
                .bytes()
                .zip(signature.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0;
        if !matches {
            return Err(Error::Authorization("invalid upload signature".into()));
        }
        Ok(())
    }

    /// Store an uploaded artifact (write to a temp file, then rename)
    pub async fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = path.with_extension("upload");
        tokio::fs::write(&temp_path, bytes).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        tracing::debug!(key, bytes = bytes.len(), "Stored artifact");
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn presign_write(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<WriteGrant> {
        self.path_for(key)?;

        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| Error::validation("ttl", e.to_string()))?;
        let expires_at: DateTime<Utc> = Utc::now() + ttl;
        let expires = expires_at.timestamp();

        Ok(WriteGrant {
            key: key.to_string(),
            upload_url: format!(
                "{}/media/upload/{}?expires={}&signature={}",
                self.public_base_url,
                key,
                expires,
                self.signature(key, expires)
            ),
            public_url: self.public_url(key),
            content_type: content_type.to_string(),
            expires_at,
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/media/files/{}", self.public_base_url, key)
    }
}
