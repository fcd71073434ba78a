//! Object storage for uploaded images. The chat relay never touches storage directly:
//! images are uploaded first and referenced by the returned URL.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid object key: {0}")]
    InvalidKey(String),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bucket/key object store that hands back a public URL for each stored object.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create the bucket if it does not exist yet.
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    /// Store `content` under `key`, replacing any existing object; returns its URL.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: Vec<u8>,
    ) -> Result<String, StorageError>;

    /// Delete the object. Deleting a missing object succeeds.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError>;
}

/// Stores objects as files under `<root>/<bucket>/<key>`; URLs are
/// `<public_base_url>/<bucket>/<key>` (the gateway serves `root` at `/objects`).
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        let public_base_url = public_base_url.into().trim_end_matches('/').to_string();
        Self {
            root: root.into(),
            public_base_url,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        validate_segment(bucket)?;
        if key.is_empty() || key.starts_with('/') || key.contains('\\') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        for part in key.split('/') {
            validate_segment(part).map_err(|_| StorageError::InvalidKey(key.to_string()))?;
        }
        Ok(self.root.join(bucket).join(key))
    }

    /// Each path segment is percent-encoded so names with `#`, `?` or spaces stay fetchable.
    fn object_url(&self, bucket: &str, key: &str) -> String {
        let key = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "{}/{}/{}",
            self.public_base_url,
            urlencoding::encode(bucket),
            key
        )
    }
}

/// A single path segment: non-empty and a plain name (no `.`/`..`, no separators).
fn validate_segment(segment: &str) -> Result<(), StorageError> {
    let mut components = Path::new(segment).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(c)), None) if c == segment && !segment.contains('\\') => Ok(()),
        _ => Err(StorageError::InvalidKey(segment.to_string())),
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        validate_segment(bucket)?;
        let dir = self.root.join(bucket);
        if !dir.exists() {
            tokio::fs::create_dir_all(&dir).await?;
            log::info!("created bucket directory {}", dir.display());
        }
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: Vec<u8>,
    ) -> Result<String, StorageError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        log::debug!("stored object {}/{}", bucket, key);
        Ok(self.object_url(bucket, key))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                log::debug!("deleted object {}/{}", bucket, key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
