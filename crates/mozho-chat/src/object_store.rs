use std::future::Future;
use std::io;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::{ObjectStore, StoreResult, StoredObject};

/// Keeps uploaded objects as flat files under a directory, addressed by
/// their slash-separated key. Public URLs are `{public_url}/{key}`.
pub struct DiskObjectStore {
    dir: PathBuf,
    public_url: String,
}

fn io_error(e: io::Error) -> StoreError {
    match e.kind() {
        io::ErrorKind::TimedOut => StoreError::Timeout,
        _ => StoreError::Unavailable(e.to_string()),
    }
}

impl DiskObjectStore {
    pub async fn new(dir: impl Into<PathBuf>, public_url: impl Into<String>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(io_error)?;
        info!("Object storage directory: {}", dir.display());
        Ok(Self {
            dir,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for a key. Keys that would escape the storage directory are refused.
    pub fn object_path(&self, key: &str) -> StoreResult<PathBuf> {
        let relative = Path::new(key);
        let clean = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(StoreError::Unavailable(format!("invalid object key {key:?}")));
        }
        Ok(self.dir.join(relative))
    }

    pub async fn read(&self, key: &str) -> StoreResult<Bytes> {
        let path = self.object_path(key)?;
        fs::read(&path).await.map(Bytes::from).map_err(io_error)
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> StoreResult<()> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let mut file = fs::File::create(&path).await.map_err(io_error)?;
        file.write_all(bytes).await.map_err(io_error)?;
        file.flush().await.map_err(io_error)?;
        Ok(())
    }
}

impl ObjectStore for DiskObjectStore {
    fn put(
        &self,
        key: String,
        bytes: Bytes,
        content_type: String,
    ) -> impl Future<Output = StoreResult<StoredObject>> + Send {
        async move {
            self.write(&key, &bytes).await?;
            debug!(key = %key, size = bytes.len(), content_type = %content_type, "Object stored");
            Ok(StoredObject {
                url: format!("{}/{}", self.public_url, key),
                size: bytes.len() as u64,
                key,
            })
        }
    }
}
