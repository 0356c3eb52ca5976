//! Filesystem-backed blob storage for cover images.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

use crate::application::ports::{BlobError, BlobStorage, StoredBlob};

/// Stores blobs as flat files under `root` and serves them from `public_base_url`.
#[derive(Debug)]
pub struct FsBlobStorage {
    root: PathBuf,
    public_base_url: String,
}

impl FsBlobStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf, public_base_url: impl Into<String>) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn public_url(&self, name: &str) -> String {
        format!("{}/{name}", self.public_base_url)
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(name);
        let mut components = relative.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) if !name.starts_with('.') => {
                Ok(self.root.join(relative))
            }
            _ => Err(BlobError::InvalidName(name.to_string())),
        }
    }
}

#[async_trait]
impl BlobStorage for FsBlobStorage {
    async fn upload(&self, name: &str, _content_type: &str, data: Bytes) -> Result<String, BlobError> {
        let target = self.resolve(name)?;
        let staging = self.root.join(format!(".{}.partial", Uuid::new_v4()));

        let mut file = fs::File::create(&staging).await?;
        if let Err(err) = file.write_all(&data).await {
            drop(file);
            let _ = fs::remove_file(&staging).await;
            return Err(err.into());
        }
        file.flush().await?;
        drop(file);
        fs::rename(&staging, &target).await?;

        debug!(blob = name, size = data.len(), "blob stored");
        Ok(self.public_url(name))
    }

    async fn download(&self, name: &str) -> Result<Option<StoredBlob>, BlobError> {
        let path = self.resolve(name)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(StoredBlob {
                content_type: mime_guess::from_path(&path)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string(),
                data: Bytes::from(data),
            })),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}
