//! Filesystem blob store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::BlobStore;
use crate::types::record::{ImageRef, RecordId};

/// Writes thumbnails under `<media_root>/<subdir>/`.
///
/// Each write goes to a hidden temp file in the same directory and is then
/// renamed into place, so readers never observe a partial image. The
/// returned [`ImageRef`] is the path relative to the media root.
pub struct FsBlobStore {
    media_root: PathBuf,
    subdir: String,
}

impl FsBlobStore {
    pub fn new(media_root: impl Into<PathBuf>, subdir: impl Into<String>) -> Self {
        Self {
            media_root: media_root.into(),
            subdir: subdir.into(),
        }
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    /// Absolute location of a stored image.
    pub fn resolve(&self, image: &ImageRef) -> PathBuf {
        self.media_root.join(image.as_str())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn store(&self, record_id: RecordId, filename: &str, bytes: &[u8]) -> StoreResult<ImageRef> {
        if filename.is_empty() || filename.contains(['/', '\\']) || filename.starts_with('.') {
            return Err(StoreError::Backend(
                format!("refusing to store blob under {:?}", filename).into(),
            ));
        }

        let dir = self.media_root.join(&self.subdir);
        tokio::fs::create_dir_all(&dir).await?;

        let target = dir.join(filename);
        let tmp = dir.join(format!(".{}.{}.tmp", filename, Uuid::new_v4()));

        if let Err(e) = tokio::fs::write(&tmp, bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        let image = ImageRef(format!("{}/{}", self.subdir, filename));
        debug!(record_id = %record_id, image = %image, bytes = bytes.len(), "Stored thumbnail");
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_writes_under_subdir() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path(), "link_previews");

        let image = blobs
            .store(RecordId(5), "preview_5.jpg", b"\xFF\xD8jpeg")
            .await
            .unwrap();

        assert_eq!(image.as_str(), "link_previews/preview_5.jpg");
        let written = std::fs::read(blobs.resolve(&image)).unwrap();
        assert_eq!(written, b"\xFF\xD8jpeg");
    }

    #[tokio::test]
    async fn test_store_overwrites_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path(), "link_previews");

        blobs.store(RecordId(5), "pageimg_5.jpg", b"first").await.unwrap();
        let image = blobs.store(RecordId(5), "pageimg_5.jpg", b"second").await.unwrap();

        assert_eq!(std::fs::read(blobs.resolve(&image)).unwrap(), b"second");
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("link_previews"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec!["pageimg_5.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path(), "link_previews");

        assert!(blobs.store(RecordId(1), "../evil.jpg", b"x").await.is_err());
        assert!(blobs.store(RecordId(1), "", b"x").await.is_err());
    }
}
