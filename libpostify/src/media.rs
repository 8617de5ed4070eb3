//! On-disk storage for post images
//!
//! Files are content-addressed: the stored name is the SHA-256 of the bytes,
//! so uploading the same image twice yields the same reference. A reference
//! is the path relative to the media root, e.g. `posts/<hash>.png`.

use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::{MediaError, Result};
use crate::types::ImageMimeType;

const POSTS_DIR: &str = "posts";

/// A storage reference resolved to a readable file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub path: PathBuf,
    pub mime: ImageMimeType,
}

impl ResolvedImage {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("image.{}", self.mime.extension()))
    }

    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        fs::read(&self.path).await
    }
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    references: Arc<Mutex<()>>,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            references: Arc::new(Mutex::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Exclusive access to which posts point at which files. Hold it from
    /// `save` until the referencing row is written, and from dropping a
    /// reference through counting the rest and `delete`.
    pub async fn lock_references(&self) -> MutexGuard<'_, ()> {
        self.references.lock().await
    }

    /// Store image bytes and return their reference
    pub async fn save(&self, bytes: &[u8], mime: &str) -> Result<String> {
        let mime = ImageMimeType::from_mime_str(mime)
            .ok_or_else(|| MediaError::UnsupportedType(mime.to_string()))?;

        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let name = format!("{}.{}", hex::encode(hasher.finalize()), mime.extension());

        let dir = self.root.join(POSTS_DIR);
        fs::create_dir_all(&dir).await.map_err(MediaError::Io)?;
        fs::write(dir.join(&name), bytes)
            .await
            .map_err(MediaError::Io)?;

        let reference = format!("{}/{}", POSTS_DIR, name);
        debug!("Stored {} bytes as {}", bytes.len(), reference);
        Ok(reference)
    }

    /// Resolve a reference to a file on disk.
    ///
    /// Returns `Ok(None)` when the reference is well formed but the file is
    /// gone, so callers can fall back to text-only delivery.
    pub async fn resolve(&self, reference: &str) -> Result<Option<ResolvedImage>> {
        let relative = Path::new(reference);
        let safe = !reference.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(MediaError::InvalidReference(reference.to_string()).into());
        }

        let mime = relative
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ImageMimeType::from_extension)
            .ok_or_else(|| MediaError::UnsupportedType(reference.to_string()))?;

        let path = self.root.join(relative);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(ResolvedImage { path, mime })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MediaError::Io(e).into()),
        }
    }

    /// Remove a stored file; a missing file is not an error
    pub async fn delete(&self, reference: &str) -> Result<()> {
        let Some(image) = self.resolve(reference).await? else {
            return Ok(());
        };
        match fs::remove_file(&image.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MediaError::Io(e).into()),
        }
    }
}
