//! Artifact store: assembles uploaded chunks into one immutable file per
//! handle under a root directory.

use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::error::ImageError;
use crate::registry::ArtifactRef;

/// File-backed store for uploaded image bytes.
///
/// Each handle maps to `<root>/<id>.img`. Files are written once during
/// ingest and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, ImageError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| ImageError::Internal(format!("failed to create upload dir: {e}")))?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an artifact for `id` would be stored at.
    pub fn artifact_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.img"))
    }

    /// Start assembling an artifact for a pre-issued handle.
    pub async fn begin(&self, id: &str) -> Result<UploadSink, ImageError> {
        let path = self.artifact_path(id);
        let file = File::create(&path).await?;
        Ok(UploadSink {
            path,
            file: Some(file),
            written: 0,
        })
    }
}

/// Write target for one in-flight upload.
///
/// Chunks are appended in arrival order. [`finish`](Self::finish) seals the
/// artifact; [`abort`](Self::abort) removes the partial file. A sink dropped
/// without either leaves an unusable partial file behind, which the caller
/// is expected to abort on its error path.
#[derive(Debug)]
pub struct UploadSink {
    path: PathBuf,
    file: Option<File>,
    written: u64,
}

impl UploadSink {
    /// Append one chunk to the artifact.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), ImageError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| ImageError::Internal("write after sink closed".to_string()))?;
        file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Bytes accepted so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and seal the artifact, returning its location.
    pub async fn finish(mut self) -> Result<ArtifactRef, ImageError> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| ImageError::Internal("finish after sink closed".to_string()))?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(ArtifactRef {
            path: self.path,
            size: self.written,
        })
    }

    /// Remove the partial artifact after a failed upload. Best effort: a
    /// failure to remove is logged, not surfaced.
    pub async fn abort(mut self) {
        drop(self.file.take());
        if let Err(e) = fs::remove_file(&self.path).await {
            tracing::warn!("failed to remove partial upload {}: {}", self.path.display(), e);
        }
    }
}
