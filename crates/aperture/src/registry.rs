//! Session registry: issues opaque image handles and resolves them to
//! stored artifacts.
//!
//! A handle is issued once per upload attempt but only committed (made
//! resolvable) when the upload's input stream reaches a normal end. Handles
//! are never reused; nothing is garbage-collected here.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use uuid::Uuid;

use crate::error::ImageError;

/// Opaque identifier for one ingested image.
///
/// String form of a random UUID. Callers treat it as opaque; only the
/// registry that issued it can resolve it.
pub type ImageId = String;

/// Location of a committed artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    /// Path of the assembled file on disk.
    pub path: PathBuf,
    /// Total size of the artifact in bytes.
    pub size: u64,
}

/// Issues and tracks image handles.
///
/// Safe for concurrent `issue`/`commit`/`resolve` from independent sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    entries: RwLock<HashMap<ImageId, ArtifactRef>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh collision-resistant handle.
    ///
    /// The handle is not resolvable until [`commit`](Self::commit) is
    /// called for it.
    pub fn issue(&self) -> ImageId {
        Uuid::new_v4().to_string()
    }

    /// Make a handle resolvable, binding it to a finished artifact.
    ///
    /// Returns `Internal` if the handle was already committed; handles are
    /// bound exactly once.
    pub fn commit(&self, id: &str, artifact: ArtifactRef) -> Result<(), ImageError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ImageError::Internal("registry lock poisoned".to_string()))?;
        if entries.contains_key(id) {
            return Err(ImageError::Internal(format!(
                "handle committed twice: {id}"
            )));
        }
        entries.insert(id.to_string(), artifact);
        Ok(())
    }

    /// Look up a committed handle.
    pub fn resolve(&self, id: &str) -> Result<ArtifactRef, ImageError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| ImageError::Internal("registry lock poisoned".to_string()))?;
        entries
            .get(id)
            .cloned()
            .ok_or_else(|| ImageError::UnknownImage(id.to_string()))
    }

    /// Number of committed handles. Used by tests and status logging.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// True if no handle has been committed yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
