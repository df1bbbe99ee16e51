/// Ephemeral previews for files waiting in an upload batch
///
/// Every handle handed out by a registry must be given back exactly once; the
/// batch releases handles when a record is removed, finishes, or the batch is
/// closed.

use crate::error::Result;
use crate::media::MediaFile;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

/// A preview resource owned by one upload record. Deliberately not `Clone`.
#[derive(Debug, PartialEq, Eq)]
pub struct PreviewHandle {
    id: Uuid,
    location: Option<PathBuf>,
}

impl PreviewHandle {
    pub fn new(location: Option<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            location,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Where the preview can be displayed from, if the registry materialises one.
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }
}

pub trait PreviewRegistry: Send + Sync {
    fn acquire(&self, file: &MediaFile) -> Result<PreviewHandle>;

    fn release(&self, handle: PreviewHandle);
}

/// Previews that exist only as identifiers.
#[derive(Debug, Default)]
pub struct NoopPreviews;

impl PreviewRegistry for NoopPreviews {
    fn acquire(&self, _file: &MediaFile) -> Result<PreviewHandle> {
        Ok(PreviewHandle::new(None))
    }

    fn release(&self, _handle: PreviewHandle) {}
}

/// Writes each preview to a private temporary directory and deletes it on release.
#[derive(Debug)]
pub struct TempPreviewStore {
    dir: TempDir,
}

impl TempPreviewStore {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::Builder::new().prefix("clip-previews-").tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl PreviewRegistry for TempPreviewStore {
    fn acquire(&self, file: &MediaFile) -> Result<PreviewHandle> {
        let extension = file.extension().unwrap_or_else(|| "bin".to_string());
        let handle_id = Uuid::new_v4();
        let location = self.dir.path().join(format!("{}.{}", handle_id.simple(), extension));
        std::fs::write(&location, &file.data)?;
        debug!("Created preview for {} at {:?}", file.name, location);
        Ok(PreviewHandle {
            id: handle_id,
            location: Some(location),
        })
    }

    fn release(&self, handle: PreviewHandle) {
        if let Some(location) = handle.location {
            if let Err(e) = std::fs::remove_file(&location) {
                warn!("Failed to release preview {:?}: {}", location, e);
            }
        }
    }
}
