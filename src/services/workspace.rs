use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tokio::sync::{Semaphore, SemaphorePermit};

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("invalid staging name: {0}")]
    InvalidName(String),
}

/// Process-lifetime scratch directory for staged uploads and conversion
/// output, plus the capacity-1 gate that serializes the save+convert phase
/// across requests. The directory is removed when the workspace is dropped.
pub struct Workspace {
    dir: TempDir,
    gate: Semaphore,
}

impl Workspace {
    pub fn create() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("image-conversion")
            .tempdir()?;
        Ok(Self {
            dir,
            gate: Semaphore::new(1),
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Join a staged file name onto the workspace root. Only single-component
    /// names are accepted so staged files cannot escape the directory.
    pub fn staging_path(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.dir.path().join(name)),
            _ => Err(WorkspaceError::InvalidName(name.to_string())),
        }
    }

    /// Acquire the conversion gate. The permit is released when dropped, on
    /// every exit path. At most one request holds it at a time.
    pub async fn acquire_conversion_permit(&self) -> SemaphorePermit<'_> {
        // The gate lives as long as the workspace and is never closed.
        self.gate
            .acquire()
            .await
            .expect("conversion gate unexpectedly closed")
    }
}

/// Guard over one staged file. Removing the file on drop is best-effort:
/// a file that was never produced is a no-op, and removal failures never
/// mask the error being reported for the request.
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("failed to remove staged file {}: {}", self.path.display(), e);
            }
        }
    }
}
