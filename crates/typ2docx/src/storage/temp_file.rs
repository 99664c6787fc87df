use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{ConvertError, Result};

/// A file that exists exactly as long as this handle.
///
/// Written on creation and deleted on drop, so the file disappears whether
/// the owning scope returns, fails, or is cancelled.
#[derive(Debug)]
pub struct ScopedFile {
    path: PathBuf,
}

impl ScopedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed scoped file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", self.path.display(), e),
        }
    }
}

/// Writes `content` to `path` and returns a handle that deletes it on drop.
pub fn scoped_temp_file(path: impl Into<PathBuf>, content: impl AsRef<[u8]>) -> Result<ScopedFile> {
    let path = path.into();
    std::fs::write(&path, content).map_err(|e| ConvertError::io(&path, e))?;
    Ok(ScopedFile { path })
}
