use std::fmt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};

use crate::error::{ConvertError, Result};

/// Directory name of the retained workspace in debug mode.
pub const DEBUG_DIR_NAME: &str = ".typ2docx";

const TEMP_PREFIX: &str = "typ2docx_";

/// Fixed artifact names inside the scratch workspace. Branches only ever
/// write their own artifacts, so no locking is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    /// Compiled page-description file (branch A).
    Pdf,
    /// PDF carrying the desktop automation script (branch A).
    InjectedPdf,
    /// Full-fidelity Word export (branch A).
    ExportedDocx,
    /// Equation-only Typst source (branch B).
    MathSource,
    /// Equation-only Word fragment (branch B).
    MathDocx,
    /// Merged deliverable.
    MergedDocx,
}

impl Artifact {
    pub fn file_name(self) -> &'static str {
        match self {
            Artifact::Pdf => "a.pdf",
            Artifact::InjectedPdf => "a-injected.pdf",
            Artifact::ExportedDocx => "a.docx",
            Artifact::MathSource => "b.typ",
            Artifact::MathDocx => "b.docx",
            Artifact::MergedDocx => "c.docx",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Scratch directory scoped to one job.
///
/// The ephemeral variant is removed recursively when dropped, which covers
/// normal completion, errors and cancellation of the owning future alike.
/// The retained variant is left on disk for inspection.
#[derive(Debug)]
pub enum Workspace {
    Ephemeral(TempDir),
    Retained(PathBuf),
}

impl Workspace {
    /// Provisions the workspace for a job started from `cwd`.
    ///
    /// With `debug` the fixed directory `<cwd>/.typ2docx` is created (or
    /// reused); otherwise a uniquely named temporary directory is created.
    /// Either way the directory is probed for writability before it is
    /// handed out.
    pub fn acquire(debug: bool, cwd: &Path) -> Result<Self> {
        let workspace = if debug {
            let dir = cwd.join(DEBUG_DIR_NAME);
            std::fs::create_dir_all(&dir).map_err(|e| ConvertError::io(&dir, e))?;
            info!("Retaining workspace at {}", dir.display());
            Workspace::Retained(dir)
        } else {
            let dir = tempfile::Builder::new()
                .prefix(TEMP_PREFIX)
                .tempdir()
                .map_err(|e| ConvertError::io(std::env::temp_dir(), e))?;
            debug!("Created workspace {}", dir.path().display());
            Workspace::Ephemeral(dir)
        };

        ensure_writable(workspace.path())?;
        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        match self {
            Workspace::Ephemeral(dir) => dir.path(),
            Workspace::Retained(dir) => dir,
        }
    }

    pub fn is_retained(&self) -> bool {
        matches!(self, Workspace::Retained(_))
    }

    pub fn artifact(&self, artifact: Artifact) -> PathBuf {
        self.path().join(artifact.file_name())
    }

    /// Releases the workspace now instead of at drop time, reporting
    /// removal failures. Retained workspaces are left untouched.
    pub fn release(self) -> Result<()> {
        match self {
            Workspace::Ephemeral(dir) => {
                let path = dir.path().to_path_buf();
                dir.close().map_err(|e| ConvertError::io(&path, e))?;
                debug!("Removed workspace {}", path.display());
                Ok(())
            }
            Workspace::Retained(dir) => {
                info!("Workspace kept at {}", dir.display());
                Ok(())
            }
        }
    }
}

fn ensure_writable(dir: &Path) -> Result<()> {
    tempfile::NamedTempFile::new_in(dir)
        .map(drop)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => ConvertError::PermissionDenied {
                path: dir.to_path_buf(),
            },
            _ => ConvertError::io(dir, e),
        })
}
