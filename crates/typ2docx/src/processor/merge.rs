use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::Settings;
use crate::error::{ConvertError, Result};
use crate::runner::{self, Program};
use crate::storage::Artifact;

/// Returns the merge script, or `ToolNotFound` when it is not on disk.
pub fn locate_script(settings: &Settings) -> Result<PathBuf> {
    let script = settings.merge_script_path();
    if script.is_file() {
        Ok(script)
    } else {
        Err(ConvertError::ToolNotFound {
            tool: script.display().to_string(),
        })
    }
}

fn interpreter(script: &Path) -> Program {
    if cfg!(windows) {
        Program::new("powershell").arg(script)
    } else {
        Program::new("sh").arg(script)
    }
}

/// `PATH` with the directory of the running executable in front, so tools
/// shipped next to it are found by the script.
fn search_path() -> Option<OsString> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))?;
    let mut dirs = vec![exe_dir];
    if let Some(path) = std::env::var_os("PATH") {
        dirs.extend(std::env::split_paths(&path));
    }
    std::env::join_paths(dirs).ok()
}

/// Combines `a.docx` and `b.docx` into `c.docx` inside `workdir`.
pub async fn merge(
    settings: &Settings,
    workdir: &Path,
    cancel: &CancellationToken,
) -> Result<PathBuf> {
    let script = locate_script(settings)?;
    let mut program = interpreter(&script).current_dir(workdir);
    if let Some(path) = search_path() {
        program = program.env("PATH", path);
    }

    runner::run(program, cancel)
        .instrument(tracing::info_span!("processor.merge"))
        .await?;

    let merged = workdir.join(Artifact::MergedDocx.file_name());
    if merged.is_file() {
        Ok(merged)
    } else {
        Err(ConvertError::ResultFileMissing {
            path: merged,
            attempts: 1,
        })
    }
}
