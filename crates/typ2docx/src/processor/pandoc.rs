use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::Settings;
use crate::error::{ConvertError, Result};
use crate::runner::{self, Program};
use crate::storage::Artifact;

/// Writes the equation-only source into the workspace.
pub fn write_math_source(workdir: &Path, source: &str) -> Result<PathBuf> {
    let path = workdir.join(Artifact::MathSource.file_name());
    std::fs::write(&path, source).map_err(|e| ConvertError::io(&path, e))?;
    Ok(path)
}

/// Converts `b.typ` to `b.docx` inside `workdir`.
pub async fn convert(
    settings: &Settings,
    workdir: &Path,
    cancel: &CancellationToken,
) -> Result<PathBuf> {
    let program = Program::new(&settings.pandoc)
        .arg(Artifact::MathSource.file_name())
        .arg("-o")
        .arg(Artifact::MathDocx.file_name())
        .current_dir(workdir);

    runner::run(program, cancel)
        .instrument(tracing::info_span!("processor.pandoc"))
        .await?;
    Ok(workdir.join(Artifact::MathDocx.file_name()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[tokio::test]
    async fn test_runs_in_workspace_with_fixed_names() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("pandoc");
        std::fs::write(&fake, "#!/bin/sh\n[ \"$1\" = b.typ ] && [ \"$3\" = b.docx ] && cp \"$1\" \"$3\"\n")
            .unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let workdir = dir.path().join("work");
        std::fs::create_dir(&workdir).unwrap();
        write_math_source(&workdir, "$x$").unwrap();

        let settings = Settings {
            pandoc: fake,
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let docx = convert(&settings, &workdir, &cancel).await.unwrap();

        assert_eq!(docx, workdir.join("b.docx"));
        assert_eq!(std::fs::read_to_string(docx).unwrap(), "$x$");
    }

    #[tokio::test]
    async fn test_missing_pandoc_is_tool_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            pandoc: PathBuf::from("pandoc-not-installed-anywhere"),
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let result = convert(&settings, dir.path(), &cancel).await;
        assert!(matches!(result, Err(ConvertError::ToolNotFound { .. })));
    }
}
