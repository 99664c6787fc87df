use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::Settings;
use crate::error::{ConvertError, Result};
use crate::runner::{self, Program};
use crate::storage::scoped_temp_file;

/// Source prepended to the document before compiling it for export.
pub const PREAMBLE: &str = include_str!("../../assets/preamble.typ");

/// Where job `job_id` writes the preamble-carrying copy of `input`: a
/// hidden sibling, so relative imports keep resolving. The job id keeps
/// concurrent conversions of the same file apart.
pub fn preamble_copy_path(input: &Path, job_id: &str) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "main.typ".to_string());
    input.with_file_name(format!(".typ2docx.{}.{}", job_id, name))
}

/// Compiles `input` with the preamble to `output` (a PDF).
///
/// The user's file is never modified; the compiler reads a temporary copy
/// that is removed on every exit path.
pub async fn compile(
    settings: &Settings,
    input: &Path,
    job_id: &str,
    typst_opts: &[String],
    output: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let span = tracing::info_span!("processor.typst", input = %input.display());
    async {
        let source = std::fs::read_to_string(input).map_err(|e| ConvertError::io(input, e))?;
        let copy = scoped_temp_file(preamble_copy_path(input, job_id), format!("{}{}", PREAMBLE, source))?;

        let mut args: Vec<OsString> = vec!["compile".into()];
        args.extend(typst_opts.iter().map(OsString::from));
        args.push(copy.path().as_os_str().to_os_string());
        args.push(output.as_os_str().to_os_string());

        runner::run(Program::new(&settings.typst).args(args), cancel).await?;
        Ok::<(), ConvertError>(())
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preamble_copy_is_hidden_sibling() {
        assert_eq!(
            preamble_copy_path(Path::new("/docs/thesis/main.typ"), "job1"),
            PathBuf::from("/docs/thesis/.typ2docx.job1.main.typ")
        );
        assert_eq!(
            preamble_copy_path(Path::new("paper.typ"), "job2"),
            PathBuf::from(".typ2docx.job2.paper.typ")
        );
    }

    #[test]
    fn test_preamble_leaves_layout_alone() {
        assert!(!PREAMBLE.is_empty());
        for rule in ["#set page", "#set par", "#set text", "#show"] {
            assert!(!PREAMBLE.contains(rule), "preamble restyles the document: {}", rule);
        }
        assert!(!PREAMBLE.contains("#import"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_compile_passes_copy_and_options() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("args.log");
        let fake = dir.path().join("typst");
        // Records its arguments and the compiled source, then writes the output.
        std::fs::write(
            &fake,
            format!(
                "#!/bin/sh\necho \"$@\" > '{log}'\nfor last; do :; done\ncat \"$4\" >> '{log}'\nprintf '%%PDF' > \"$last\"\n",
                log = log.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let input = dir.path().join("main.typ");
        std::fs::write(&input, "BODY").unwrap();
        let output = dir.path().join("a.pdf");

        let settings = Settings {
            typst: fake,
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        compile(
            &settings,
            &input,
            "job1",
            &["--root".to_string(), dir.path().display().to_string()],
            &output,
            &cancel,
        )
        .await
        .unwrap();

        let recorded = std::fs::read_to_string(&log).unwrap();
        assert!(recorded.starts_with("compile --root"));
        assert!(recorded.contains(".typ2docx.job1.main.typ"));
        assert!(recorded.contains(PREAMBLE));
        assert!(recorded.trim_end().ends_with("BODY"));
        assert!(output.exists());
        assert!(!preamble_copy_path(&input, "job1").exists());
        assert_eq!(std::fs::read_to_string(&input).unwrap(), "BODY");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_compile_still_removes_copy() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("main.typ");
        std::fs::write(&input, "BODY").unwrap();

        let settings = Settings {
            typst: PathBuf::from("false"),
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let result = compile(&settings, &input, "job1", &[], &dir.path().join("a.pdf"), &cancel).await;

        assert!(matches!(
            result,
            Err(ConvertError::ExternalToolFailure { .. })
        ));
        assert!(!preamble_copy_path(&input, "job1").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_concurrent_jobs_keep_separate_copies() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("typst");
        // The slower job reads its copy after the faster one has finished.
        std::fs::write(
            &fake,
            "#!/bin/sh\nset -e\nfor last; do :; done\ncase \"$last\" in *slow*) sleep 0.5;; esac\ncat \"$2\" > \"$last\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let input = dir.path().join("main.typ");
        std::fs::write(&input, "BODY").unwrap();
        let fast = dir.path().join("fast.pdf");
        let slow = dir.path().join("slow.pdf");

        let settings = Settings {
            typst: fake,
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let (first, second) = tokio::join!(
            compile(&settings, &input, "job-a", &[], &fast, &cancel),
            compile(&settings, &input, "job-b", &[], &slow, &cancel),
        );

        first.unwrap();
        second.unwrap();
        assert!(std::fs::read_to_string(&slow).unwrap().ends_with("BODY"));
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".typ2docx."))
            .collect();
        assert!(leftovers.is_empty());
    }
}
