use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use super::inject::{export_script, inject_script};
use super::launcher::AppLauncher;
use super::WordExporter;
use crate::callback::CallbackListener;
use crate::config::{RetryPolicy, Settings};
use crate::error::{ConvertError, Result};
use crate::runner::{self, InProcess};
use crate::storage::{move_file, Artifact};

/// Desktop-application variant of the Word export.
///
/// The PDF gets a document-level script that calls the installed trusted
/// function, which saves the document as Word and reports the saved path
/// back through a [`CallbackListener`].
pub struct DesktopExport {
    launcher: Arc<dyn AppLauncher>,
    callback_port: u16,
    callback_timeout: Duration,
    warmup_delay: Duration,
    retry: RetryPolicy,
}

impl DesktopExport {
    pub fn new(launcher: Arc<dyn AppLauncher>, settings: &Settings) -> Self {
        Self {
            launcher,
            callback_port: 0,
            callback_timeout: settings.callback_timeout,
            warmup_delay: settings.warmup_delay,
            retry: settings.result_retry,
        }
    }

    async fn export(&self, pdf: &Path, workdir: &Path, cancel: &CancellationToken) -> Result<PathBuf> {
        let listener = CallbackListener::start(self.callback_port).await?;

        let injected = workdir.join(Artifact::InjectedPdf.file_name());
        let script = export_script(listener.port());
        let (src, dst) = (pdf.to_path_buf(), injected.clone());
        runner::run(
            InProcess::new("inject", move || inject_script(&src, &dst, &script)),
            cancel,
        )
        .await?;

        let already_running = self.launcher.launch_or_focus(cancel).await?;
        if !already_running {
            debug!("Cold start, waiting {:?} for the application", self.warmup_delay);
            tokio::select! {
                _ = tokio::time::sleep(self.warmup_delay) => {}
                _ = cancel.cancelled() => return Err(ConvertError::Cancelled),
            }
        }
        self.launcher.open(&injected, cancel).await?;

        info!("Waiting for export callback on port {}", listener.port());
        let reported = listener
            .await_message(self.callback_timeout, cancel)
            .await?
            .into_result()?;

        let located = locate_result(&reported, &self.retry, cancel).await?;
        let target = workdir.join(Artifact::ExportedDocx.file_name());
        move_file(&located, &target)?;
        Ok(target)
    }
}

#[async_trait]
impl WordExporter for DesktopExport {
    fn name(&self) -> &'static str {
        "desktop"
    }

    fn preflight(&self) -> Result<()> {
        self.launcher.preflight()
    }

    async fn render_to_word(
        &self,
        pdf: &Path,
        workdir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let span = tracing::info_span!("export.desktop", pdf = %pdf.display());
        self.export(pdf, workdir, cancel).instrument(span).await
    }
}

/// Candidate locations for a path reported by the application: as given,
/// then with the leading volume component removed
/// (`/Macintosh HD/Users/x` becomes `/Users/x`).
pub fn host_path_candidates(reported: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![reported.to_path_buf()];

    let mut components = reported.components();
    if let Some(Component::RootDir) = components.next() {
        if components.next().is_some() {
            let stripped = Path::new("/").join(components.as_path());
            if stripped != Path::new("/") && stripped != reported {
                candidates.push(stripped);
            }
        }
    }
    candidates
}

/// Waits for the reported result file to become visible.
///
/// The callback can fire before the file is flushed to disk, so a missing
/// file is retried with exponential backoff up to the policy's budget.
pub async fn locate_result(
    reported: &Path,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<PathBuf> {
    let candidates = host_path_candidates(reported);
    let attempts = retry.max_attempts.max(1);

    for attempt in 1..=attempts {
        let delay = retry.delay_before(attempt);
        if !delay.is_zero() {
            warn!(
                "Result file not visible yet, retrying (attempt {}/{}) after {:?}",
                attempt, attempts, delay
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(ConvertError::Cancelled),
            }
        }

        if let Some(found) = candidates.iter().find(|c| c.is_file()) {
            debug!("Result file found at {}", found.display());
            return Ok(found.clone());
        }
    }

    Err(ConvertError::ResultFileMissing {
        path: reported.to_path_buf(),
        attempts,
    })
}
