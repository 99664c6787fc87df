use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use crate::config::Settings;
use crate::error::ConvertError;
use crate::export::{select_exporter, WordExporter};
use crate::processor::{self, merge, pandoc, typst};
use crate::storage::{move_file, Artifact, Workspace};

use super::context::ConversionJob;
use super::error::{PipelineError, Stage};
use super::progress::{JobState, ProgressEvent, ProgressReporter};

/// What a successful job produced.
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub output: PathBuf,
    /// Scratch directory used by the job. Only still on disk if `retained`.
    pub workdir: PathBuf,
    pub retained: bool,
    /// Non-empty equations carried into the math-only document.
    pub equations: usize,
    pub elapsed: Duration,
}

pub struct Pipeline {
    settings: Arc<Settings>,
    exporter: Arc<dyn WordExporter>,
}

impl Pipeline {
    /// Production constructor: picks the export backend for the job's engine.
    pub fn for_job(settings: Arc<Settings>, job: &ConversionJob) -> Self {
        let exporter = select_exporter(job.engine(), &settings);
        Self { settings, exporter }
    }

    /// Test constructor: inject a specific export backend.
    pub fn new(settings: Arc<Settings>, exporter: Arc<dyn WordExporter>) -> Self {
        Self { settings, exporter }
    }

    /// Runs one job to completion.
    ///
    /// Both branches start together; the first failing branch cancels the
    /// other and becomes the job's diagnostic. The scratch workspace is
    /// released on every exit path unless the job asked to retain it.
    pub async fn run(
        &self,
        job: &ConversionJob,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<ConversionReport, PipelineError> {
        let span = info_span!("pipeline",
            job_id = %job.id(),
            input = %job.input().display(),
            engine = %job.engine(),
        );

        progress.report(ProgressEvent::Transition(JobState::Init));
        let result = self.execute(job, progress, cancel).instrument(span).await;

        match &result {
            Ok(report) => {
                progress.report(ProgressEvent::Transition(JobState::Done));
                progress.report(ProgressEvent::Completed {
                    output: report.output.clone(),
                    elapsed: report.elapsed,
                });
            }
            Err(e) => {
                progress.report(ProgressEvent::Transition(JobState::Failed));
                progress.report(ProgressEvent::Failed {
                    error: e.to_string(),
                });
            }
        }
        result
    }

    async fn execute(
        &self,
        job: &ConversionJob,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<ConversionReport, PipelineError> {
        let started = Instant::now();
        let root = self.preflight(job)?;

        let workspace = Workspace::acquire(job.debug(), job.cwd())
            .map_err(|e| PipelineError::new(Stage::Workspace, e))?;

        // Branches share a child token so a failing branch can stop its
        // sibling without cancelling the caller.
        let branch_cancel = cancel.child_token();
        let fail_fast = FailFast::new(&branch_cancel);

        progress.report(ProgressEvent::Transition(JobState::BranchesRunning));
        let (document, equations) = tokio::join!(
            fail_fast.watch(self.full_fidelity(job, &workspace, progress, &branch_cancel)),
            fail_fast.watch(self.math_only(job, root.as_deref(), &workspace, progress, &branch_cancel)),
        );

        progress.report(ProgressEvent::Transition(JobState::Joining));
        let (_, equations) = match join_outcomes(document, equations) {
            Ok(outputs) => outputs,
            Err(e) => {
                discard(workspace);
                return Err(e);
            }
        };

        progress.report(ProgressEvent::Transition(JobState::Merging));
        progress.report(ProgressEvent::Phase {
            stage: Stage::Merge,
            message: "Merging DOCX files".to_string(),
        });
        let finished = async {
            let merged = merge::merge(&self.settings, workspace.path(), cancel)
                .await
                .map_err(|e| PipelineError::new(Stage::Merge, e))?;
            move_file(&merged, job.output()).map_err(|e| PipelineError::new(Stage::Finalize, e))
        }
        .await;
        if let Err(e) = finished {
            discard(workspace);
            return Err(e);
        }

        let workdir = workspace.path().to_path_buf();
        let retained = workspace.is_retained();
        discard(workspace);

        Ok(ConversionReport {
            output: job.output().to_path_buf(),
            workdir,
            retained,
            equations,
            elapsed: started.elapsed(),
        })
    }

    /// Validates what can be known before anything runs. Returns the
    /// project root override from the compiler options.
    fn preflight(&self, job: &ConversionJob) -> Result<Option<PathBuf>, PipelineError> {
        let fail = |e: ConvertError| PipelineError::new(Stage::Preflight, e);

        if !job.input().is_file() {
            return Err(fail(ConvertError::io(
                job.input(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "input file not found"),
            )));
        }
        let root = processor::parse_root_option(job.typst_opts()).map_err(|e| fail(e.into()))?;
        self.exporter.preflight().map_err(fail)?;
        merge::locate_script(&self.settings).map_err(fail)?;
        Ok(root)
    }

    /// Branch A: compile with the preamble, then export the PDF to Word.
    async fn full_fidelity(
        &self,
        job: &ConversionJob,
        workspace: &Workspace,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, PipelineError> {
        let pdf = workspace.artifact(Artifact::Pdf);

        progress.report(ProgressEvent::Phase {
            stage: Stage::Compile,
            message: "Converting TYP -> PDF with Typst".to_string(),
        });
        typst::compile(&self.settings, job.input(), job.id(), job.typst_opts(), &pdf, cancel)
            .await
            .map_err(|e| PipelineError::new(Stage::Compile, e))?;

        progress.report(ProgressEvent::Phase {
            stage: Stage::Export,
            message: format!("Converting PDF -> DOCX ({})", self.exporter.name()),
        });
        self.exporter
            .render_to_word(&pdf, workspace.path(), cancel)
            .await
            .map_err(|e| PipelineError::new(Stage::Export, e))
    }

    /// Branch B: extract equations, then convert them with Pandoc.
    /// Returns the number of equations kept.
    async fn math_only(
        &self,
        job: &ConversionJob,
        root: Option<&Path>,
        workspace: &Workspace,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<usize, PipelineError> {
        progress.report(ProgressEvent::Phase {
            stage: Stage::Extract,
            message: "Extracting equations".to_string(),
        });
        let extracted = processor::extract(&self.settings, job.input(), root, cancel)
            .await
            .map_err(|e| PipelineError::new(Stage::Extract, e))?;
        let kept = extracted
            .iter()
            .filter(|eq| !processor::equations::is_empty_equation(eq))
            .count();
        pandoc::write_math_source(workspace.path(), &processor::math_document(&extracted))
            .map_err(|e| PipelineError::new(Stage::Extract, e))?;

        progress.report(ProgressEvent::Phase {
            stage: Stage::Convert,
            message: format!("Converting {} equations TYP -> DOCX with Pandoc", kept),
        });
        pandoc::convert(&self.settings, workspace.path(), cancel)
            .await
            .map_err(|e| PipelineError::new(Stage::Convert, e))?;
        Ok(kept)
    }
}

type BranchOutcome<T> = Result<T, (usize, PipelineError)>;

/// Numbers branch failures by completion and cancels the sibling on the
/// first one.
struct FailFast<'a> {
    token: &'a CancellationToken,
    failures: AtomicUsize,
}

impl<'a> FailFast<'a> {
    fn new(token: &'a CancellationToken) -> Self {
        Self {
            token,
            failures: AtomicUsize::new(0),
        }
    }

    async fn watch<T>(
        &self,
        branch: impl Future<Output = Result<T, PipelineError>>,
    ) -> BranchOutcome<T> {
        branch.await.map_err(|e| {
            let order = self.failures.fetch_add(1, Ordering::SeqCst);
            if order == 0 {
                debug!("{}; cancelling the other branch", e);
                self.token.cancel();
            }
            (order, e)
        })
    }
}

/// Fan-in: the earliest failure is primary, a later one is attached to it.
fn join_outcomes<A, B>(a: BranchOutcome<A>, b: BranchOutcome<B>) -> Result<(A, B), PipelineError> {
    match (a, b) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        (Err((_, e)), Ok(_)) | (Ok(_), Err((_, e))) => Err(e),
        (Err((first, x)), Err((second, y))) => {
            if first < second {
                Err(x.suppress(y))
            } else {
                Err(y.suppress(x))
            }
        }
    }
}

fn discard(workspace: Workspace) {
    if let Err(e) = workspace.release() {
        warn!("Failed to remove workspace: {}", e);
    }
}
