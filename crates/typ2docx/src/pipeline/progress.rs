use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info};

use super::error::Stage;

/// Lifecycle of one job. `Failed` is reachable from every other
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Init,
    BranchesRunning,
    Joining,
    Merging,
    Done,
    Failed,
}

/// Events emitted by the pipeline while a job runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Transition(JobState),
    Phase { stage: Stage, message: String },
    Completed { output: PathBuf, elapsed: Duration },
    Failed { error: String },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Writes progress to the log.
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Transition(state) => debug!("Job state: {:?}", state),
            ProgressEvent::Phase { stage, message } => info!(%stage, "{}", message),
            ProgressEvent::Completed { output, elapsed } => {
                info!(
                    "Wrote {} in {:.1}s",
                    output.display(),
                    elapsed.as_secs_f64()
                )
            }
            ProgressEvent::Failed { error } => debug!("Job failed: {}", error),
        }
    }
}
