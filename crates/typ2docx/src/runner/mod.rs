//! Uniform launching of external programs and in-process work.
//!
//! Everything the pipeline waits on goes through [`run`]: an external
//! [`Program`], a blocking closure on the thread pool ([`InProcess`]), or a
//! child process whose JSON output is decoded ([`JsonProgram`]). Every
//! launchable observes the job's [`CancellationToken`]; a cancelled child
//! process is killed and reaped before `Cancelled` is returned.

pub mod program;
pub mod worker;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::{ConvertError, Result};

pub use program::{Program, ProgramOutput};
pub use worker::{InProcess, JsonProgram};

#[async_trait]
pub trait Launchable: Send + Sized {
    type Output: Send;

    /// Short name used in spans and diagnostics.
    fn describe(&self) -> String;

    async fn launch(self, cancel: &CancellationToken) -> Result<Self::Output>;
}

/// Launches `target` and waits for its outcome.
pub async fn run<L: Launchable>(target: L, cancel: &CancellationToken) -> Result<L::Output> {
    if cancel.is_cancelled() {
        return Err(ConvertError::Cancelled);
    }
    let span = tracing::debug_span!("runner.run", target = %target.describe());
    target.launch(cancel).instrument(span).await
}
