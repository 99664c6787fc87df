use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Launchable, Program};
use crate::error::{ConvertError, Result};

/// A blocking closure dispatched to tokio's blocking thread pool.
///
/// Cancellation stops the wait immediately; the closure itself cannot be
/// interrupted and its result is discarded when it eventually returns.
pub struct InProcess<F> {
    name: String,
    func: F,
}

impl<F> InProcess<F> {
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F, T> Launchable for InProcess<F>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn launch(self, cancel: &CancellationToken) -> Result<T> {
        let mut handle = tokio::task::spawn_blocking(self.func);

        tokio::select! {
            joined = &mut handle => joined.map_err(|e| ConvertError::WorkerFailed {
                task: self.name.clone(),
                reason: if e.is_panic() {
                    "worker panicked".to_string()
                } else {
                    e.to_string()
                },
            })?,
            _ = cancel.cancelled() => {
                debug!("Abandoning blocking worker '{}'", self.name);
                handle.abort();
                Err(ConvertError::Cancelled)
            }
        }
    }
}

/// A child process whose standard output is a JSON document of type `T`.
///
/// Used for collaborators that are not safe to run concurrently inside this
/// process: the work happens in a separate process and only the decoded
/// result crosses back.
pub struct JsonProgram<T> {
    program: Program,
    _output: PhantomData<fn() -> T>,
}

impl<T> JsonProgram<T> {
    pub fn new(program: Program) -> Self {
        Self {
            program,
            _output: PhantomData,
        }
    }
}

#[async_trait]
impl<T> Launchable for JsonProgram<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Output = T;

    fn describe(&self) -> String {
        self.program.describe()
    }

    async fn launch(self, cancel: &CancellationToken) -> Result<T> {
        let task = self.program.tool_name();
        let output = self.program.launch(cancel).await?;
        serde_json::from_slice(&output.stdout).map_err(|e| ConvertError::WorkerFailed {
            task,
            reason: format!("invalid JSON output: {}", e),
        })
    }
}
