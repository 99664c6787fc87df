use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command as TokioCommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::Launchable;
use crate::error::{ConvertError, Result};

/// An external executable with its arguments.
#[derive(Debug, Clone)]
pub struct Program {
    program: PathBuf,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    env: Vec<(OsString, OsString)>,
    timeout: Option<Duration>,
}

/// Captured streams of a successful run.
#[derive(Debug, Default)]
pub struct ProgramOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProgramOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

impl Program {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.env
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Kills the process and fails with `Timeout` once `limit` elapses.
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Tool name for diagnostics: the executable's file name without extension.
    pub fn tool_name(&self) -> String {
        self.program
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("<program>")
            .to_string()
    }

    fn display_args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn spawn(&self) -> Result<Child> {
        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so termination also reaches the tool's helpers.
        #[cfg(unix)]
        cmd.process_group(0);

        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        debug!(
            "Spawning {} {}",
            self.program.display(),
            self.display_args().join(" ")
        );

        cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConvertError::ToolNotFound {
                tool: self.program.display().to_string(),
            },
            _ => ConvertError::io(&self.program, e),
        })
    }
}

#[async_trait]
impl Launchable for Program {
    type Output = ProgramOutput;

    fn describe(&self) -> String {
        self.tool_name()
    }

    async fn launch(self, cancel: &CancellationToken) -> Result<ProgramOutput> {
        let mut child = self.spawn()?;

        let stdout_task = tokio::spawn(read_pipe(child.stdout.take()));
        let stderr_task = tokio::spawn(read_pipe(child.stderr.take()));

        let limit = self.timeout;
        let deadline = async move {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let status = tokio::select! {
            status = child.wait() => status.map_err(|e| ConvertError::io(&self.program, e))?,
            _ = cancel.cancelled() => {
                terminate(&mut child, &self.tool_name()).await;
                return Err(ConvertError::Cancelled);
            }
            _ = deadline => {
                terminate(&mut child, &self.tool_name()).await;
                return Err(ConvertError::Timeout {
                    tool: self.tool_name(),
                    after: limit.unwrap_or_default(),
                });
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if status.success() {
            Ok(ProgramOutput { stdout, stderr })
        } else {
            Err(ConvertError::ExternalToolFailure {
                tool: self.tool_name(),
                exit_code: status.code().unwrap_or(-1),
                args: self.display_args(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            })
        }
    }
}

async fn read_pipe<R>(pipe: Option<R>) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut collected = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut collected).await {
            debug!("Failed to drain child pipe: {}", e);
        }
    }
    collected
}

/// Kills the child together with everything it started, then reaps it so
/// no orphan survives the pipeline.
async fn terminate(child: &mut Child, tool: &str) {
    debug!("Terminating {}", tool);
    if let Some(pid) = child.id() {
        kill_tree(pid, tool).await;
    }
    if let Err(e) = child.kill().await {
        warn!("Failed to kill {}: {}", tool, e);
    }
}

#[cfg(unix)]
async fn kill_tree(pid: u32, tool: &str) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: killpg has no memory-safety preconditions. The group id is the
    // child's pid, which stays reserved until the child is reaped below.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        debug!(
            "Failed to kill process group of {}: {}",
            tool,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(windows)]
async fn kill_tree(pid: u32, tool: &str) {
    let status = TokioCommand::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = status {
        debug!("Failed to kill process tree of {}: {}", tool, e);
    }
}

#[cfg(not(any(unix, windows)))]
async fn kill_tree(_pid: u32, _tool: &str) {}
