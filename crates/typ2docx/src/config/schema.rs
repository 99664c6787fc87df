use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Backend used for the "render to Word" step of the full-fidelity branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Cloud export API, authenticated with credentials from the environment.
    Cloud,
    /// Desktop application automation with a loopback callback.
    Desktop,
}

impl FromStr for EngineKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cloud" | "pdfservices" => Ok(EngineKind::Cloud),
            "desktop" | "acrobat" => Ok(EngineKind::Desktop),
            other => Err(ConfigError::UnknownEngine(other.to_string())),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Cloud => write!(f, "cloud"),
            EngineKind::Desktop => write!(f, "desktop"),
        }
    }
}

/// Where the equation extractor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerFlavor {
    /// Blocking thread pool inside this process.
    #[default]
    Thread,
    /// A child process running this executable's `extract` subcommand.
    Process,
}

impl FromStr for WorkerFlavor {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thread" => Ok(WorkerFlavor::Thread),
            "process" => Ok(WorkerFlavor::Process),
            other => Err(ConfigError::InvalidEnv {
                name: super::loader::ENV_EXTRACT_WORKER.to_string(),
                value: other.to_string(),
                expected: "worker flavor (thread|process)".to_string(),
            }),
        }
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay to sleep before `attempt` (1-based). The first attempt never waits.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            Duration::ZERO
        } else {
            self.base_delay
                .saturating_mul(1u32 << (attempt - 2).min(16))
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_millis(250),
        }
    }
}

/// Runtime settings shared by every job of one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Typst compiler executable.
    pub typst: PathBuf,
    /// Pandoc executable.
    pub pandoc: PathBuf,
    /// Merge script; `None` means "next to the running executable".
    pub merge_script: Option<PathBuf>,
    /// Executable re-invoked for the process worker flavor.
    pub self_exe: Option<PathBuf>,
    pub extract_worker: WorkerFlavor,
    pub callback_timeout: Duration,
    pub export_timeout: Duration,
    /// Poll interval for the cloud export job status.
    pub poll_interval: Duration,
    /// Warm-up delay after cold-starting the desktop application.
    pub warmup_delay: Duration,
    pub result_retry: RetryPolicy,
    pub cloud_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            typst: PathBuf::from("typst"),
            pandoc: PathBuf::from("pandoc"),
            merge_script: None,
            self_exe: None,
            extract_worker: WorkerFlavor::Thread,
            callback_timeout: Duration::from_secs(120),
            export_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(2),
            warmup_delay: Duration::from_secs(5),
            result_retry: RetryPolicy::default(),
            cloud_base_url: "https://pdf-services.adobe.io".to_string(),
        }
    }
}

impl Settings {
    /// Resolves the merge script, falling back to the platform default
    /// beside the running executable.
    pub fn merge_script_path(&self) -> PathBuf {
        if let Some(path) = &self.merge_script {
            return path.clone();
        }
        let name = if cfg!(windows) { "merge.ps1" } else { "merge.sh" };
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(name)))
            .unwrap_or_else(|| PathBuf::from(name))
    }
}
