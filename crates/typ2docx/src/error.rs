use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Required tool '{tool}' was not found")]
    ToolNotFound { tool: String },

    #[error("{tool} exited with code {exit_code} (args: {}){}", .args.join(" "), stderr_suffix(.stderr))]
    ExternalToolFailure {
        tool: String,
        exit_code: i32,
        args: Vec<String>,
        stderr: String,
    },

    #[error("{tool} did not finish within {}s", .after.as_secs())]
    Timeout { tool: String, after: Duration },

    #[error("Missing credentials: {} must be set in the environment", .missing.join(" and "))]
    MissingCredentials { missing: Vec<String> },

    #[error("Export service error: {detail}")]
    ExportServiceError { detail: String },

    #[error("No callback received within {}s", .waited.as_secs())]
    CallbackTimeout { waited: Duration },

    #[error("Invalid callback payload '{payload}': {reason}")]
    InvalidCallbackPayload { payload: String, reason: String },

    #[error("Result file '{path}' did not appear after {attempts} attempts")]
    ResultFileMissing { path: PathBuf, attempts: u32 },

    #[error("Permission denied: '{path}' is not writable")]
    PermissionDenied { path: PathBuf },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to inject export script into '{path}': {reason}")]
    ScriptInjection { path: PathBuf, reason: String },

    #[error("Equation extraction failed: {0}")]
    Extraction(String),

    #[error("Worker '{task}' failed: {reason}")]
    WorkerFailed { task: String, reason: String },

    #[error("Operation cancelled")]
    Cancelled,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown export engine '{0}' (expected 'cloud' or 'desktop')")]
    UnknownEngine(String),

    #[error("Option '{option}' requires a value")]
    MissingOptionValue { option: String },

    #[error("Environment variable {name}='{value}' is not a valid {expected}")]
    InvalidEnv {
        name: String,
        value: String,
        expected: String,
    },

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

impl ConvertError {
    /// Wraps an I/O error, promoting `PermissionDenied` to its own variant.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            ConvertError::PermissionDenied { path }
        } else {
            ConvertError::Io { path, source }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConvertError::Cancelled)
    }
}

/// Collapses runs of whitespace, line breaks included, into single spaces.
pub(crate) fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn stderr_suffix(stderr: &str) -> String {
    match stderr.trim().lines().last() {
        Some(line) if !line.is_empty() => format!(": {}", line),
        _ => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;
