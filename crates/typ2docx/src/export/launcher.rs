//! Platform mechanics for driving the desktop export application.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{ConfigError, ConvertError, Result};
use crate::runner::{self, Program};

const APP_NAME: &str = "Adobe Acrobat";

/// Operating systems the desktop backend knows how to automate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Windows,
    Other(String),
}

impl Platform {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "macos" => Platform::MacOs,
            "windows" => Platform::Windows,
            other => Platform::Other(other.to_string()),
        }
    }

    pub fn unsupported(&self) -> ConvertError {
        ConvertError::Config(ConfigError::UnsupportedPlatform(format!(
            "{} export is only supported on macOS and Windows (running on {})",
            APP_NAME, self
        )))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::MacOs => write!(f, "macos"),
            Platform::Windows => write!(f, "windows"),
            Platform::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Starts the export application and hands it documents.
#[async_trait]
pub trait AppLauncher: Send + Sync {
    /// Fails fast when this launcher cannot work on the current machine.
    fn preflight(&self) -> Result<()> {
        Ok(())
    }

    /// Starts the application (or leaves it running) and reports whether it
    /// was already running beforehand.
    async fn launch_or_focus(&self, cancel: &CancellationToken) -> Result<bool>;

    /// Opens `document` in the running application.
    async fn open(&self, document: &Path, cancel: &CancellationToken) -> Result<()>;
}

/// Picks the launcher for the platform this binary runs on.
pub fn platform_launcher() -> Arc<dyn AppLauncher> {
    match Platform::current() {
        Platform::MacOs => Arc::new(MacLauncher),
        Platform::Windows => Arc::new(WindowsLauncher),
        other => Arc::new(UnsupportedLauncher { platform: other }),
    }
}

/// A failing launch command means the application is not installed.
fn app_missing(e: ConvertError) -> ConvertError {
    match e {
        ConvertError::ExternalToolFailure { .. } | ConvertError::ToolNotFound { .. } => {
            log::debug!("Launch command failed: {}", e);
            ConvertError::ToolNotFound {
                tool: APP_NAME.to_string(),
            }
        }
        other => other,
    }
}

pub struct MacLauncher;

impl MacLauncher {
    fn open_command() -> Program {
        Program::new("open").args(["-g", "-a", APP_NAME])
    }
}

#[async_trait]
impl AppLauncher for MacLauncher {
    async fn launch_or_focus(&self, cancel: &CancellationToken) -> Result<bool> {
        let probe = Program::new("osascript").args([
            "-e",
            "tell application \"System Events\" to return (name of processes) contains \"AdobeAcrobat\"",
        ]);
        let running = runner::run(probe, cancel).await?.stdout_text().trim() == "true";
        log::debug!("{} already running: {}", APP_NAME, running);

        runner::run(Self::open_command(), cancel)
            .await
            .map_err(app_missing)?;
        Ok(running)
    }

    async fn open(&self, document: &Path, cancel: &CancellationToken) -> Result<()> {
        runner::run(Self::open_command().arg(document), cancel)
            .await
            .map_err(app_missing)?;
        Ok(())
    }
}

pub struct WindowsLauncher;

impl WindowsLauncher {
    fn start_process(argument: &str) -> Program {
        let command = format!(
            "Start-Process acrobat -WindowStyle Minimized -ArgumentList {}",
            argument
        );
        Program::new("powershell").args(["-NoProfile", "-Command", command.as_str()])
    }
}

#[async_trait]
impl AppLauncher for WindowsLauncher {
    async fn launch_or_focus(&self, cancel: &CancellationToken) -> Result<bool> {
        let probe = Program::new("powershell").args([
            "-NoProfile",
            "-Command",
            "(Get-Process -Name Acrobat -ErrorAction SilentlyContinue | Measure-Object).Count",
        ]);
        let count: u32 = runner::run(probe, cancel)
            .await?
            .stdout_text()
            .trim()
            .parse()
            .unwrap_or(0);
        log::debug!("{} processes running: {}", APP_NAME, count);

        runner::run(Self::start_process("/n"), cancel)
            .await
            .map_err(app_missing)?;
        Ok(count > 0)
    }

    async fn open(&self, document: &Path, cancel: &CancellationToken) -> Result<()> {
        let quoted = format!("'\"{}\"'", document.display().to_string().replace('\'', "''"));
        runner::run(Self::start_process(&quoted), cancel)
            .await
            .map_err(app_missing)?;
        Ok(())
    }
}

pub struct UnsupportedLauncher {
    pub platform: Platform,
}

#[async_trait]
impl AppLauncher for UnsupportedLauncher {
    fn preflight(&self) -> Result<()> {
        Err(self.platform.unsupported())
    }

    async fn launch_or_focus(&self, _cancel: &CancellationToken) -> Result<bool> {
        Err(self.platform.unsupported())
    }

    async fn open(&self, _document: &Path, _cancel: &CancellationToken) -> Result<()> {
        Err(self.platform.unsupported())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_platform_matches_os() {
        let platform = Platform::current();
        assert_eq!(platform.to_string(), std::env::consts::OS);
    }

    #[tokio::test]
    async fn test_unsupported_launcher_fails_everywhere() {
        let launcher = UnsupportedLauncher {
            platform: Platform::Other("plan9".to_string()),
        };
        let cancel = CancellationToken::new();

        assert!(matches!(
            launcher.preflight(),
            Err(ConvertError::Config(ConfigError::UnsupportedPlatform(_)))
        ));
        assert!(launcher.launch_or_focus(&cancel).await.is_err());
        assert!(launcher
            .open(Path::new("a-injected.pdf"), &cancel)
            .await
            .is_err());
    }

    #[test]
    fn test_failed_launch_maps_to_missing_app() {
        let failure = ConvertError::ExternalToolFailure {
            tool: "open".to_string(),
            exit_code: 1,
            args: vec![],
            stderr: "Unable to find application named 'Adobe Acrobat'".to_string(),
        };
        match app_missing(failure) {
            ConvertError::ToolNotFound { tool } => assert_eq!(tool, APP_NAME),
            other => panic!("Expected ToolNotFound, got {:?}", other),
        }
        assert!(matches!(
            app_missing(ConvertError::Cancelled),
            ConvertError::Cancelled
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_gets_unsupported_launcher() {
        assert!(platform_launcher().preflight().is_err());
    }
}
