use std::path::{Path, PathBuf};

use log::info;

use super::launcher::Platform;
use crate::error::{ConvertError, Result};

/// Trusted function the injected script calls into.
pub const TRUSTED_FUNCTION: &str = include_str!("../../assets/typ2docx.js");

const SCRIPT_FILE_NAME: &str = "typ2docx.js";

/// Folder-level JavaScripts directory of the export application under `home`.
///
/// The application's support directory must already exist; its absence
/// means the application is not installed.
pub fn script_dir(platform: &Platform, home: &Path) -> Result<PathBuf> {
    let (support, rest): (PathBuf, &[&str]) = match platform {
        Platform::MacOs => (
            home.join("Library/Application Support/Adobe/Acrobat/DC"),
            &["JavaScripts"][..],
        ),
        Platform::Windows => (
            home.join("AppData").join("Roaming").join("Adobe").join("Acrobat"),
            &["Privileged", "DC", "JavaScripts"][..],
        ),
        Platform::Other(_) => return Err(platform.unsupported()),
    };

    if !support.is_dir() {
        return Err(ConvertError::ToolNotFound {
            tool: format!("Adobe Acrobat (no {})", support.display()),
        });
    }
    Ok(rest.iter().fold(support, |dir, part| dir.join(part)))
}

/// Writes the trusted function into the application's script directory
/// under `home` and returns the installed file.
pub fn install_into(platform: &Platform, home: &Path) -> Result<PathBuf> {
    let dir = script_dir(platform, home)?;
    std::fs::create_dir_all(&dir).map_err(|e| ConvertError::io(&dir, e))?;

    let target = dir.join(SCRIPT_FILE_NAME);
    std::fs::write(&target, TRUSTED_FUNCTION).map_err(|e| ConvertError::io(&target, e))?;
    info!("Installed trusted function to {}", target.display());
    Ok(target)
}

/// Installs the trusted function for the current user.
pub fn install_acrobat() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| ConvertError::Io {
        path: PathBuf::from("~"),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "home directory not found"),
    })?;
    install_into(&Platform::current(), &home)
}
