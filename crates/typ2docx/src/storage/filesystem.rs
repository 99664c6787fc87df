use std::path::Path;

use crate::error::{ConvertError, Result};

/// Move a file from `src` to `dst`. Uses `rename` first (atomic on the same
/// filesystem) and falls back to copy + delete, which covers moves across
/// devices such as from the system temp dir to the user's project.
pub fn move_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConvertError::io(parent, e))?;
    }

    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    std::fs::copy(src, dst).map_err(|e| ConvertError::io(src, e))?;
    std::fs::remove_file(src).map_err(|e| ConvertError::io(src, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_into_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("c.docx");
        std::fs::write(&src, b"docx").unwrap();

        let dst = dir.path().join("out").join("nested").join("main.docx");
        move_file(&src, &dst).unwrap();

        assert!(!src.exists());
        assert_eq!(std::fs::read(&dst).unwrap(), b"docx");
    }

    #[test]
    fn test_move_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("new.docx");
        let dst = dir.path().join("old.docx");
        std::fs::write(&src, b"new").unwrap();
        std::fs::write(&dst, b"old").unwrap();

        move_file(&src, &dst).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"new");
    }

    #[test]
    fn test_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = move_file(&dir.path().join("absent"), &dir.path().join("dst"));
        assert!(result.is_err());
    }
}
