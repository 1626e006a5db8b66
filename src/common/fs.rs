//! File system helpers
//!
//! Used for CA artifacts and file-backed local mappings.

use std::fs;
use std::path::Path;

use super::error::{ProxyError, Result};

/// Check that `path` exists and is a regular file
///
/// # Parameters
///
/// * `path` - File path
///
/// # Returns
///
/// `Ok(())` if the file exists, otherwise a configuration error.
pub fn check_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(ProxyError::Config(format!(
            "File does not exist: {}",
            path.display()
        )));
    }

    if !path.is_file() {
        return Err(ProxyError::Config(format!(
            "Path is not a file: {}",
            path.display()
        )));
    }

    Ok(())
}

/// Read a whole file into memory
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    check_file_exists(path)?;

    Ok(fs::read(path)?)
}

/// Write `contents` to `path`, creating parent directories as needed
///
/// Existing files are left untouched; returns whether a file was written.
pub fn write_if_absent(path: &Path, contents: &[u8]) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    fs::write(path, contents)?;
    Ok(true)
}
