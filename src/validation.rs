// Runtime validation helpers shared across validated types and services.

use anyhow::{ensure, Result};

/// Validates a path is non-empty, reasonably short, free of directory
/// traversal segments, and contains no null bytes.
pub fn validate_relative_path(path: &str) -> Result<()> {
    ensure!(!path.is_empty(), "path cannot be empty");
    ensure!(path.len() < 4096, "path too long");
    ensure!(!path.contains('\0'), "path contains null byte");
    ensure!(
        !path.split(['/', '\\']).any(|segment| segment == ".."),
        "path contains directory traversal"
    );
    Ok(())
}

/// Validates a storage/data-directory path (must be non-empty and short;
/// unlike document paths it may legitimately be absolute).
pub fn validate_storage_path(path: &str) -> Result<()> {
    ensure!(!path.is_empty(), "storage path cannot be empty");
    ensure!(path.len() < 4096, "storage path too long");
    Ok(())
}
