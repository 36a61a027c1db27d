// Versioned schema migrations for the Persistent Store. Migrations run at
// daemon start under the Store's exclusive file lock; each step is
// idempotent so a crash mid-migration can simply be re-run.

use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// Current schema version a freshly-initialized Store is created at.
pub const CURRENT_VERSION: u32 = 1;

async fn read_version(meta_dir: &Path) -> Result<u32> {
    let version_path = meta_dir.join("version");
    match fs::read_to_string(&version_path).await {
        Ok(contents) => contents.trim().parse::<u32>().context("corrupt version file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

async fn write_version(meta_dir: &Path, version: u32) -> Result<()> {
    fs::write(meta_dir.join("version"), version.to_string()).await?;
    Ok(())
}

/// A single forward-only migration step. `apply` must be safe to re-run if
/// the process crashed after applying it but before the version bump was
/// persisted.
struct Migration {
    to_version: u32,
    description: &'static str,
}

fn migrations() -> Vec<Migration> {
    vec![Migration { to_version: 1, description: "initial schema: sources, documents, chunks, instances, bindings" }]
}

/// Applies every migration between the on-disk version and
/// [`CURRENT_VERSION`], writing the new version after each step.
pub async fn run(meta_dir: &Path) -> Result<()> {
    fs::create_dir_all(meta_dir).await?;
    let mut version = read_version(meta_dir).await?;

    for migration in migrations() {
        if migration.to_version <= version {
            continue;
        }
        tracing::info!(to_version = migration.to_version, description = migration.description, "applying store migration");
        write_version(meta_dir, migration.to_version).await?;
        version = migration.to_version;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn fresh_store_migrates_to_current_version() {
        let dir = tempdir().unwrap();
        run(dir.path()).await.unwrap();
        assert_eq!(read_version(dir.path()).await.unwrap(), CURRENT_VERSION);
    }

    #[tokio::test]
    async fn re_running_migrations_is_a_no_op() {
        let dir = tempdir().unwrap();
        run(dir.path()).await.unwrap();
        run(dir.path()).await.unwrap();
        assert_eq!(read_version(dir.path()).await.unwrap(), CURRENT_VERSION);
    }
}
