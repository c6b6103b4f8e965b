//! Atomic file placement using the temp-and-rename strategy.
//!
//! Every write lands in a fresh temp file in the destination directory, is
//! synced, and is then renamed over the destination. A concurrent reader
//! sees either the old inode or the complete new one, never a truncated
//! file. A process executing the old binary keeps its inode after the
//! rename.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

fn parent_dir(path: &Path) -> Result<&Path> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    Ok(parent)
}

/// Writes `content` to `path` atomically.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = parent_dir(path)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    temp.write_all(content)
        .with_context(|| format!("Failed to write temp file for {}", path.display()))?;
    temp.as_file().sync_all().context("Failed to sync file to disk")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // NamedTempFile defaults to 0600; plain records are world-readable.
        fs::set_permissions(temp.path(), fs::Permissions::from_mode(0o644))
            .context("Failed to set file permissions")?;
    }

    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;
    Ok(())
}

/// Copies the executable at `source` into place at `target` atomically and
/// marks it `0755`.
pub fn place_executable(source: &Path, target: &Path) -> Result<()> {
    let dir = parent_dir(target)?;

    let mut temp = tempfile::Builder::new()
        .prefix(".relayctl-")
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;

    let mut src = fs::File::open(source)
        .with_context(|| format!("Failed to open {}", source.display()))?;
    std::io::copy(&mut src, temp.as_file_mut())
        .with_context(|| format!("Failed to copy {} into {}", source.display(), dir.display()))?;
    temp.as_file().sync_all().context("Failed to sync executable to disk")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(temp.path(), fs::Permissions::from_mode(0o755))
            .context("Failed to mark executable")?;
    }

    temp.persist(target)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to move executable into {}", target.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_creates_parent() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("deep").join("nested").join("record");

        atomic_write(&file, b"v1.0.0\n").unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "v1.0.0\n");
    }

    #[test]
    fn test_atomic_write_overwrites() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("record");

        atomic_write(&file, b"initial").unwrap();
        atomic_write(&file, b"updated").unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "updated");
    }

    #[cfg(unix)]
    #[test]
    fn test_place_executable_replaces_inode() {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};

        let temp = tempdir().unwrap();
        let source = temp.path().join("new");
        let target = temp.path().join("bin").join("relay-server");
        std::fs::write(&source, b"new binary").unwrap();
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(&target, b"old binary").unwrap();
        let old_inode = std::fs::metadata(&target).unwrap().ino();

        place_executable(&source, &target).unwrap();

        let meta = std::fs::metadata(&target).unwrap();
        assert_ne!(meta.ino(), old_inode);
        assert_eq!(meta.permissions().mode() & 0o777, 0o755);
        assert_eq!(std::fs::read(&target).unwrap(), b"new binary");
    }

    #[test]
    fn test_place_executable_missing_source_leaves_target() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("relay-server");
        std::fs::write(&target, b"old binary").unwrap();

        let result = place_executable(&temp.path().join("absent"), &target);
        assert!(result.is_err());
        assert_eq!(std::fs::read(&target).unwrap(), b"old binary");

        let leftovers: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".relayctl-"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
