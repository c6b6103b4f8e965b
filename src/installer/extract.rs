//! Archive extraction and layout checks.
//!
//! Both functions are blocking and run inside `spawn_blocking`.

use crate::core::RelayError;
use anyhow::Result;
use std::fs::File;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extracts a zip archive into `dest`. Unreadable or corrupt archives fail
/// with [`RelayError::Extract`].
///
/// Entries whose names escape `dest` are rejected by the zip reader.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|e| RelayError::Extract {
        reason: format!("cannot open {}: {e}", archive.display()),
    })?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| RelayError::Extract {
        reason: e.to_string(),
    })?;

    std::fs::create_dir_all(dest).map_err(|e| RelayError::Extract {
        reason: format!("cannot create {}: {e}", dest.display()),
    })?;
    zip.extract(dest).map_err(|e| RelayError::Extract {
        reason: e.to_string(),
    })?;
    Ok(())
}

/// Finds the single regular file named `binary_name` under `root`.
///
/// Zero or several matches fail with [`RelayError::ArtifactLayout`].
pub fn locate_executable(root: &Path, binary_name: &str) -> Result<PathBuf> {
    let matches: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == binary_name)
        .map(walkdir::DirEntry::into_path)
        .collect();

    match <[PathBuf; 1]>::try_from(matches) {
        Ok([path]) => Ok(path),
        Err(matches) => Err(RelayError::ArtifactLayout {
            expected: binary_name.to_string(),
            found: matches.len(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::find_relay_error;
    use crate::test_utils::zip_with_files;
    use tempfile::TempDir;

    fn write_zip(temp: &TempDir, files: &[(&str, &[u8])]) -> PathBuf {
        let path = temp.path().join("artifact.zip");
        std::fs::write(&path, zip_with_files(files)).unwrap();
        path
    }

    #[test]
    fn test_extract_and_locate_nested_binary() {
        let temp = TempDir::new().unwrap();
        let archive = write_zip(
            &temp,
            &[
                ("relay-server_1.2.0/relay-server", b"bin".as_slice()),
                ("relay-server_1.2.0/README.md", b"doc".as_slice()),
            ],
        );
        let dest = temp.path().join("extract");

        extract_archive(&archive, &dest).unwrap();
        let exe = locate_executable(&dest, "relay-server").unwrap();

        assert_eq!(exe, dest.join("relay-server_1.2.0/relay-server"));
        assert_eq!(std::fs::read(exe).unwrap(), b"bin".as_slice());
    }

    #[test]
    fn test_corrupt_archive_is_extract_error() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("broken.zip");
        std::fs::write(&archive, b"definitely not a zip".as_slice()).unwrap();

        let err = extract_archive(&archive, &temp.path().join("extract")).unwrap_err();
        assert!(matches!(find_relay_error(&err), Some(RelayError::Extract { .. })));
    }

    #[test]
    fn test_missing_binary_is_layout_error() {
        let temp = TempDir::new().unwrap();
        let archive = write_zip(&temp, &[("other-tool", b"x".as_slice())]);
        let dest = temp.path().join("extract");
        extract_archive(&archive, &dest).unwrap();

        let err = locate_executable(&dest, "relay-server").unwrap_err();
        assert!(matches!(
            find_relay_error(&err),
            Some(RelayError::ArtifactLayout { found: 0, .. })
        ));
    }

    #[test]
    fn test_duplicate_binary_is_layout_error() {
        let temp = TempDir::new().unwrap();
        let archive = write_zip(
            &temp,
            &[("a/relay-server", b"1".as_slice()), ("b/relay-server", b"2".as_slice())],
        );
        let dest = temp.path().join("extract");
        extract_archive(&archive, &dest).unwrap();

        let err = locate_executable(&dest, "relay-server").unwrap_err();
        assert!(matches!(
            find_relay_error(&err),
            Some(RelayError::ArtifactLayout { found: 2, .. })
        ));
    }
}
