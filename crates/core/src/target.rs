//! The directory currently being watched

use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// A resolved, readable watch directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    path: PathBuf,
}

impl WatchTarget {
    /// Resolve `path`, creating the directory if it does not exist yet
    pub fn prepare(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::MissingDirectory);
        }

        if !path.exists() {
            info!("Directory does not exist, creating: {}", path.display());
            fs::create_dir_all(path).map_err(|source| {
                if source.kind() == io::ErrorKind::PermissionDenied {
                    Error::PermissionDenied {
                        path: path.to_path_buf(),
                    }
                } else {
                    Error::CreateDirectory {
                        path: path.to_path_buf(),
                        source,
                    }
                }
            })?;
        }

        let resolved = fs::canonicalize(path).map_err(|e| Error::io(path, e))?;
        if !resolved.is_dir() {
            return Err(Error::NotADirectory(resolved));
        }

        // Readability check; the listing itself is discarded
        fs::read_dir(&resolved).map_err(|e| Error::io(&resolved, e))?;

        Ok(Self { path: resolved })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_prepare_creates_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("shots/sh010/render");

        let target = WatchTarget::prepare(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(target.path(), fs::canonicalize(&nested).unwrap());
    }

    #[test]
    fn test_prepare_rejects_empty_path() {
        assert!(matches!(
            WatchTarget::prepare(""),
            Err(Error::MissingDirectory)
        ));
    }

    #[test]
    fn test_prepare_rejects_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("frame_0001.png");
        fs::write(&file, b"x").unwrap();

        assert!(matches!(
            WatchTarget::prepare(&file),
            Err(Error::NotADirectory(_))
        ));
    }

    #[test]
    fn test_prepare_fails_when_parent_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("blocker");
        fs::write(&file, b"x").unwrap();

        let result = WatchTarget::prepare(file.join("render"));
        assert!(matches!(result, Err(Error::CreateDirectory { .. })));
    }
}
