//! Error types for the progress engine

use std::io;
use std::path::PathBuf;

/// Errors surfaced by validation and filesystem operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Manual total override was not a positive integer
    #[error("Invalid total frames value: {0}")]
    InvalidTotalFrames(String),

    /// Watch target request carried no path
    #[error("No directory provided")]
    MissingDirectory,

    /// Watch directory did not exist and could not be created
    #[error("Directory could not be created: {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Watch directory exists but cannot be read
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Any other filesystem failure
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Wrap an I/O error for `path`, promoting permission failures
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::PermissionDenied {
            Error::PermissionDenied { path }
        } else {
            Error::Io { path, source }
        }
    }

    /// True for errors caused by bad caller input rather than the filesystem
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidTotalFrames(_) | Error::MissingDirectory | Error::NotADirectory(_)
        )
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;
