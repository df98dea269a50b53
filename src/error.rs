//! Error types for the tailing engine.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for tailing operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Transient I/O errors when reading or stating the tracked file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File watching errors from the notify crate.
    #[error("File watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// The target file does not exist when the session starts.
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The file existed but can no longer be stated or opened.
    #[error("File became unreadable: {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Rejected tailing options.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The session task has stopped and no longer accepts commands.
    #[error("Session closed")]
    SessionClosed,
}

impl Error {
    /// Maps an I/O failure at session start, turning a missing file into `NotFound`.
    pub(crate) fn at_start(path: &std::path::Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            Error::Io(err)
        }
    }
}

/// A convenient Result type for tailing operations.
pub type Result<T> = std::result::Result<T, Error>;
