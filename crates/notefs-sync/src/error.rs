//! Error types for notefs-sync.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while applying one event or one saved file.
///
/// None of them stop the daemon: the failing note is logged and skipped.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A resolved path lies outside the notes directory.
    #[error("Path escapes notes directory: {}", .0.display())]
    PathEscapesBase(PathBuf),

    /// The target of a rename or creation already exists.
    #[error("Refusing to overwrite {}", .0.display())]
    RenameCollision(PathBuf),

    /// The note has no file on disk yet.
    #[error("Note {0} has no path")]
    MissingPath(String),

    #[error(transparent)]
    Core(#[from] notefs_core::Error),

    #[error("Server: {0}")]
    Client(#[from] notefs_proto::ClientError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = SyncError::PathEscapesBase(PathBuf::from("/etc/passwd"));
        assert_eq!(err.to_string(), "Path escapes notes directory: /etc/passwd");
        let err = SyncError::MissingPath("20240101T000000".to_string());
        assert_eq!(err.to_string(), "Note 20240101T000000 has no path");
    }

    #[test]
    fn test_core_error_is_transparent() {
        let err: SyncError = notefs_core::Error::UnsupportedFileType(".pdf".to_string()).into();
        assert_eq!(err.to_string(), "Unsupported file type: .pdf");
    }
}
