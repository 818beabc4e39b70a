//! Error types for notefs.

use thiserror::Error;

/// Result type alias using notefs' Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for notefs operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Filter or control string could not be parsed
    #[error("Invalid filter syntax: {0}")]
    InvalidFilterSyntax(String),

    /// Filter pattern failed to compile as a regular expression
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Note content uses a dialect without a front-matter template
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// Note creation or field update rejected before touching the index
    #[error("Invalid note: {0}")]
    InvalidNote(String),

    /// No live note carries this identifier
    #[error("Note not found: {0}")]
    NoteNotFound(String),

    /// Identifier already taken by a live note
    #[error("Duplicate identifier: {0}")]
    DuplicateIdentifier(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Error::InvalidPattern(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_filter_syntax() {
        let err = Error::InvalidFilterSyntax("unknown field 'foo'".to_string());
        assert_eq!(err.to_string(), "Invalid filter syntax: unknown field 'foo'");
    }

    #[test]
    fn test_error_display_note_not_found() {
        let err = Error::NoteNotFound("20240101T120000".to_string());
        assert_eq!(err.to_string(), "Note not found: 20240101T120000");
    }

    #[test]
    fn test_error_display_unsupported_file_type() {
        let err = Error::UnsupportedFileType(".rst".to_string());
        assert_eq!(err.to_string(), "Unsupported file type: .rst");
    }

    #[test]
    fn test_error_from_regex() {
        let re_err = regex::Regex::new("(unclosed").unwrap_err();
        let err: Error = re_err.into();
        assert!(matches!(err, Error::InvalidPattern(_)));
        assert!(err.to_string().starts_with("Invalid pattern:"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.to_string(), "I/O error: gone");
    }
}
