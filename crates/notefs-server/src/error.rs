//! Protocol-level errors. Each maps to the string of one `Rerror`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, NinepError>;

#[derive(Error, Debug)]
pub enum NinepError {
    #[error("unknown fid {0}")]
    UnknownFid(u32),

    #[error("fid {0} already in use")]
    FidInUse(u32),

    #[error("file does not exist")]
    NotFound,

    #[error("fid already open")]
    AlreadyOpen,

    #[error("fid not open")]
    NotOpen,

    #[error("cannot walk an open fid")]
    WalkOpenFid,

    #[error("not a directory")]
    NotDirectory,

    #[error("permission denied")]
    PermissionDenied,

    #[error("authentication not required")]
    AuthNotRequired,

    #[error("operation not supported")]
    NotSupported,

    #[error("interrupted")]
    Interrupted,

    #[error("bad control message: {0}")]
    BadControl(String),

    #[error("msize {0} too small")]
    MsizeTooSmall(u32),

    #[error("write is not valid utf-8")]
    InvalidUtf8,

    #[error("{0}")]
    Codec(#[from] notefs_proto::CodecError),

    /// Rejected by the note layer (filter syntax, tag grammar, ...).
    #[error("{0}")]
    Note(#[from] notefs_core::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_errors_keep_their_message() {
        let err: NinepError =
            notefs_core::Error::InvalidFilterSyntax("unknown field 'x'".to_string()).into();
        assert_eq!(err.to_string(), "Invalid filter syntax: unknown field 'x'");
    }

    #[test]
    fn test_protocol_messages_are_short() {
        assert_eq!(NinepError::UnknownFid(7).to_string(), "unknown fid 7");
        assert_eq!(NinepError::NotFound.to_string(), "file does not exist");
    }
}
