//! 9P2000 data model: messages, qids, stat entries and protocol constants.

/// Protocol version string negotiated by `Tversion`.
pub const VERSION: &str = "9P2000";

/// Tag used by `Tversion`.
pub const NOTAG: u16 = u16::MAX;

/// Fid meaning "no fid" (e.g. the `afid` of an unauthenticated attach).
pub const NOFID: u32 = u32::MAX;

/// Maximum number of names in one `Twalk`.
pub const MAXWELEM: usize = 16;

/// Size of the frame header: size[4] type[1] tag[2].
pub const HEADER_SIZE: usize = 7;

/// Directory bit in a stat `mode`.
pub const DMDIR: u32 = 0x8000_0000;

/// Possible errors produced while encoding or decoding 9P messages.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    /// Input buffer was shorter than a field required.
    #[error("truncated frame")]
    Truncated,
    /// Unknown or unexpected message type.
    #[error("unsupported message type {0}")]
    Unsupported(u8),
    #[error("invalid utf8 in string field")]
    InvalidUtf8,
    /// Declared message size does not match the bytes present.
    #[error("length mismatch: declared {declared} actual {actual}")]
    LengthMismatch { declared: u32, actual: usize },
    /// Invalid walk component or too many of them.
    #[error("invalid path component")]
    InvalidPath,
    /// A string or payload exceeds what its length prefix can express.
    #[error("field too long: {0} bytes")]
    TooLong(usize),
}

/// Qid type bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QidType(u8);

impl QidType {
    pub const DIR: Self = Self(0x80);
    pub const APPEND: Self = Self(0x40);
    pub const FILE: Self = Self(0x00);

    pub fn from_raw(value: u8) -> Self {
        Self(value)
    }

    pub fn raw(self) -> u8 {
        self.0
    }

    pub fn is_dir(self) -> bool {
        self.0 & Self::DIR.0 != 0
    }
}

/// Server-unique identity of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Qid {
    pub ty: QidType,
    pub version: u32,
    pub path: u64,
}

impl Qid {
    pub fn new(ty: QidType, version: u32, path: u64) -> Self {
        Self { ty, version, path }
    }

    pub fn dir(path: u64) -> Self {
        Self::new(QidType::DIR, 0, path)
    }

    pub fn file(path: u64) -> Self {
        Self::new(QidType::FILE, 0, path)
    }

    pub fn is_dir(&self) -> bool {
        self.ty.is_dir()
    }
}

impl Default for Qid {
    fn default() -> Self {
        Self::file(0)
    }
}

/// Open mode byte of `Topen`/`Tcreate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode(u8);

impl OpenMode {
    pub const READ: Self = Self(0);
    pub const WRITE: Self = Self(1);
    pub const RDWR: Self = Self(2);
    pub const EXEC: Self = Self(3);
    /// Truncate flag, combined with an access mode.
    pub const TRUNC: u8 = 0x10;
    /// Remove-on-close flag.
    pub const RCLOSE: u8 = 0x40;

    pub fn from_raw(value: u8) -> Self {
        Self(value)
    }

    pub fn raw(self) -> u8 {
        self.0
    }

    /// Same access mode with the truncate flag set.
    pub fn truncate(self) -> Self {
        Self(self.0 | Self::TRUNC)
    }

    /// Access bits (`READ`, `WRITE`, `RDWR` or `EXEC`).
    pub fn access(self) -> u8 {
        self.0 & 0x03
    }

    pub fn can_read(self) -> bool {
        matches!(self.access(), 0 | 2 | 3)
    }

    pub fn can_write(self) -> bool {
        matches!(self.access(), 1 | 2)
    }
}

/// One directory entry as returned by `Rstat` and directory reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stat {
    pub typ: u16,
    pub dev: u32,
    pub qid: Qid,
    pub mode: u32,
    pub atime: u32,
    pub mtime: u32,
    pub length: u64,
    pub name: String,
    pub uid: String,
    pub gid: String,
    pub muid: String,
}

impl Stat {
    pub fn is_dir(&self) -> bool {
        self.mode & DMDIR != 0
    }
}

/// Client request with its tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub tag: u16,
    pub body: RequestBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Version {
        msize: u32,
        version: String,
    },
    Auth {
        afid: u32,
        uname: String,
        aname: String,
    },
    Attach {
        fid: u32,
        afid: u32,
        uname: String,
        aname: String,
    },
    Flush {
        oldtag: u16,
    },
    Walk {
        fid: u32,
        newfid: u32,
        wnames: Vec<String>,
    },
    Open {
        fid: u32,
        mode: OpenMode,
    },
    Create {
        fid: u32,
        name: String,
        perm: u32,
        mode: OpenMode,
    },
    Read {
        fid: u32,
        offset: u64,
        count: u32,
    },
    Write {
        fid: u32,
        offset: u64,
        data: Vec<u8>,
    },
    Clunk {
        fid: u32,
    },
    Remove {
        fid: u32,
    },
    Stat {
        fid: u32,
    },
    Wstat {
        fid: u32,
        stat: Stat,
    },
}

impl RequestBody {
    /// Short lowercase name for logs (`walk`, `read`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Version { .. } => "version",
            Self::Auth { .. } => "auth",
            Self::Attach { .. } => "attach",
            Self::Flush { .. } => "flush",
            Self::Walk { .. } => "walk",
            Self::Open { .. } => "open",
            Self::Create { .. } => "create",
            Self::Read { .. } => "read",
            Self::Write { .. } => "write",
            Self::Clunk { .. } => "clunk",
            Self::Remove { .. } => "remove",
            Self::Stat { .. } => "stat",
            Self::Wstat { .. } => "wstat",
        }
    }
}

/// Server response with the tag of the request it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub tag: u16,
    pub body: ResponseBody,
}

impl Response {
    pub fn new(tag: u16, body: ResponseBody) -> Self {
        Self { tag, body }
    }

    pub fn error(tag: u16, ename: impl Into<String>) -> Self {
        Self::new(tag, ResponseBody::Error { ename: ename.into() })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    Version { msize: u32, version: String },
    Auth { aqid: Qid },
    Attach { qid: Qid },
    Error { ename: String },
    Flush,
    Walk { qids: Vec<Qid> },
    Open { qid: Qid, iounit: u32 },
    Create { qid: Qid, iounit: u32 },
    Read { data: Vec<u8> },
    Write { count: u32 },
    Clunk,
    Remove,
    Stat { stat: Stat },
    Wstat,
}
