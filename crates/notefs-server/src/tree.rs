//! The virtual file tree.
//!
//! ```text
//! /
//!   ctl  index  new  event
//!   n/
//!     <identifier>/
//!       path  title  keywords  ctl
//! ```
//!
//! Note positions carry a [`NoteHandle`], so a fid held across a deletion
//! resolves to nothing rather than to another note.

use notefs_core::{NoteHandle, NoteIndex};
use notefs_proto::{OpenMode, Qid, Stat, DMDIR};

/// Name of the directory holding one subdirectory per note.
pub const NOTES_DIR_NAME: &str = "n";

/// File inside a note directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteField {
    Path,
    Title,
    Keywords,
    Ctl,
}

impl NoteField {
    pub const ALL: [NoteField; 4] = [Self::Path, Self::Title, Self::Keywords, Self::Ctl];

    pub fn name(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Title => "title",
            Self::Keywords => "keywords",
            Self::Ctl => "ctl",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    fn code(self) -> u64 {
        match self {
            Self::Path => 1,
            Self::Title => 2,
            Self::Keywords => 3,
            Self::Ctl => 4,
        }
    }
}

/// A position in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    Root,
    Ctl,
    Index,
    New,
    Event,
    NotesDir,
    NoteDir(NoteHandle),
    NoteFile(NoteHandle, NoteField),
}

impl Node {
    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Root | Node::NotesDir | Node::NoteDir(_))
    }

    /// Stable qid. Fixed files use small paths; note positions pack the
    /// handle above an eight-bit field code.
    pub fn qid(&self) -> Qid {
        let path = match self {
            Node::Root => 0,
            Node::Ctl => 1,
            Node::Index => 2,
            Node::New => 3,
            Node::Event => 4,
            Node::NotesDir => 5,
            Node::NoteDir(h) => note_path(*h, 0),
            Node::NoteFile(h, field) => note_path(*h, field.code()),
        };
        if self.is_dir() {
            Qid::dir(path)
        } else {
            Qid::file(path)
        }
    }

    /// Permission bits, with `DMDIR` on directories.
    pub fn mode(&self) -> u32 {
        match self {
            Node::Root | Node::NotesDir | Node::NoteDir(_) => DMDIR | 0o555,
            Node::Index | Node::Event => 0o444,
            Node::Ctl | Node::New | Node::NoteFile(_, NoteField::Ctl) => 0o222,
            Node::NoteFile(_, _) => 0o666,
        }
    }

    /// Whether an open with `mode` is permitted.
    pub fn allows(&self, mode: OpenMode) -> bool {
        if mode.raw() & OpenMode::RCLOSE != 0 {
            return false;
        }
        let perm = self.mode();
        let readable = perm & 0o444 != 0;
        let writable = perm & 0o222 != 0;
        match mode.access() {
            0 => readable,
            1 => writable,
            2 => readable && writable,
            _ => self.is_dir(),
        }
    }

    /// Whether the position still exists in `index`.
    pub fn exists(&self, index: &NoteIndex) -> bool {
        match self {
            Node::NoteDir(h) | Node::NoteFile(h, _) => index.get(*h).is_some(),
            _ => true,
        }
    }

    pub fn name(&self, index: &NoteIndex) -> Option<String> {
        let name = match self {
            Node::Root => "/",
            Node::Ctl => "ctl",
            Node::Index => "index",
            Node::New => "new",
            Node::Event => "event",
            Node::NotesDir => NOTES_DIR_NAME,
            Node::NoteDir(h) => return index.get(*h).map(|m| m.identifier.clone()),
            Node::NoteFile(_, field) => field.name(),
        };
        Some(name.to_string())
    }

    pub fn parent(&self) -> Node {
        match self {
            Node::Root | Node::Ctl | Node::Index | Node::New | Node::Event | Node::NotesDir => {
                Node::Root
            }
            Node::NoteDir(_) => Node::NotesDir,
            Node::NoteFile(h, _) => Node::NoteDir(*h),
        }
    }

    /// Resolve one path element.
    pub fn walk(&self, name: &str, index: &NoteIndex) -> Option<Node> {
        if !self.exists(index) {
            return None;
        }
        if name == ".." {
            return Some(self.parent());
        }
        match self {
            Node::Root => match name {
                "ctl" => Some(Node::Ctl),
                "index" => Some(Node::Index),
                "new" => Some(Node::New),
                "event" => Some(Node::Event),
                NOTES_DIR_NAME => Some(Node::NotesDir),
                _ => None,
            },
            Node::NotesDir => index.handle_of(name).map(Node::NoteDir),
            Node::NoteDir(h) => NoteField::from_name(name).map(|f| Node::NoteFile(*h, f)),
            _ => None,
        }
    }

    /// Entries of a directory, in listing order.
    pub fn children(&self, index: &NoteIndex) -> Vec<Node> {
        match self {
            Node::Root => vec![Node::Ctl, Node::Index, Node::New, Node::Event, Node::NotesDir],
            Node::NotesDir => index.iter().map(|(h, _)| Node::NoteDir(h)).collect(),
            Node::NoteDir(h) if index.get(*h).is_some() => NoteField::ALL
                .into_iter()
                .map(|f| Node::NoteFile(*h, f))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Directory entry for this position, `None` if it no longer exists.
    pub fn stat(&self, index: &NoteIndex, uname: &str) -> Option<Stat> {
        if !self.exists(index) {
            return None;
        }
        let length = match self {
            Node::NoteFile(h, field) => {
                let meta = index.get(*h)?;
                match field {
                    NoteField::Path => meta.path_string().len() as u64,
                    NoteField::Title => meta.title.len() as u64,
                    NoteField::Keywords => meta.keywords().len() as u64,
                    NoteField::Ctl => 0,
                }
            }
            _ => 0,
        };
        Some(Stat {
            qid: self.qid(),
            mode: self.mode(),
            length,
            name: self.name(index)?,
            uid: uname.to_string(),
            gid: uname.to_string(),
            muid: uname.to_string(),
            ..Stat::default()
        })
    }
}

fn note_path(handle: NoteHandle, code: u64) -> u64 {
    ((handle.raw() as u64 + 1) << 8) | code
}

#[cfg(test)]
mod tests {
    use super::*;
    use notefs_core::NoteMeta;
    use std::collections::HashSet;

    fn index_with_note() -> (NoteIndex, NoteHandle) {
        let mut index = NoteIndex::new();
        let h = index
            .insert(NoteMeta::new("20240102T030405", "Trip", vec!["work".to_string()]))
            .unwrap();
        (index, h)
    }

    #[test]
    fn test_walk_full_path() {
        let (index, h) = index_with_note();
        let node = Node::Root
            .walk("n", &index)
            .and_then(|n| n.walk("20240102T030405", &index))
            .and_then(|n| n.walk("title", &index));
        assert_eq!(node, Some(Node::NoteFile(h, NoteField::Title)));
        assert_eq!(Node::Root.walk("nope", &index), None);
        assert_eq!(Node::Index.walk("x", &index), None);
        assert_eq!(Node::NoteDir(h).walk("..", &index), Some(Node::NotesDir));
        assert_eq!(Node::Root.walk("..", &index), Some(Node::Root));
    }

    #[test]
    fn test_deleted_note_no_longer_resolves() {
        let (mut index, h) = index_with_note();
        index.remove(h);
        assert_eq!(Node::NotesDir.walk("20240102T030405", &index), None);
        assert_eq!(Node::NoteDir(h).walk("title", &index), None);
        assert!(Node::NoteFile(h, NoteField::Title).stat(&index, "u").is_none());
    }

    #[test]
    fn test_qids_are_distinct() {
        let (index, h) = index_with_note();
        let mut nodes = vec![Node::Root, Node::NoteDir(h)];
        nodes.extend(Node::Root.children(&index));
        nodes.extend(Node::NoteDir(h).children(&index));
        let paths: HashSet<u64> = nodes.iter().map(|n| n.qid().path).collect();
        assert_eq!(paths.len(), nodes.len());
        assert!(Node::NoteDir(h).qid().is_dir());
        assert!(!Node::Index.qid().is_dir());
    }

    #[test]
    fn test_open_permissions() {
        let (_, h) = index_with_note();
        assert!(Node::Index.allows(OpenMode::READ));
        assert!(!Node::Index.allows(OpenMode::WRITE));
        assert!(Node::Ctl.allows(OpenMode::WRITE.truncate()));
        assert!(!Node::New.allows(OpenMode::READ));
        assert!(Node::NoteFile(h, NoteField::Title).allows(OpenMode::RDWR));
        assert!(!Node::NoteFile(h, NoteField::Ctl).allows(OpenMode::RDWR));
        assert!(Node::Root.allows(OpenMode::READ));
        assert!(!Node::Root.allows(OpenMode::WRITE));
        assert!(!Node::Index.allows(OpenMode::from_raw(OpenMode::RCLOSE)));
    }

    #[test]
    fn test_stat_reports_field_length() {
        let (index, h) = index_with_note();
        let stat = Node::NoteFile(h, NoteField::Title).stat(&index, "me").unwrap();
        assert_eq!(stat.name, "title");
        assert_eq!(stat.length, 4);
        assert_eq!(stat.uid, "me");
        let dir = Node::NoteDir(h).stat(&index, "me").unwrap();
        assert_eq!(dir.name, "20240102T030405");
        assert!(dir.is_dir());
    }
}
