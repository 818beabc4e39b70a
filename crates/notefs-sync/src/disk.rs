//! Note files on disk, confined to one base directory.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use notefs_core::{build_filename, parse_filename, FileType, FrontMatter, NoteMeta};

use crate::error::{Result, SyncError};

/// File operations on the notes directory.
///
/// Every path is checked against the base directory both lexically (no
/// `..` components) and after resolving symlinks of its parent.
#[derive(Debug, Clone)]
pub struct DiskNotes {
    base: PathBuf,
    extension: String,
}

impl DiskNotes {
    /// Open `base`, creating it if needed. `extension` (with dot) is used
    /// for files of new notes.
    pub fn new(base: impl AsRef<Path>, extension: impl Into<String>) -> Result<Self> {
        fs::create_dir_all(base.as_ref())?;
        Ok(Self {
            base: base.as_ref().canonicalize()?,
            extension: extension.into(),
        })
    }

    /// Resolved base directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Resolve `path` (absolute, or relative to the base) and make sure it
    /// stays inside the base directory.
    pub fn ensure_within_base(&self, path: &Path) -> Result<PathBuf> {
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(SyncError::PathEscapesBase(path.to_path_buf()));
        }
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        };
        let (parent, name) = match (joined.parent(), joined.file_name()) {
            (Some(parent), Some(name)) => (parent, name),
            _ => return Err(SyncError::PathEscapesBase(path.to_path_buf())),
        };
        let resolved = parent.canonicalize()?.join(name);
        if !resolved.starts_with(&self.base) {
            return Err(SyncError::PathEscapesBase(path.to_path_buf()));
        }
        if let Ok(target) = resolved.canonicalize() {
            if !target.starts_with(&self.base) {
                return Err(SyncError::PathEscapesBase(path.to_path_buf()));
            }
        }
        Ok(resolved)
    }

    /// First file (in path order) whose name carries `identifier`.
    pub fn find_by_identifier(&self, identifier: &str) -> Result<Option<PathBuf>> {
        Ok(self
            .note_files()?
            .into_iter()
            .find(|p| parse_filename(p).identifier == identifier))
    }

    /// Every file below the base whose name carries an identifier, sorted.
    pub fn note_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        scan_dir(&self.base, &mut files)?;
        files.retain(|p| parse_filename(p).is_note());
        files.sort();
        Ok(files)
    }

    /// Create the file of a new note: canonical name, front matter only.
    pub fn create(&self, meta: &NoteMeta) -> Result<PathBuf> {
        let file_type = FileType::detect("", &self.extension)?;
        let path = self.base.join(build_filename(meta, &self.extension));
        let content = FrontMatter::from_meta(meta, file_type).marshal();

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(SyncError::RenameCollision(path))
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(content.as_bytes())?;
        info!(
            subsystem = "sync",
            component = "disk",
            op = "create",
            note_id = %meta.identifier,
            path = %path.display(),
            "Note file created"
        );
        Ok(path)
    }

    /// Move the file at `current` to `target`, both inside the base.
    ///
    /// Returns false when they are already the same file.
    pub fn rename(&self, current: &Path, target: &Path) -> Result<bool> {
        let current = self.ensure_within_base(current)?;
        let target = self.ensure_within_base(target)?;
        if target == current {
            debug!(
                subsystem = "sync",
                component = "disk",
                op = "rename",
                path = %current.display(),
                "File already in place"
            );
            return Ok(false);
        }
        if target.exists() {
            return Err(SyncError::RenameCollision(target));
        }
        fs::rename(&current, &target)?;
        info!(
            subsystem = "sync",
            component = "disk",
            op = "rename",
            from = %current.display(),
            path = %target.display(),
            "Note file renamed"
        );
        Ok(true)
    }

    /// Rewrite the front matter of the file at `path` from `meta`, keeping
    /// the body. Returns whether the file changed.
    pub fn update_front_matter(&self, path: &Path, meta: &NoteMeta) -> Result<bool> {
        let path = self.ensure_within_base(path)?;
        let content = fs::read_to_string(&path)?;
        let file_type = FileType::detect(&content, &extension_of(&path, &self.extension))?;
        let meta = with_disk_signature(meta, &path);
        let updated = FrontMatter::from_meta(&meta, file_type).apply(&content);
        if updated == content {
            return Ok(false);
        }
        fs::write(&path, updated)?;
        debug!(
            subsystem = "sync",
            component = "disk",
            op = "update",
            note_id = %meta.identifier,
            path = %path.display(),
            "Front matter rewritten"
        );
        Ok(true)
    }

    pub fn delete(&self, path: &Path) -> Result<()> {
        let path = self.ensure_within_base(path)?;
        fs::remove_file(&path)?;
        info!(
            subsystem = "sync",
            component = "disk",
            op = "delete",
            path = %path.display(),
            "Note file deleted"
        );
        Ok(())
    }

    /// Metadata of the file at `path`: identifier and signature from the
    /// name, title and tags from the front matter when it has a block,
    /// otherwise from the name.
    pub fn read_note(&self, path: &Path) -> Result<NoteMeta> {
        let path = self.ensure_within_base(path)?;
        let mut meta = parse_filename(&path);
        let ext = extension_of(&path, &self.extension);
        if FileType::from_extension(&ext).is_none() {
            return Ok(meta);
        }
        let content = fs::read_to_string(&path)?;
        let front = FrontMatter::unmarshal(&content, &ext)?;
        if !front.identifier.is_empty() || !front.title.is_empty() {
            if !front.identifier.is_empty() && front.identifier != meta.identifier {
                debug!(
                    subsystem = "sync",
                    component = "disk",
                    note_id = %meta.identifier,
                    front_matter_id = %front.identifier,
                    "Front matter identifier differs from file name"
                );
            }
            meta.title = front.title;
            meta.tags = front.tags;
        }
        Ok(meta)
    }
}

/// `meta` with the signature of the file name at `path` when it has none.
fn with_disk_signature(meta: &NoteMeta, path: &Path) -> NoteMeta {
    let mut meta = meta.clone();
    if meta.signature.is_none() {
        meta.signature = parse_filename(path).signature;
    }
    meta
}

fn extension_of(path: &Path, fallback: &str) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_else(|| fallback.to_string())
}

fn scan_dir(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if !entry.file_name().to_string_lossy().starts_with('.') {
                scan_dir(&path, out)?;
            }
        } else if file_type.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn disk() -> (TempDir, DiskNotes) {
        let dir = TempDir::new().unwrap();
        let disk = DiskNotes::new(dir.path(), ".md").unwrap();
        (dir, disk)
    }

    fn trip() -> NoteMeta {
        NoteMeta::new(
            "20240301T101500",
            "Trip Report",
            vec!["work".to_string(), "travel".to_string()],
        )
    }

    #[test]
    fn test_create_writes_front_matter() {
        let (_dir, disk) = disk();
        let path = disk.create(&trip()).unwrap();
        assert_eq!(
            path,
            disk.base()
                .join("20240301T101500--trip-report__work_travel.md")
        );
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("---\ntitle:"));
        assert!(content.contains("Trip Report"));

        assert!(matches!(
            disk.create(&trip()),
            Err(SyncError::RenameCollision(_))
        ));
    }

    #[test]
    fn test_rename_moves_file_once() {
        let (_dir, disk) = disk();
        let old = disk.base().join("20240301T101500==a1--draft.org");
        let new = disk
            .base()
            .join("20240301T101500==a1--trip-report__work_travel.org");
        fs::write(&old, "#+title: draft\n").unwrap();

        assert!(disk.rename(&old, &new).unwrap());
        assert!(!old.exists());
        assert_eq!(fs::read_to_string(&new).unwrap(), "#+title: draft\n");
        assert!(!disk.rename(&new, &new).unwrap());
    }

    #[test]
    fn test_rename_refuses_to_overwrite() {
        let (_dir, disk) = disk();
        let old = disk.base().join("20240301T101500--draft.md");
        let taken = disk
            .base()
            .join("20240301T101500--trip-report__work_travel.md");
        fs::write(&old, "a").unwrap();
        fs::write(&taken, "b").unwrap();

        assert!(matches!(
            disk.rename(&old, &taken),
            Err(SyncError::RenameCollision(_))
        ));
        assert_eq!(fs::read_to_string(&taken).unwrap(), "b");
        assert!(old.exists());
    }

    #[test]
    fn test_rename_target_must_stay_inside_base() {
        let (_dir, disk) = disk();
        let old = disk.base().join("20240301T101500--draft.md");
        fs::write(&old, "a").unwrap();
        let outside = TempDir::new().unwrap();

        assert!(matches!(
            disk.rename(&old, &outside.path().join("20240301T101500--draft.md")),
            Err(SyncError::PathEscapesBase(_))
        ));
        assert!(old.exists());
    }

    #[test]
    fn test_paths_outside_base_are_rejected() {
        let (_dir, disk) = disk();
        let outside = TempDir::new().unwrap();
        let victim = outside.path().join("20240301T101500--victim.md");
        fs::write(&victim, "keep").unwrap();

        assert!(matches!(
            disk.delete(&victim),
            Err(SyncError::PathEscapesBase(_))
        ));
        assert!(matches!(
            disk.ensure_within_base(Path::new("../20240301T101500--x.md")),
            Err(SyncError::PathEscapesBase(_))
        ));
        assert!(victim.exists());
    }

    #[test]
    fn test_update_front_matter_keeps_body() {
        let (_dir, disk) = disk();
        let path = disk.base().join("20240301T101500--draft.md");
        fs::write(&path, "Body line\n").unwrap();

        assert!(disk.update_front_matter(&path, &trip()).unwrap());
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.ends_with("Body line\n"));
        assert!(!disk.update_front_matter(&path, &trip()).unwrap());
    }

    #[test]
    fn test_read_note_prefers_front_matter() {
        let (_dir, disk) = disk();
        let path = disk.create(&trip()).unwrap();
        let renamed = disk.base().join("20240301T101500--old-name.md");
        fs::rename(&path, &renamed).unwrap();

        let meta = disk.read_note(&renamed).unwrap();
        assert_eq!(meta.identifier, "20240301T101500");
        assert_eq!(meta.title, "Trip Report");
        assert_eq!(meta.tags, vec!["work", "travel"]);

        let bare = disk.base().join("20240302T000000--from-name__x.md");
        fs::write(&bare, "no block\n").unwrap();
        let meta = disk.read_note(&bare).unwrap();
        assert_eq!(meta.title, "from name");
        assert_eq!(meta.tags, vec!["x"]);
    }

    #[test]
    fn test_find_by_identifier_skips_dot_dirs() {
        let (_dir, disk) = disk();
        fs::create_dir(disk.base().join(".git")).unwrap();
        fs::write(disk.base().join(".git/20240301T101500--hidden.md"), "").unwrap();
        assert_eq!(disk.find_by_identifier("20240301T101500").unwrap(), None);

        fs::create_dir(disk.base().join("sub")).unwrap();
        let nested = disk.base().join("sub/20240301T101500--nested.md");
        fs::write(&nested, "").unwrap();
        assert_eq!(
            disk.find_by_identifier("20240301T101500").unwrap(),
            Some(nested)
        );
    }
}
