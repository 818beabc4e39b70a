//! Daemon configuration.

use std::path::PathBuf;

use notefs_core::defaults;

/// Configuration of the synchronization daemon.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Address of the notefs server.
    pub addr: String,
    /// Base directory of the note files. Nothing outside it is touched.
    pub notes_dir: PathBuf,
    /// Extension (dialect) of files created for new notes.
    pub extension: String,
    /// User name sent in `Tattach`.
    pub uname: String,
    /// Message size requested from the server.
    pub msize: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            addr: defaults::SERVER_ADDR.to_string(),
            notes_dir: default_notes_dir(),
            extension: defaults::NOTE_EXTENSION.to_string(),
            uname: defaults::UNAME.to_string(),
            msize: defaults::MSIZE,
        }
    }
}

impl SyncConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// Reads the same variables as the server so both sides agree:
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `NOTEFS_ADDR` | `127.0.0.1:5640` | Server address |
    /// | `NOTEFS_DIR` | `$HOME/notes` | Base directory of notes |
    /// | `NOTEFS_EXT` | `.md` | Extension for new note files |
    /// | `NOTEFS_UNAME` | `$USER` or `none` | Attach name |
    /// | `NOTEFS_MSIZE` | `8192` | Requested message size |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            addr: std::env::var("NOTEFS_ADDR").unwrap_or(defaults.addr),
            notes_dir: std::env::var("NOTEFS_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.notes_dir),
            extension: std::env::var("NOTEFS_EXT")
                .ok()
                .filter(|v| !v.is_empty())
                .map(|v| normalize_extension(&v))
                .unwrap_or(defaults.extension),
            uname: std::env::var("NOTEFS_UNAME")
                .or_else(|_| std::env::var("USER"))
                .unwrap_or(defaults.uname),
            msize: std::env::var("NOTEFS_MSIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.msize),
        }
    }

    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    pub fn with_notes_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.notes_dir = dir.into();
        self
    }

    /// Set the extension, adding the leading dot if missing.
    pub fn with_extension(mut self, ext: &str) -> Self {
        self.extension = normalize_extension(ext);
        self
    }

    pub fn with_uname(mut self, uname: impl Into<String>) -> Self {
        self.uname = uname.into();
        self
    }
}

fn normalize_extension(ext: &str) -> String {
    format!(".{}", ext.trim().trim_start_matches('.'))
}

fn default_notes_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(defaults::NOTES_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let config = SyncConfig::default()
            .with_addr("10.0.0.1:564")
            .with_notes_dir("/srv/notes")
            .with_extension("org")
            .with_uname("glenda");
        assert_eq!(config.addr, "10.0.0.1:564");
        assert_eq!(config.notes_dir, PathBuf::from("/srv/notes"));
        assert_eq!(config.extension, ".org");
        assert_eq!(config.uname, "glenda");
    }

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.addr, defaults::SERVER_ADDR);
        assert_eq!(config.extension, ".md");
        assert!(config.notes_dir.ends_with("notes"));
    }
}
