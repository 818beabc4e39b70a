//! Server configuration.

use std::path::PathBuf;

use notefs_core::defaults;

/// Configuration of the protocol server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub addr: String,
    /// Base directory of the note files.
    pub notes_dir: PathBuf,
    /// Extension (dialect) given to notes created through `new`.
    pub extension: String,
    /// Largest message size offered in `Rversion`.
    pub msize: u32,
    /// Per-subscriber event queue capacity.
    pub event_queue: usize,
    /// Owner reported in stat replies.
    pub uname: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: defaults::SERVER_ADDR.to_string(),
            notes_dir: default_notes_dir(),
            extension: defaults::NOTE_EXTENSION.to_string(),
            msize: defaults::MSIZE,
            event_queue: defaults::EVENT_QUEUE_CAPACITY,
            uname: defaults::UNAME.to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `NOTEFS_ADDR` | `127.0.0.1:5640` | Listen address |
    /// | `NOTEFS_DIR` | `$HOME/notes` | Base directory of notes |
    /// | `NOTEFS_EXT` | `.md` | Extension for new notes |
    /// | `NOTEFS_MSIZE` | `8192` | Maximum 9P message size |
    /// | `NOTEFS_EVENT_QUEUE` | `64` | Event queue capacity per subscriber |
    /// | `NOTEFS_UNAME` | `$USER` or `none` | Owner reported in stat |
    pub fn from_env() -> Self {
        let addr =
            std::env::var("NOTEFS_ADDR").unwrap_or_else(|_| defaults::SERVER_ADDR.to_string());

        let notes_dir = std::env::var("NOTEFS_DIR")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_notes_dir);

        let extension = std::env::var("NOTEFS_EXT")
            .ok()
            .filter(|v| !v.is_empty())
            .map(|v| normalize_extension(&v))
            .unwrap_or_else(|| defaults::NOTE_EXTENSION.to_string());

        let msize = std::env::var("NOTEFS_MSIZE")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults::MSIZE)
            .max(defaults::IOHDRSZ * 2);

        let event_queue = std::env::var("NOTEFS_EVENT_QUEUE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::EVENT_QUEUE_CAPACITY)
            .max(1);

        let uname = std::env::var("NOTEFS_UNAME")
            .or_else(|_| std::env::var("USER"))
            .unwrap_or_else(|_| defaults::UNAME.to_string());

        Self {
            addr,
            notes_dir,
            extension,
            msize,
            event_queue,
            uname,
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

    pub fn with_extension(mut self, ext: &str) -> Self {
        self.extension = normalize_extension(ext);
        self
    }

    pub fn with_msize(mut self, msize: u32) -> Self {
        self.msize = msize;
        self
    }

    pub fn with_event_queue(mut self, capacity: usize) -> Self {
        self.event_queue = capacity.max(1);
        self
    }

    pub fn with_uname(mut self, uname: impl Into<String>) -> Self {
        self.uname = uname.into();
        self
    }

    /// Largest data payload of one read or write.
    pub fn iounit(&self) -> u32 {
        self.msize.saturating_sub(defaults::IOHDRSZ)
    }
}

fn default_notes_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(defaults::NOTES_DIR)
}

/// `md` and `.md` both mean `.md`.
fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim();
    if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{}", ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.addr, "127.0.0.1:5640");
        assert_eq!(config.extension, ".md");
        assert_eq!(config.msize, 8192);
        assert_eq!(config.iounit(), 8192 - 24);
        assert!(config.notes_dir.ends_with("notes"));
    }

    #[test]
    fn test_builders() {
        let config = ServerConfig::default()
            .with_addr("0.0.0.0:564")
            .with_notes_dir("/tmp/n")
            .with_extension("org")
            .with_event_queue(0)
            .with_uname("glenda");
        assert_eq!(config.addr, "0.0.0.0:564");
        assert_eq!(config.notes_dir, PathBuf::from("/tmp/n"));
        assert_eq!(config.extension, ".org");
        assert_eq!(config.event_queue, 1);
        assert_eq!(config.uname, "glenda");
    }
}
