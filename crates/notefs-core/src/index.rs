//! In-memory note index for one base directory.
//!
//! Records live in an arena addressed by [`NoteHandle`]s. A handle is never
//! reused after its note is removed, so a stale handle resolves to nothing
//! instead of to a different note. Identifiers map to handles through a
//! lookup table.
//!
//! The active filter is kept as parsed filters and evaluated each time the
//! listing is rendered; it never alters the collection itself.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::filter::{matches_all, parse_query, Filter, SortOrder};
use crate::metadata::{identifier_at, parse_filename, NoteMeta};

/// Stable handle of a note inside a [`NoteIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoteHandle(u32);

impl NoteHandle {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    fn slot(self) -> usize {
        self.0 as usize
    }
}

/// The authoritative collection of note records plus listing state.
#[derive(Debug, Default)]
pub struct NoteIndex {
    slots: Vec<Option<NoteMeta>>,
    by_id: HashMap<String, NoteHandle>,
    filter_query: String,
    filters: Vec<Filter>,
    sort: SortOrder,
}

impl NoteIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `dir` recursively and index every file named like a note.
    ///
    /// Dot-directories are skipped. When two files carry the same
    /// identifier the first one in path order wins.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        scan_dir(dir, &mut files)?;
        files.sort();

        let mut index = Self::new();
        for path in files {
            let meta = parse_filename(&path);
            if !meta.is_note() {
                continue;
            }
            if let Err(e) = index.insert(meta) {
                warn!(
                    subsystem = "index",
                    op = "load",
                    path = %path.display(),
                    error = %e,
                    "Skipping note file"
                );
            }
        }

        info!(
            subsystem = "index",
            op = "load",
            path = %dir.display(),
            note_count = index.len(),
            "Note index loaded"
        );
        Ok(index)
    }

    /// Add a record. The identifier must be present and not already live.
    pub fn insert(&mut self, meta: NoteMeta) -> Result<NoteHandle> {
        if !meta.is_note() {
            return Err(Error::InvalidNote("record has no identifier".to_string()));
        }
        if self.by_id.contains_key(&meta.identifier) {
            return Err(Error::DuplicateIdentifier(meta.identifier));
        }
        let raw = u32::try_from(self.slots.len())
            .map_err(|_| Error::InvalidNote("note index is full".to_string()))?;
        let handle = NoteHandle(raw);
        self.by_id.insert(meta.identifier.clone(), handle);
        self.slots.push(Some(meta));
        Ok(handle)
    }

    /// Create a note without a file. The identifier is derived from `now`,
    /// advanced one second at a time while it is taken.
    pub fn create(
        &mut self,
        title: impl Into<String>,
        tags: Vec<String>,
        now: NaiveDateTime,
    ) -> Result<NoteHandle> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(Error::InvalidNote("title must not be empty".to_string()));
        }

        let mut at = now;
        let mut identifier = identifier_at(at);
        while self.by_id.contains_key(&identifier) {
            at += Duration::seconds(1);
            identifier = identifier_at(at);
        }

        debug!(subsystem = "index", op = "create", note_id = %identifier, "Note created");
        self.insert(NoteMeta::new(identifier, title, tags))
    }

    pub fn get(&self, handle: NoteHandle) -> Option<&NoteMeta> {
        self.slots.get(handle.slot()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, handle: NoteHandle) -> Option<&mut NoteMeta> {
        self.slots.get_mut(handle.slot()).and_then(Option::as_mut)
    }

    /// Like [`get`](Self::get) but with a `NoteNotFound` error.
    pub fn require(&self, handle: NoteHandle) -> Result<&NoteMeta> {
        self.get(handle)
            .ok_or_else(|| Error::NoteNotFound(format!("handle {}", handle.raw())))
    }

    pub fn require_mut(&mut self, handle: NoteHandle) -> Result<&mut NoteMeta> {
        self.get_mut(handle)
            .ok_or_else(|| Error::NoteNotFound(format!("handle {}", handle.raw())))
    }

    pub fn handle_of(&self, identifier: &str) -> Option<NoteHandle> {
        self.by_id.get(identifier).copied()
    }

    pub fn lookup(&self, identifier: &str) -> Option<&NoteMeta> {
        self.handle_of(identifier).and_then(|h| self.get(h))
    }

    /// Remove a record. Its handle stays retired.
    pub fn remove(&mut self, handle: NoteHandle) -> Option<NoteMeta> {
        let meta = self.slots.get_mut(handle.slot())?.take()?;
        self.by_id.remove(&meta.identifier);
        Some(meta)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Live records in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (NoteHandle, &NoteMeta)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|m| (NoteHandle(i as u32), m)))
    }

    /// Live identifiers in creation order.
    pub fn ids(&self) -> Vec<&str> {
        self.iter().map(|(_, m)| m.identifier.as_str()).collect()
    }

    /// Replace the active filter. An empty query clears it. On a parse
    /// error the previous filter stays active.
    pub fn set_filter(&mut self, query: &str) -> Result<()> {
        let query = query.trim();
        let filters = parse_query(query)?;
        self.filters = filters;
        self.filter_query = query.to_string();
        debug!(
            subsystem = "index",
            op = "filter",
            query = %self.filter_query,
            "Filter updated"
        );
        Ok(())
    }

    pub fn filter_query(&self) -> &str {
        &self.filter_query
    }

    pub fn set_sort(&mut self, order: SortOrder) {
        self.sort = order;
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort
    }

    /// Records passing the active filter, in listing order.
    pub fn listing(&self) -> Vec<&NoteMeta> {
        let mut notes: Vec<&NoteMeta> = self
            .iter()
            .map(|(_, m)| m)
            .filter(|m| matches_all(&self.filters, m))
            .collect();
        self.sort.sort(&mut notes);
        notes
    }

    /// Text of the `index` file: one line per listed note.
    pub fn render_index(&self) -> String {
        let mut out = String::new();
        for meta in self.listing() {
            out.push_str(&meta.index_line());
            out.push('\n');
        }
        out
    }
}

fn scan_dir(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if !hidden {
                scan_dir(&path, out)?;
            }
        } else if file_type.is_file() {
            out.push(path);
        }
    }
    Ok(())
}
