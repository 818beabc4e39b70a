//! Event dispatcher: applies note events to disk and saved files to the
//! server.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use notefs_core::{parse_filename, NoteAction, NoteEvent};

use crate::disk::DiskNotes;
use crate::error::{Result, SyncError};
use crate::remote::NoteRemote;

/// Work item of the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncInput {
    /// A note event read from the server.
    Event(NoteEvent),
    /// The editor saved this file.
    Saved(PathBuf),
}

/// Applies events and saves one at a time against a remote and a disk.
pub struct Dispatcher<R> {
    pub(crate) remote: R,
    pub(crate) disk: DiskNotes,
}

impl<R: NoteRemote> Dispatcher<R> {
    pub fn new(remote: R, disk: DiskNotes) -> Self {
        Self { remote, disk }
    }

    pub fn disk(&self) -> &DiskNotes {
        &self.disk
    }

    pub fn remote_mut(&mut self) -> &mut R {
        &mut self.remote
    }

    /// Process inputs until every sender is gone. Failures are logged and
    /// skipped.
    pub async fn run(&mut self, mut inputs: mpsc::Receiver<SyncInput>) {
        info!(subsystem = "sync", component = "dispatcher", "Dispatcher started");
        while let Some(input) = inputs.recv().await {
            self.process(input).await;
        }
        info!(subsystem = "sync", component = "dispatcher", "Dispatcher stopped");
    }

    /// Apply one input, logging instead of returning failures.
    pub async fn process(&mut self, input: SyncInput) {
        match input {
            SyncInput::Event(event) => {
                if let Err(e) = self.handle_event(&event).await {
                    warn!(
                        subsystem = "sync",
                        component = "dispatcher",
                        note_id = %event.identifier,
                        action = %event.action,
                        error = %e,
                        "Event skipped"
                    );
                }
            }
            SyncInput::Saved(path) => {
                if let Err(e) = self.sync_file(&path).await {
                    warn!(
                        subsystem = "sync",
                        component = "dispatcher",
                        path = %path.display(),
                        error = %e,
                        "Saved file skipped"
                    );
                }
            }
        }
    }

    /// Apply one note event to disk.
    pub async fn handle_event(&mut self, event: &NoteEvent) -> Result<()> {
        let id = event.identifier.as_str();
        match event.action {
            NoteAction::New => {
                let meta = self.remote.note(id).await?;
                if meta.path.is_some() {
                    debug!(subsystem = "sync", op = "new", note_id = %id, "Note already has a file");
                    return Ok(());
                }
                let path = self.disk.create(&meta)?;
                self.remote
                    .write_field(id, "path", &path.to_string_lossy())
                    .await?;
            }
            NoteAction::Update => {
                let meta = self.remote.note(id).await?;
                let path = self.locate(id, meta.path.as_deref())?;
                self.disk.update_front_matter(&path, &meta)?;
            }
            NoteAction::Rename => {
                // The server has already published the new name.
                let meta = self.remote.note(id).await?;
                let target = meta
                    .path
                    .clone()
                    .ok_or_else(|| SyncError::MissingPath(id.to_string()))?;
                let current = self.locate(id, Some(&target))?;
                self.disk.rename(&current, &target)?;
            }
            NoteAction::Delete => {
                let path = match &event.path {
                    Some(path) => Some(path.clone()),
                    None => self.disk.find_by_identifier(id)?,
                };
                match path {
                    Some(path) => self.disk.delete(&path)?,
                    None => {
                        debug!(subsystem = "sync", op = "delete", note_id = %id, "No file to delete")
                    }
                }
            }
        }
        Ok(())
    }

    /// The file on disk for note `id`: `published` when it exists there,
    /// otherwise the first file carrying the identifier.
    fn locate(&self, id: &str, published: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = published {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
        }
        self.disk
            .find_by_identifier(id)?
            .ok_or_else(|| SyncError::MissingPath(id.to_string()))
    }

    /// Push the metadata of a file on disk to the server: register it if
    /// unknown, otherwise write the fields that differ, then force a rename
    /// and move the file to the path the server settled on.
    pub async fn sync_file(&mut self, path: &Path) -> Result<()> {
        let path = self.disk.ensure_within_base(path)?;
        if !parse_filename(&path).is_note() {
            debug!(subsystem = "sync", path = %path.display(), "Not a note file");
            return Ok(());
        }
        let local = self.disk.read_note(&path)?;
        let id = local.identifier.as_str();

        if !self.remote.exists(id).await? {
            self.remote.add(&path).await?;
            info!(subsystem = "sync", op = "add", note_id = %id, "Note registered");
        }

        let remote = self.remote.note(id).await?;
        if remote.path.as_deref() != Some(path.as_path()) {
            self.remote
                .write_field(id, "path", &path.to_string_lossy())
                .await?;
        }
        if remote.title != local.title {
            self.remote.write_field(id, "title", &local.title).await?;
        }
        if remote.tags != local.tags {
            self.remote
                .write_field(id, "keywords", &local.keywords())
                .await?;
        }
        self.remote.control(id, "r").await?;

        // Follow the canonical path now; the `r` event then finds it in place.
        if let Some(target) = self.remote.note(id).await?.path {
            self.disk.rename(&path, &target)?;
        }
        Ok(())
    }
}
