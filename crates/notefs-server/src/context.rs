//! Process-wide server state shared by every connection.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use notefs_core::{EventBus, NoteIndex, Result};

use crate::config::ServerConfig;

/// Note index, event bus and configuration of one server.
///
/// Listings, stat and plain reads take the index read lock; mutations take
/// the write lock.
pub struct ServerContext {
    pub index: RwLock<NoteIndex>,
    pub events: EventBus,
    pub config: ServerConfig,
}

impl ServerContext {
    pub fn new(config: ServerConfig, index: NoteIndex) -> Arc<Self> {
        Arc::new(Self {
            index: RwLock::new(index),
            events: EventBus::new(config.event_queue),
            config,
        })
    }

    /// Build a context whose index is loaded from `config.notes_dir`,
    /// creating the directory when it is missing.
    pub fn load(config: ServerConfig) -> Result<Arc<Self>> {
        std::fs::create_dir_all(&config.notes_dir)?;
        let index = NoteIndex::load(&config.notes_dir)?;
        info!(
            subsystem = "server",
            component = "context",
            path = %config.notes_dir.display(),
            note_count = index.len(),
            "Server context ready"
        );
        Ok(Self::new(config, index))
    }
}
