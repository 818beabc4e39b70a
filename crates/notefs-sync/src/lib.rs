//! # notefs-sync
//!
//! Keeps note files on disk in step with a notefs server.
//!
//! The daemon reads the server's `event` file and applies each event to
//! the notes directory: `n` creates the file and reports its path back,
//! `u` rewrites the front matter, `r` renames the file to its canonical
//! name and `d` deletes it. Editor saves flow the other way, pushing the
//! front matter of a saved file to the server.

pub mod config;
pub mod daemon;
pub mod disk;
pub mod editor;
pub mod error;
pub mod reconcile;
pub mod remote;

pub use config::SyncConfig;
pub use daemon::{Dispatcher, SyncInput};
pub use disk::DiskNotes;
pub use error::{Result, SyncError};
pub use reconcile::ReconcileReport;
pub use remote::{EventReader, NinepRemote, NoteRemote};
