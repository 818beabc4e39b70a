//! # notefs-server
//!
//! 9P2000 file server presenting a note collection as a virtual tree.
//!
//! Clients filter and sort the index, create notes, edit titles and tags,
//! delete notes, and read a blocking `event` file announcing every
//! mutation. Note files themselves are never touched here; the sync daemon
//! applies events to disk.

pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod server;
pub mod session;
pub mod tree;

pub use config::ServerConfig;
pub use context::ServerContext;
pub use error::{NinepError, Result};
pub use server::NoteServer;
pub use session::serve;
pub use tree::{Node, NoteField};
