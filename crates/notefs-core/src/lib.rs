//! # notefs-core
//!
//! Core types and pure logic for notefs.
//!
//! This crate provides the pieces every other notefs crate builds on:
//! - Filename codec for `IDENTIFIER[==SIGNATURE]--TITLE__TAGS.EXT` names
//! - Front-matter codec for the `org`, `md-yaml`, `md-toml` and `txt` dialects
//! - The query filter language used to select notes
//! - The in-memory [`NoteIndex`] and the [`EventBus`] fed by note mutations

pub mod defaults;
pub mod error;
pub mod events;
pub mod filter;
pub mod frontmatter;
pub mod index;
pub mod logging;
pub mod metadata;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{EventBus, NoteAction, NoteEvent, Subscription};
pub use filter::{Filter, FilterField, SortField, SortOrder};
pub use frontmatter::{FileType, FrontMatter};
pub use index::{NoteHandle, NoteIndex};
pub use metadata::{build_filename, parse_filename, NoteMeta};
