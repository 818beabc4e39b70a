//! Centralized default constants for notefs.
//!
//! Every crate and binary reads its fallback values from here instead of
//! defining its own magic numbers. Organized by domain area.

// =============================================================================
// SERVER
// =============================================================================

/// Default listen (and connect) address of the protocol server.
pub const SERVER_ADDR: &str = "127.0.0.1:5640";

/// Largest 9P message size the server will negotiate.
pub const MSIZE: u32 = 8192;

/// Bytes of 9P framing overhead subtracted from msize to get the iounit.
pub const IOHDRSZ: u32 = 24;

/// Owner name reported in stat replies when none is configured.
pub const UNAME: &str = "none";

// =============================================================================
// EVENTS
// =============================================================================

/// Capacity of each subscriber's event queue. Events are dropped for a
/// subscriber whose queue is full.
pub const EVENT_QUEUE_CAPACITY: usize = 64;

// =============================================================================
// NOTES
// =============================================================================

/// Directory (below `$HOME`) holding notes when none is configured.
pub const NOTES_DIR: &str = "notes";

/// Extension used for notes created through the `new` endpoint.
pub const NOTE_EXTENSION: &str = ".md";

/// Title shown in the index listing for notes without one.
pub const UNTITLED: &str = "(untitled)";

/// chrono format of a note identifier (`YYYYMMDDTHHMMSS`).
pub const IDENTIFIER_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Length of a note identifier in bytes.
pub const IDENTIFIER_LEN: usize = 15;
