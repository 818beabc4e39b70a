//! Structured logging schema and field name constants for notefs.
//!
//! All crates log with these field names so a log pipeline can filter on
//! the same keys whether a line came from the protocol server or from the
//! synchronization daemon.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Listener or daemon cannot continue, requires operator attention |
//! | WARN  | A note could not be synchronized and was skipped |
//! | INFO  | Lifecycle events (startup, shutdown, connections), note creation and deletion |
//! | DEBUG | Decision points: filter changes, dropped events, renames |
//! | TRACE | Per-frame protocol traffic |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "server", "sync", "index", "events"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "listener", "session", "dispatcher", "disk"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "walk", "read", "write", "rename", "reconcile"
pub const OPERATION: &str = "op";

/// Connection number assigned by the listener.
pub const CONN_ID: &str = "conn_id";

/// 9P fid the request operates on.
pub const FID: &str = "fid";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Note identifier (`YYYYMMDDTHHMMSS`).
pub const NOTE_ID: &str = "note_id";

/// Event action letter (`n`, `u`, `r`, `d`).
pub const ACTION: &str = "action";

/// Filesystem path of a note file.
pub const PATH: &str = "path";

/// Active filter query text.
pub const QUERY: &str = "query";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of subscribers an event was offered to.
pub const SUBSCRIBER_COUNT: &str = "subscriber_count";

/// Number of notes in a listing or scan.
pub const NOTE_COUNT: &str = "note_count";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Every field name in the schema, in declaration order.
pub const ALL_FIELDS: &[&str] = &[
    SUBSYSTEM,
    COMPONENT,
    OPERATION,
    CONN_ID,
    FID,
    NOTE_ID,
    ACTION,
    PATH,
    QUERY,
    DURATION_MS,
    SUBSCRIBER_COUNT,
    NOTE_COUNT,
    ERROR_MSG,
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_field_names_are_unique() {
        let unique: HashSet<_> = ALL_FIELDS.iter().collect();
        assert_eq!(unique.len(), ALL_FIELDS.len());
    }

    #[test]
    fn test_field_names_are_snake_case() {
        for field in ALL_FIELDS {
            assert!(
                field.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "field {field} is not snake_case"
            );
        }
    }
}
