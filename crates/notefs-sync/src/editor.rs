//! Editor save notifications.
//!
//! The editor log is a stream of `<window-id> <op> <path>` lines, one per
//! editor action. Only `put` (save) lines matter here.

use std::path::PathBuf;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::trace;

use crate::daemon::SyncInput;
use crate::error::Result;

/// One parsed editor log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorEvent {
    pub window: u64,
    pub op: String,
    pub path: PathBuf,
}

impl EditorEvent {
    pub fn is_save(&self) -> bool {
        self.op == "put"
    }
}

/// Parse `<window-id> <op> <path>`. The path may contain spaces.
pub fn parse_line(line: &str) -> Option<EditorEvent> {
    let mut parts = line.trim_end_matches(['\n', '\r']).splitn(3, ' ');
    let window = parts.next()?.trim().parse().ok()?;
    let op = parts.next()?.to_string();
    let path = parts.next().map(str::trim).filter(|p| !p.is_empty())?;
    Some(EditorEvent {
        window,
        op,
        path: PathBuf::from(path),
    })
}

/// Forward the path of every save read from `reader` into `tx`.
pub async fn forward_saves<B>(reader: B, tx: mpsc::Sender<SyncInput>) -> Result<()>
where
    B: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let Some(event) = parse_line(&line) else {
            continue;
        };
        trace!(subsystem = "sync", component = "editor", window = event.window, op = %event.op, "Editor event");
        if event.is_save() && tx.send(SyncInput::Saved(event.path)).await.is_err() {
            break;
        }
    }
    Ok(())
}
