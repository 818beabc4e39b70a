//! One-shot reconciliation of the notes directory with the server.

use std::time::Instant;

use tracing::{info, warn};

use crate::daemon::Dispatcher;
use crate::error::Result;
use crate::remote::NoteRemote;

/// Outcome of a reconcile run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub synced: usize,
    pub failed: usize,
}

impl<R: NoteRemote> Dispatcher<R> {
    /// Push every note file under the base directory to the server, one
    /// file at a time. A failing file is counted and skipped; files synced
    /// before it stay synced.
    pub async fn reconcile(&mut self) -> Result<ReconcileReport> {
        let started = Instant::now();
        let files = self.disk.note_files()?;
        let mut report = ReconcileReport {
            scanned: files.len(),
            ..ReconcileReport::default()
        };

        for path in files {
            match self.sync_file(&path).await {
                Ok(()) => report.synced += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        subsystem = "sync",
                        component = "reconcile",
                        path = %path.display(),
                        error = %e,
                        "File skipped"
                    );
                }
            }
        }

        info!(
            subsystem = "sync",
            component = "reconcile",
            note_count = report.scanned,
            synced = report.synced,
            failed = report.failed,
            duration_ms = started.elapsed().as_millis() as u64,
            "Reconcile finished"
        );
        Ok(report)
    }
}
