//! Save path
//!
//! Stages, commits, and closes. The reported success reflects the write
//! stream: a commit failure is logged and surfaced through `SaveOutcome`,
//! but `SaveOutcome::is_success` still reports the save as written.

use tracing::{debug, error, warn};

use crate::backend::{OpenMode, StorageBackend};
use crate::record::{Record, SlotName};

/// How far a save got
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Bytes are the new primary and the backup was rotated
    Committed,

    /// Bytes were written but promoting them or rotating the backup failed
    CommitFailed,

    /// The backend could not be opened or the write stream failed;
    /// primary and backup are untouched
    WriteFailed,

    /// The request was refused before any I/O
    Rejected,
}

impl SaveOutcome {
    /// The boolean the public `save` contract reports
    pub fn is_success(&self) -> bool {
        matches!(self, SaveOutcome::Committed | SaveOutcome::CommitFailed)
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, SaveOutcome::Committed)
    }
}

/// Persist `record` as the new generation of `slot`
pub fn save_record(
    backend: &mut dyn StorageBackend,
    record: &Record,
    slot: &SlotName,
) -> SaveOutcome {
    // Step 1: Reject records that would read back as "absent"
    if !record.is_valid() {
        warn!(slot = %slot, "Refusing to save an invalid record");
        return SaveOutcome::Rejected;
    }

    let backend_name = backend.name();

    // Step 2: Open for write
    let mut session = match backend.open(slot, OpenMode::ReadWrite) {
        Ok(session) => session,
        Err(e) => {
            warn!(slot = %slot, backend = backend_name, error = %e, "Failed to open slot for writing");
            return SaveOutcome::WriteFailed;
        }
    };

    // Step 3: Stage the bytes
    if let Err(e) = session.write(record.bytes()) {
        warn!(slot = %slot, backend = backend_name, error = %e, "Write failed; previous generation kept");
        if let Err(close_err) = session.close() {
            warn!(slot = %slot, error = %close_err, "Failed to close slot after write failure");
        }
        return SaveOutcome::WriteFailed;
    }

    // Step 4: Commit and rotate
    let outcome = match session.commit() {
        Ok(()) => SaveOutcome::Committed,
        Err(e) => {
            error!(slot = %slot, backend = backend_name, error = %e, "Commit failed after a successful write");
            SaveOutcome::CommitFailed
        }
    };

    // Step 5: Close
    if let Err(e) = session.close() {
        warn!(slot = %slot, error = %e, "Failed to close slot");
    }

    debug!(slot = %slot, bytes = record.len(), outcome = ?outcome, "Save finished");
    outcome
}
