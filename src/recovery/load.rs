//! Load path
//!
//! Reads the primary; on corruption restores the backup over it and tries
//! again, at most `MAX_RESTORE_ATTEMPTS` times. Every failure ends in an
//! invalid `Record`, never an error.

use tracing::{debug, info, warn};

use crate::backend::{OpenMode, StorageBackend};
use crate::error::{Result, SaveError};
use crate::record::{Record, SlotName};

/// Backup restores allowed per load
pub const MAX_RESTORE_ATTEMPTS: u32 = 1;

/// What happened during a load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Number of backup restores performed
    pub restore_attempts: u32,

    /// Whether the returned bytes came from a restored backup
    pub restored_from_backup: bool,

    /// Payload size returned (0 on failure)
    pub bytes: usize,

    /// Why the load failed, if it did
    pub failure: Option<String>,
}

impl LoadReport {
    fn fail(mut self, err: &SaveError) -> (Record, LoadReport) {
        self.failure = Some(err.to_string());
        (Record::invalid(), self)
    }
}

/// Load the current generation of `slot`, falling back to its backup
pub fn load_record(backend: &mut dyn StorageBackend, slot: &SlotName) -> (Record, LoadReport) {
    let mut report = LoadReport::default();

    loop {
        let err = match read_primary(backend, slot) {
            Ok(bytes) => {
                report.bytes = bytes.len();
                report.restored_from_backup = report.restore_attempts > 0;
                debug!(slot = %slot, bytes = report.bytes, "Loaded slot");
                return (Record::new(bytes), report);
            }
            Err(e) => e,
        };

        if !err.is_corruption() {
            match &err {
                SaveError::NotFound(_) => debug!(slot = %slot, "No save data for slot"),
                _ => warn!(slot = %slot, error = %err, "Failed to load slot"),
            }
            return report.fail(&err);
        }

        warn!(slot = %slot, error = %err, "Save data is corrupted");

        if report.restore_attempts >= MAX_RESTORE_ATTEMPTS {
            warn!(slot = %slot, "Restored backup is unreadable too; giving up");
            return report.fail(&err);
        }

        match backend.has_backup(slot) {
            Ok(true) => {}
            Ok(false) => {
                let err = SaveError::BackupUnavailable(slot.to_string());
                info!(slot = %slot, "No backup exists");
                return report.fail(&err);
            }
            Err(e) => {
                warn!(slot = %slot, error = %e, "Failed to check for backup");
                return report.fail(&e);
            }
        }

        report.restore_attempts += 1;
        info!(slot = %slot, attempt = report.restore_attempts, "Restoring backup");

        if let Err(e) = backend.restore_backup(slot) {
            warn!(slot = %slot, error = %e, "Backup restore failed");
            return report.fail(&e);
        }
    }
}

/// Open read-only, read, close; the session is closed on every path
fn read_primary(backend: &mut dyn StorageBackend, slot: &SlotName) -> Result<Vec<u8>> {
    let mut session = backend.open(slot, OpenMode::ReadOnly)?;
    let result = session.read();

    if let Err(e) = session.close() {
        warn!(slot = %slot, error = %e, "Failed to close slot after read");
    }

    result
}
