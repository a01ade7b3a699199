//! Local File Backend
//!
//! Stores each slot as a plain file in the data directory.
//!
//! ## Commit Protocol
//! ```text
//! write:   payload ──► temp.dat (flush + fsync)
//! commit:  1. <slot>      ══hard link══► <slot>.rot   (snapshot gen N)
//!          2. temp.dat    ══rename═════► <slot>       (gen N+1, atomic)
//!          3. <slot>.rot  ══rename═════► <slot>.bak   (gen N, atomic)
//!          4. fsync directory
//! ```
//!
//! A crash at any point leaves `<slot>` holding either generation N or
//! generation N+1 in full. The next `initialize` settles what is left:
//! `temp.dat` is discarded, and a `<slot>.rot` that no longer matches
//! `<slot>` (step 2 happened, step 3 did not) is renamed over the backup.
//! A `.rot` still identical to `<slot>` is dropped.
//!
//! With the shared backup scope, `backup.owner` records which slot the
//! backup belongs to, along with the length and CRC32 of the backup it
//! describes. A slot only recovers from a backup it owns.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{BackupScope, Config, FrameFormat, SyncPolicy};
use crate::error::{Result, SaveError};
use crate::record::{frame, SlotName};

use super::{
    remove_file_if_exists, sync_dir, write_file, BackendSession, OpenMode, StorageBackend,
};

/// Advisory lock held for the lifetime of each session
const LOCK_FILE: &str = ".durasave.lock";

/// Backup file name when every slot shares one backup generation
const SHARED_BACKUP_FILE: &str = "backup.dat";

/// Owner of the shared backup
const SHARED_OWNER_FILE: &str = "backup.owner";

const BACKUP_SUFFIX: &str = ".bak";
const ROTATION_SUFFIX: &str = ".rot";

/// Which slot the shared backup holds a generation of
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
struct BackupOwner {
    slot: String,
    len: u64,
    crc: u32,
}

/// Plain-filesystem storage backend
#[derive(Debug)]
pub struct LocalFileBackend {
    /// Directory holding primary, backup, and scratch files
    dir: PathBuf,

    frame_format: FrameFormat,
    expected_len: Option<usize>,
    backup_scope: BackupScope,
    staging_name: String,
    sync_policy: SyncPolicy,
}

impl LocalFileBackend {
    pub fn new(config: &Config) -> Self {
        Self {
            dir: config.data_dir.clone(),
            frame_format: config.frame_format,
            expected_len: config.expected_len,
            backup_scope: config.backup_scope,
            staging_name: config.staging_name.clone(),
            sync_policy: config.sync_policy,
        }
    }

    /// Directory this backend stores files in
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // =========================================================================
    // Path Layout
    // =========================================================================

    pub fn primary_path(&self, slot: &SlotName) -> PathBuf {
        self.dir.join(slot.as_str())
    }

    pub fn backup_path(&self, slot: &SlotName) -> PathBuf {
        match self.backup_scope {
            BackupScope::Shared => self.dir.join(SHARED_BACKUP_FILE),
            BackupScope::PerSlot => self.dir.join(format!("{}{}", slot, BACKUP_SUFFIX)),
        }
    }

    pub fn staging_path(&self) -> PathBuf {
        self.dir.join(&self.staging_name)
    }

    fn rotation_path(&self, slot: &SlotName) -> PathBuf {
        self.dir.join(format!("{}{}", slot, ROTATION_SUFFIX))
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    fn owner_path(&self) -> PathBuf {
        self.dir.join(SHARED_OWNER_FILE)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Reject slot names that would alias one of our own files
    fn check_slot(&self, slot: &SlotName) -> Result<()> {
        let name = slot.as_str();
        let reserved = name == LOCK_FILE
            || name == self.staging_name
            || name == SHARED_BACKUP_FILE
            || name == SHARED_OWNER_FILE
            || name.ends_with(BACKUP_SUFFIX)
            || name.ends_with(ROTATION_SUFFIX);

        if reserved {
            return Err(SaveError::InvalidSlot(name.to_string()));
        }
        Ok(())
    }

    /// Take the directory lock, failing fast if another process holds it
    fn acquire_lock(&self) -> Result<File> {
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(|e| SaveError::Mount(format!("cannot open lock file: {}", e)))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(SaveError::Mount(format!(
                "save directory {} is busy",
                self.dir.display()
            )));
        }

        Ok(lock_file)
    }

    fn sync_dir(&self) -> io::Result<()> {
        if self.sync_policy.should_sync() {
            sync_dir(&self.dir)?;
        }
        Ok(())
    }

    /// Whether the current primary decodes cleanly
    ///
    /// A primary that fails this check is not demoted into the backup slot,
    /// so a good backup is never replaced by a corrupt generation.
    fn primary_is_sound(&self, slot: &SlotName) -> bool {
        match fs::read(self.primary_path(slot)) {
            Ok(data) => frame::unseal(self.frame_format, self.expected_len, data).is_ok(),
            Err(_) => false,
        }
    }

    /// Snapshot `src` at `dst`, preferring a hard link over a copy
    fn snapshot(&self, src: &Path, dst: &Path) -> io::Result<()> {
        remove_file_if_exists(dst)?;
        if fs::hard_link(src, dst).is_ok() {
            return Ok(());
        }

        // Filesystems without hard links (FAT, some network mounts)
        fs::copy(src, dst)?;
        if self.sync_policy.should_sync() {
            File::open(dst)?.sync_all()?;
        }
        Ok(())
    }

    /// Whether a backup generation of `slot` exists
    ///
    /// Per-slot backups always belong to their slot. The shared backup only
    /// counts when its owner record names `slot` and still matches it.
    fn backup_owned_by(&self, slot: &SlotName) -> bool {
        match self.backup_scope {
            BackupScope::PerSlot => self.backup_path(slot).is_file(),
            BackupScope::Shared => match self.shared_backup_owner() {
                Some(owner) => owner.slot == slot.as_str(),
                None => false,
            },
        }
    }

    /// Owner of the shared backup, if the owner record is intact and
    /// describes the backup currently on disk
    fn shared_backup_owner(&self) -> Option<BackupOwner> {
        let record = fs::read(self.owner_path()).ok()?;
        let owner: BackupOwner = bincode::deserialize(&record).ok()?;

        let backup = fs::read(self.dir.join(SHARED_BACKUP_FILE)).ok()?;
        if owner.len != backup.len() as u64 || owner.crc != crc32fast::hash(&backup) {
            debug!(owner = %owner.slot, "Shared backup does not match its owner record");
            return None;
        }

        Some(owner)
    }

    /// Record `slot` as the owner of the shared backup just rotated in
    fn record_backup_owner(&self, slot: &SlotName) -> Result<()> {
        if self.backup_scope != BackupScope::Shared {
            return Ok(());
        }

        let backup = fs::read(self.backup_path(slot))?;
        let owner = BackupOwner {
            slot: slot.to_string(),
            len: backup.len() as u64,
            crc: crc32fast::hash(&backup),
        };
        let record = bincode::serialize(&owner)?;

        write_file(&self.owner_path(), &record, self.sync_policy.should_sync())?;
        self.sync_dir()?;
        Ok(())
    }

    /// Settle scratch files an interrupted save may have left behind
    fn sweep_scratch(&self) -> Result<()> {
        if remove_file_if_exists(&self.staging_path())? {
            warn!(
                staging = %self.staging_path().display(),
                "Discarded staged data from an interrupted save"
            );
        }

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            let slot = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_suffix(ROTATION_SUFFIX))
                .map(SlotName::parse);

            match slot {
                Some(Ok(slot)) => self.settle_rotation(&slot, &path)?,
                Some(Err(_)) => {
                    debug!(path = %path.display(), "Removing unrecognized rotation file");
                    fs::remove_file(&path)?;
                }
                None => {}
            }
        }

        Ok(())
    }

    /// Finish or drop a rotation snapshot left by an interrupted commit
    fn settle_rotation(&self, slot: &SlotName, rotation: &Path) -> Result<()> {
        let snapshot = fs::read(rotation)?;

        // The snapshot differs from the primary only once the staged
        // generation has been renamed over it
        let promoted = match fs::read(self.primary_path(slot)) {
            Ok(current) => current != snapshot,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };

        if promoted {
            warn!(slot = %slot, "Completing interrupted backup rotation");
            fs::rename(rotation, self.backup_path(slot))?;
            self.sync_dir()?;
            self.record_backup_owner(slot)?;
        } else {
            debug!(slot = %slot, "Removing stale rotation snapshot");
            fs::remove_file(rotation)?;
        }

        Ok(())
    }
}

impl StorageBackend for LocalFileBackend {
    fn name(&self) -> &'static str {
        "local-file"
    }

    fn initialize(&mut self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let _lock = self.acquire_lock()?;
        self.sweep_scratch()?;

        info!(dir = %self.dir.display(), "Local file backend ready");
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        debug!(dir = %self.dir.display(), "Local file backend shut down");
        Ok(())
    }

    fn open<'a>(
        &'a mut self,
        slot: &SlotName,
        mode: OpenMode,
    ) -> Result<Box<dyn BackendSession + 'a>> {
        self.check_slot(slot)?;

        if !self.dir.is_dir() {
            return Err(SaveError::Mount(format!(
                "save directory {} does not exist",
                self.dir.display()
            )));
        }

        let lock = self.acquire_lock()?;

        Ok(Box::new(LocalSession {
            backend: self,
            slot: slot.clone(),
            mode,
            lock: Some(lock),
            staged: false,
        }))
    }

    fn has_backup(&mut self, slot: &SlotName) -> Result<bool> {
        self.check_slot(slot)?;
        Ok(self.backup_owned_by(slot))
    }

    fn restore_backup(&mut self, slot: &SlotName) -> Result<()> {
        self.check_slot(slot)?;
        let _lock = self.acquire_lock()?;

        if !self.backup_owned_by(slot) {
            return Err(SaveError::BackupUnavailable(slot.to_string()));
        }
        let backup = self.backup_path(slot);

        // Stage a copy and rename it in, so the primary is never half-restored
        let staging = self.staging_path();
        let data = fs::read(&backup)?;
        write_file(&staging, &data, self.sync_policy.should_sync())?;
        fs::rename(&staging, self.primary_path(slot))?;
        self.sync_dir()?;

        info!(slot = %slot, bytes = data.len(), "Restored primary from backup");
        Ok(())
    }

    fn delete(&mut self, slot: &SlotName) -> Result<()> {
        self.check_slot(slot)?;
        let _lock = self.acquire_lock()?;

        let removed_primary = remove_file_if_exists(&self.primary_path(slot))?;

        // A shared backup may belong to another slot's history
        let removed_backup = if self.backup_owned_by(slot) {
            let removed = remove_file_if_exists(&self.backup_path(slot))?;
            remove_file_if_exists(&self.owner_path())?;
            removed
        } else {
            false
        };

        self.sync_dir()?;

        debug!(slot = %slot, removed_primary, removed_backup, "Deleted slot");
        Ok(())
    }
}

// =============================================================================
// Session
// =============================================================================

/// Exclusive access to one slot of a `LocalFileBackend`
struct LocalSession<'a> {
    backend: &'a LocalFileBackend,
    slot: SlotName,
    mode: OpenMode,
    /// Directory lock; released when dropped
    lock: Option<File>,
    /// Staging file holds bytes not yet committed
    staged: bool,
}

impl LocalSession<'_> {
    fn ensure_open(&self) -> Result<()> {
        if self.lock.is_none() {
            return Err(SaveError::Mount("session already closed".to_string()));
        }
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        let mut result = Ok(());

        if self.staged {
            self.staged = false;
            if let Err(e) = remove_file_if_exists(&self.backend.staging_path()) {
                result = Err(SaveError::Io(e));
            } else {
                debug!(slot = %self.slot, "Discarded uncommitted staging file");
            }
        }

        if let Some(lock) = self.lock.take() {
            if let Err(e) = FileExt::unlock(&lock) {
                result = result.and(Err(SaveError::Io(e)));
            }
        }

        result
    }
}

impl BackendSession for LocalSession<'_> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if self.mode != OpenMode::ReadWrite {
            return Err(SaveError::Mount(format!(
                "slot '{}' opened read-only",
                self.slot
            )));
        }

        let data = frame::seal(self.backend.frame_format, bytes)?;
        let staging = self.backend.staging_path();

        self.staged = true;
        if let Err(e) = write_file(&staging, &data, self.backend.sync_policy.should_sync()) {
            warn!(slot = %self.slot, error = %e, "Staging write failed");
            return Err(SaveError::Io(e));
        }

        debug!(slot = %self.slot, bytes = data.len(), "Staged new generation");
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.staged {
            return Err(SaveError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "commit without staged data",
            )));
        }

        let backend = self.backend;
        let primary = backend.primary_path(&self.slot);
        let rotation = backend.rotation_path(&self.slot);
        let backup = backend.backup_path(&self.slot);

        // Step 1: Snapshot generation N before it is replaced
        let rotate = primary.is_file() && backend.primary_is_sound(&self.slot);
        if rotate {
            backend.snapshot(&primary, &rotation)?;
        } else if primary.exists() {
            warn!(slot = %self.slot, "Current primary is unreadable; keeping existing backup");
        }

        // Step 2: Atomically promote the staged generation
        fs::rename(backend.staging_path(), &primary)?;
        self.staged = false;
        backend.sync_dir()?;

        // Step 3: Atomically demote generation N into the backup slot
        if rotate {
            fs::rename(&rotation, &backup)?;
            backend.sync_dir()?;
            backend.record_backup_owner(&self.slot)?;
            debug!(slot = %self.slot, backup = %backup.display(), "Rotated backup");
        }

        Ok(())
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        self.ensure_open()?;

        match fs::read(self.backend.primary_path(&self.slot)) {
            Ok(data) => {
                frame::unseal(self.backend.frame_format, self.backend.expected_len, data)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Absence only counts as corruption when there is history to recover
                if self.backend.backup_owned_by(&self.slot) {
                    Err(SaveError::CorruptionDetected(format!(
                        "primary '{}' missing but a backup exists",
                        self.slot
                    )))
                } else {
                    Err(SaveError::NotFound(self.slot.to_string()))
                }
            }
            Err(e) => Err(SaveError::CorruptionDetected(format!(
                "primary '{}' unreadable: {}",
                self.slot, e
            ))),
        }
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.release()
    }
}

impl Drop for LocalSession<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(slot = %self.slot, error = %e, "Failed to release session");
        }
    }
}
