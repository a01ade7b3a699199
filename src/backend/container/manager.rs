//! Directory Container Manager
//!
//! Implements the container primitives on top of plain directories, for
//! desktop builds and for tests.
//!
//! ## Layout
//! ```text
//! {root}/
//!   ├── SAVEDATA00/        committed state (sealed with MANIFEST)
//!   ├── SAVEDATA00.mnt/    private read-write session
//!   ├── SAVEDATA00.bak/    backup generation
//!   ├── SAVEDATA00.old/    previous state during a commit swap
//!   └── SAVEDATA00.new/    staged copy during a restore
//! ```
//!
//! The committed directory is only ever replaced by rename. If a crash
//! interrupts a swap, the next mount rolls back to `.old` (or forward to a
//! fully staged `.new`). If the swap finished but `.old` was never demoted,
//! the next mount demotes it into `.bak`.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{remove_dir_if_exists, sync_dir};
use crate::config::SyncPolicy;

use super::{
    ContainerError, ContainerManager, ContainerResult, Manifest, MountMode, MountPoint,
};

const SESSION_SUFFIX: &str = ".mnt";
const BACKUP_SUFFIX: &str = ".bak";
const OLD_SUFFIX: &str = ".old";
const STAGED_SUFFIX: &str = ".new";

/// Filesystem-backed container manager
///
/// Clones share one mount table, the way every caller in a process shares
/// the platform's container service.
#[derive(Debug, Clone)]
pub struct DirContainerManager {
    root: PathBuf,
    sync_policy: SyncPolicy,
    /// Containers currently mounted through any clone
    mounts: Arc<Mutex<HashSet<String>>>,
    initialized: bool,
}

impl DirContainerManager {
    pub fn new(root: impl Into<PathBuf>, sync_policy: SyncPolicy) -> Self {
        Self {
            root: root.into(),
            sync_policy,
            mounts: Arc::new(Mutex::new(HashSet::new())),
            initialized: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the committed state of `dir_name`
    pub fn committed_path(&self, dir_name: &str) -> PathBuf {
        self.root.join(dir_name)
    }

    /// Path of the backup generation of `dir_name`
    pub fn backup_path(&self, dir_name: &str) -> PathBuf {
        self.sibling(dir_name, BACKUP_SUFFIX)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_mounted(&self, dir_name: &str) -> bool {
        self.mounts.lock().contains(dir_name)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn sibling(&self, dir_name: &str, suffix: &str) -> PathBuf {
        self.root.join(format!("{}{}", dir_name, suffix))
    }

    fn ensure_initialized(&self) -> ContainerResult<()> {
        if !self.initialized {
            return Err(ContainerError::NotInitialized);
        }
        Ok(())
    }

    fn ensure_unmounted(&self, dir_name: &str) -> ContainerResult<()> {
        if self.is_mounted(dir_name) {
            return Err(ContainerError::Busy(dir_name.to_string()));
        }
        Ok(())
    }

    fn sync_root(&self) -> io::Result<()> {
        if self.sync_policy.should_sync() {
            sync_dir(&self.root)?;
        }
        Ok(())
    }

    /// Flat copy of every regular file in `src` into a fresh `dst`
    fn copy_dir(&self, src: &Path, dst: &Path) -> io::Result<()> {
        remove_dir_if_exists(dst)?;
        fs::create_dir_all(dst)?;

        for entry in fs::read_dir(src)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() {
                let target = dst.join(entry.file_name());
                fs::copy(&path, &target)?;
                if self.sync_policy.should_sync() {
                    File::open(&target)?.sync_all()?;
                }
            }
        }

        if self.sync_policy.should_sync() {
            sync_dir(dst)?;
        }
        Ok(())
    }

    /// Finish or roll back a swap a crash interrupted
    fn recover_interrupted_swap(&self, dir_name: &str) -> io::Result<()> {
        let committed = self.committed_path(dir_name);
        let old = self.sibling(dir_name, OLD_SUFFIX);
        let staged = self.sibling(dir_name, STAGED_SUFFIX);

        if !committed.exists() {
            if old.is_dir() {
                warn!(container = dir_name, "Rolling back interrupted commit");
                fs::rename(&old, &committed)?;
                self.sync_root()?;
            } else if staged.is_dir() && Manifest::verify(&staged).is_ok() {
                warn!(container = dir_name, "Completing interrupted restore");
                fs::rename(&staged, &committed)?;
                self.sync_root()?;
            }
        } else if old.is_dir() {
            // `.old` only exists next to a committed state once the session
            // has been swapped in; what is left is the demotion
            warn!(container = dir_name, "Completing interrupted backup rotation");
            self.demote_previous(dir_name)?;
        }

        remove_dir_if_exists(&old)?;
        remove_dir_if_exists(&staged)?;
        Ok(())
    }

    /// Move `.old` into the backup generation, unless it is broken
    fn demote_previous(&self, dir_name: &str) -> io::Result<()> {
        let old = self.sibling(dir_name, OLD_SUFFIX);
        let backup = self.backup_path(dir_name);

        if Manifest::verify(&old).is_ok() {
            remove_dir_if_exists(&backup)?;
            fs::rename(&old, &backup)?;
            debug!(container = dir_name, "Rotated previous state into backup");
        } else {
            warn!(container = dir_name, "Previous state was broken; keeping existing backup");
            remove_dir_if_exists(&old)?;
        }

        self.sync_root()
    }

    /// Check the committed state, mapping damage to `Broken`
    fn verify_committed(&self, dir_name: &str) -> ContainerResult<()> {
        let committed = self.committed_path(dir_name);
        if !committed.is_dir() {
            return Err(ContainerError::NotFound(dir_name.to_string()));
        }

        Manifest::verify(&committed)
            .map(|_| ())
            .map_err(|reason| ContainerError::Broken(dir_name.to_string(), reason))
    }

    /// Open a private read-write session over the committed state
    fn open_session(&self, dir_name: &str) -> ContainerResult<PathBuf> {
        let session = self.sibling(dir_name, SESSION_SUFFIX);
        self.copy_dir(&self.committed_path(dir_name), &session)?;
        Ok(session)
    }

    fn release(&self, dir_name: &str) {
        self.mounts.lock().remove(dir_name);
    }

    /// Seal the session and swap it in as the committed state
    fn promote_session(&self, mount: &MountPoint) -> ContainerResult<()> {
        let dir_name = mount.dir_name();
        let committed = self.committed_path(dir_name);
        let old = self.sibling(dir_name, OLD_SUFFIX);

        Manifest::seal(mount.path(), self.sync_policy.should_sync())?;
        if self.sync_policy.should_sync() {
            sync_dir(mount.path())?;
        }

        // Step 1: Move the current state aside, then move the session in
        remove_dir_if_exists(&old)?;
        fs::rename(&committed, &old)?;
        fs::rename(mount.path(), &committed)?;
        self.sync_root()?;

        // Step 2: The previous state becomes the backup generation
        self.demote_previous(dir_name)?;

        Ok(())
    }
}

impl ContainerManager for DirContainerManager {
    fn initialize(&mut self) -> ContainerResult<()> {
        if self.initialized {
            debug!(root = %self.root.display(), "Container service already initialized");
            return Ok(());
        }

        fs::create_dir_all(&self.root)?;
        self.initialized = true;

        info!(root = %self.root.display(), "Container service initialized");
        Ok(())
    }

    fn terminate(&mut self) -> ContainerResult<()> {
        self.ensure_initialized()?;
        self.initialized = false;

        info!(root = %self.root.display(), "Container service terminated");
        Ok(())
    }

    fn mount(&mut self, dir_name: &str, mode: MountMode) -> ContainerResult<MountPoint> {
        self.ensure_initialized()?;

        // Claim the mount before touching anything on disk
        {
            let mut mounts = self.mounts.lock();
            if !mounts.insert(dir_name.to_string()) {
                return Err(ContainerError::Busy(dir_name.to_string()));
            }
        }

        let result = self.mount_claimed(dir_name, mode);
        if result.is_err() {
            self.release(dir_name);
        }
        result
    }

    fn unmount(&mut self, mount: MountPoint) -> ContainerResult<()> {
        let dir_name = mount.dir_name().to_string();

        let result = if mount.mode().is_writable() {
            // Uncommitted session state is thrown away
            remove_dir_if_exists(mount.path())
                .map(|_| ())
                .map_err(ContainerError::from)
        } else {
            Ok(())
        };

        self.release(&dir_name);
        debug!(container = %dir_name, mode = ?mount.mode(), "Unmounted");
        result
    }

    fn unmount_with_backup(&mut self, mount: MountPoint) -> ContainerResult<()> {
        if !mount.mode().is_writable() {
            return self.unmount(mount);
        }

        let dir_name = mount.dir_name().to_string();
        let result = self.promote_session(&mount);

        if let Err(e) = &result {
            warn!(container = %dir_name, error = %e, "Commit failed; discarding session");
            if let Err(cleanup) = remove_dir_if_exists(mount.path()) {
                warn!(container = %dir_name, error = %cleanup, "Failed to discard session");
            }
        }
        self.release(&dir_name);

        if result.is_ok() {
            debug!(container = %dir_name, "Unmounted with backup");
        }
        result
    }

    fn check_backup(&mut self, dir_name: &str) -> ContainerResult<()> {
        self.ensure_initialized()?;

        if self.backup_path(dir_name).is_dir() {
            Ok(())
        } else {
            Err(ContainerError::NotFound(format!("{}{}", dir_name, BACKUP_SUFFIX)))
        }
    }

    fn restore_backup(&mut self, dir_name: &str) -> ContainerResult<()> {
        self.ensure_initialized()?;
        self.ensure_unmounted(dir_name)?;
        self.check_backup(dir_name)?;

        let committed = self.committed_path(dir_name);
        let staged = self.sibling(dir_name, STAGED_SUFFIX);

        self.copy_dir(&self.backup_path(dir_name), &staged)?;
        remove_dir_if_exists(&committed)?;
        fs::rename(&staged, &committed)?;
        self.sync_root()?;

        info!(container = dir_name, "Restored container from backup");
        Ok(())
    }

    fn delete(&mut self, dir_name: &str) -> ContainerResult<()> {
        self.ensure_initialized()?;
        self.ensure_unmounted(dir_name)?;

        let existed = remove_dir_if_exists(&self.committed_path(dir_name))?;
        remove_dir_if_exists(&self.backup_path(dir_name))?;
        remove_dir_if_exists(&self.sibling(dir_name, SESSION_SUFFIX))?;
        self.sync_root()?;

        if !existed {
            return Err(ContainerError::NotFound(dir_name.to_string()));
        }
        Ok(())
    }
}

impl DirContainerManager {
    /// Mount body, run with the mount table entry already held
    fn mount_claimed(&self, dir_name: &str, mode: MountMode) -> ContainerResult<MountPoint> {
        self.recover_interrupted_swap(dir_name)?;

        let committed = self.committed_path(dir_name);

        let path = match mode {
            MountMode::Create => {
                if committed.exists() {
                    return Err(ContainerError::Exists(dir_name.to_string()));
                }
                fs::create_dir_all(&committed)?;
                Manifest::seal(&committed, self.sync_policy.should_sync())?;
                self.sync_root()?;
                info!(container = dir_name, "Created container");
                self.open_session(dir_name)?
            }
            MountMode::ReadWrite => {
                self.verify_committed(dir_name)?;
                self.open_session(dir_name)?
            }
            MountMode::ReadOnly => {
                self.verify_committed(dir_name)?;
                committed
            }
        };

        debug!(container = dir_name, mode = ?mode, "Mounted");
        Ok(MountPoint {
            dir_name: dir_name.to_string(),
            path,
            mode,
        })
    }
}
