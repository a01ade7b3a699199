//! Container Backend
//!
//! Adapts a `ContainerManager` to `StorageBackend`. Every slot of a save
//! profile is a file inside one container; the container, not the file, is
//! the unit of backup and corruption.
//!
//! Loads leave a broken container alone once its backup is exhausted.
//! Writes do not: a write to a broken container first restores the backup,
//! and if that is broken too, starts the container over empty.

use std::fs;
use std::io;

use tracing::{debug, error, info, warn};

use crate::backend::{write_file, BackendSession, OpenMode, StorageBackend};
use crate::config::{Config, FrameFormat, SyncPolicy};
use crate::error::{Result, SaveError};
use crate::record::{frame, SlotName};

use super::{ContainerError, ContainerManager, MountMode, MountPoint, MANIFEST_FILE};

/// Storage backend over a mounted save container
#[derive(Debug)]
pub struct ContainerBackend<M: ContainerManager> {
    manager: M,
    /// Fixed container name shared by all slots
    dir_name: String,
    frame_format: FrameFormat,
    expected_len: Option<usize>,
    sync_policy: SyncPolicy,
}

impl<M: ContainerManager> ContainerBackend<M> {
    pub fn new(manager: M, config: &Config) -> Self {
        Self {
            manager,
            dir_name: config.container_dir_name.clone(),
            frame_format: config.frame_format,
            expected_len: config.expected_len,
            sync_policy: config.sync_policy,
        }
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut M {
        &mut self.manager
    }

    pub fn dir_name(&self) -> &str {
        &self.dir_name
    }

    fn check_slot(&self, slot: &SlotName) -> Result<()> {
        if slot.as_str() == MANIFEST_FILE {
            return Err(SaveError::InvalidSlot(slot.to_string()));
        }
        Ok(())
    }

    fn terminate_quietly(&mut self) {
        if let Err(e) = self.manager.terminate() {
            warn!(container = %self.dir_name, error = %e, "Failed to terminate container service");
        }
    }

    fn unmount_quietly(&mut self, mount: MountPoint) {
        if let Err(e) = self.manager.unmount(mount) {
            warn!(container = %self.dir_name, error = %e, "Failed to unmount container");
        }
    }

    /// Mount read-write, recovering a broken container first
    fn mount_for_write(&mut self) -> Result<MountPoint> {
        match self.manager.mount(&self.dir_name, MountMode::ReadWrite) {
            Ok(mount) => Ok(mount),
            Err(ContainerError::Broken(_, reason)) => {
                warn!(container = %self.dir_name, reason = %reason, "Container is broken; recovering before write");
                self.recover_broken()?;
                Ok(self.manager.mount(&self.dir_name, MountMode::ReadWrite)?)
            }
            // A missing container on a write means initialize never ran
            Err(ContainerError::NotFound(name)) => {
                Err(SaveError::Mount(format!("container '{}' not found", name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Bring a broken container back to a mountable state
    fn recover_broken(&mut self) -> Result<()> {
        if self.manager.check_backup(&self.dir_name).is_ok() {
            self.manager.restore_backup(&self.dir_name)?;

            match self.manager.mount(&self.dir_name, MountMode::ReadOnly) {
                Ok(mount) => {
                    self.manager.unmount(mount)?;
                    info!(container = %self.dir_name, "Recovered broken container from backup");
                    return Ok(());
                }
                Err(ContainerError::Broken(_, reason)) => {
                    warn!(container = %self.dir_name, reason = %reason, "Backup is broken too");
                }
                Err(e) => return Err(e.into()),
            }
        }

        // Nothing usable is left; the next write starts a fresh generation
        match self.manager.delete(&self.dir_name) {
            Ok(()) | Err(ContainerError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        let mount = self.manager.mount(&self.dir_name, MountMode::Create)?;
        self.manager.unmount(mount)?;

        warn!(container = %self.dir_name, "Recreated empty container");
        Ok(())
    }
}

impl<M: ContainerManager> StorageBackend for ContainerBackend<M> {
    fn name(&self) -> &'static str {
        "mounted-container"
    }

    fn initialize(&mut self) -> Result<()> {
        self.manager.initialize()?;

        // First use creates the container; afterwards it already exists
        match self.manager.mount(&self.dir_name, MountMode::Create) {
            Ok(mount) => {
                if let Err(e) = self.manager.unmount(mount) {
                    error!(container = %self.dir_name, error = %e, "Failed to unmount new container");
                    self.terminate_quietly();
                    return Err(e.into());
                }
                info!(container = %self.dir_name, "Save container created");
            }
            Err(ContainerError::Exists(_)) | Err(ContainerError::Busy(_)) => {
                info!(container = %self.dir_name, "Save container already exists");
            }
            Err(e) => {
                error!(container = %self.dir_name, error = %e, "Failed to create save container");
                // Don't leak the service session on a half-finished initialize
                self.terminate_quietly();
                return Err(SaveError::Mount(e.to_string()));
            }
        }

        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.manager.terminate()?;
        Ok(())
    }

    fn open<'a>(
        &'a mut self,
        slot: &SlotName,
        mode: OpenMode,
    ) -> Result<Box<dyn BackendSession + 'a>> {
        self.check_slot(slot)?;

        let mount = match mode {
            OpenMode::ReadOnly => self.manager.mount(&self.dir_name, MountMode::ReadOnly)?,
            OpenMode::ReadWrite => self.mount_for_write()?,
        };

        Ok(Box::new(ContainerSession {
            manager: &mut self.manager,
            mount: Some(mount),
            slot: slot.clone(),
            frame_format: self.frame_format,
            expected_len: self.expected_len,
            sync_policy: self.sync_policy,
        }))
    }

    fn has_backup(&mut self, _slot: &SlotName) -> Result<bool> {
        match self.manager.check_backup(&self.dir_name) {
            Ok(()) => Ok(true),
            Err(ContainerError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn restore_backup(&mut self, slot: &SlotName) -> Result<()> {
        match self.manager.restore_backup(&self.dir_name) {
            Ok(()) => {
                info!(container = %self.dir_name, slot = %slot, "Restored container backup");
                Ok(())
            }
            Err(ContainerError::NotFound(_)) => Err(SaveError::BackupUnavailable(slot.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&mut self, slot: &SlotName) -> Result<()> {
        self.check_slot(slot)?;

        let mount = self.mount_for_write()?;

        let path = mount.path().join(slot.as_str());
        if let Err(e) = fs::remove_file(&path) {
            self.unmount_quietly(mount);
            if e.kind() == io::ErrorKind::NotFound {
                return Ok(());
            }
            return Err(e.into());
        }

        // Removing a slot is itself a new generation of the container
        self.manager.unmount_with_backup(mount)?;
        debug!(container = %self.dir_name, slot = %slot, "Deleted slot");
        Ok(())
    }
}

// =============================================================================
// Session
// =============================================================================

/// One mount of the container, scoped to a single slot
struct ContainerSession<'a, M: ContainerManager> {
    manager: &'a mut M,
    /// `None` once unmounted
    mount: Option<MountPoint>,
    slot: SlotName,
    frame_format: FrameFormat,
    expected_len: Option<usize>,
    sync_policy: SyncPolicy,
}

impl<M: ContainerManager> ContainerSession<'_, M> {
    fn mount(&self) -> Result<&MountPoint> {
        self.mount
            .as_ref()
            .ok_or_else(|| SaveError::Mount("container already unmounted".to_string()))
    }

    fn release(&mut self) -> Result<()> {
        match self.mount.take() {
            Some(mount) => self.manager.unmount(mount).map_err(SaveError::from),
            None => Ok(()),
        }
    }
}

impl<M: ContainerManager> BackendSession for ContainerSession<'_, M> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let mount = self.mount()?;
        if !mount.mode().is_writable() {
            return Err(SaveError::Mount(format!(
                "slot '{}' mounted read-only",
                self.slot
            )));
        }

        let data = frame::seal(self.frame_format, bytes)?;
        let path = mount.path().join(self.slot.as_str());

        write_file(&path, &data, self.sync_policy.should_sync()).map_err(|e| {
            warn!(slot = %self.slot, error = %e, "Slot write failed");
            SaveError::Io(e)
        })?;

        debug!(slot = %self.slot, bytes = data.len(), "Wrote slot into mounted session");
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let mount = self
            .mount
            .take()
            .ok_or_else(|| SaveError::Mount("container already unmounted".to_string()))?;

        self.manager.unmount_with_backup(mount)?;
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        let path = self.mount()?.path().join(self.slot.as_str());

        match fs::read(&path) {
            Ok(data) => frame::unseal(self.frame_format, self.expected_len, data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(SaveError::NotFound(self.slot.to_string()))
            }
            Err(e) => Err(SaveError::Io(e)),
        }
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.release()
    }
}

impl<M: ContainerManager> Drop for ContainerSession<'_, M> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(slot = %self.slot, error = %e, "Failed to unmount container");
        }
    }
}
