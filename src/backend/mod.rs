//! Storage Backend Module
//!
//! The primitive operations the recovery protocol is built on.
//!
//! ## Responsibilities
//! - Acquire and release exclusive access to a slot (`open` / `close`)
//! - Stage new bytes away from the primary copy (`write`)
//! - Promote staged bytes and rotate the previous primary into the backup
//!   generation (`commit`)
//! - Read the primary, report absence vs. corruption (`read`)
//! - Check for and restore the backup generation
//!
//! ## Variants
//! ```text
//! ┌──────────────────────┐     ┌──────────────────────────────┐
//! │   LocalFileBackend   │     │  ContainerBackend<M>         │
//! │  staging + 2 renames │     │  mount / unmount-with-backup │
//! └──────────────────────┘     └──────────────┬───────────────┘
//!                                             │
//!                                   ┌─────────▼─────────┐
//!                                   │ ContainerManager  │
//!                                   │ (platform API)    │
//!                                   └───────────────────┘
//! ```

mod local;
pub mod container;

use std::fs::File;
use std::io;
use std::path::Path;

use crate::config::{BackendKind, Config};
use crate::error::Result;
use crate::record::SlotName;

pub use container::{ContainerBackend, DirContainerManager};
pub use local::LocalFileBackend;

/// Access mode requested when opening a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read the primary copy
    ReadOnly,

    /// Stage and commit a new generation
    ReadWrite,
}

/// A storage substrate that can hold primary and backup generations
///
/// Implementations are driven by a single caller at a time; `&mut self`
/// on every operation makes the one-session-per-backend rule static.
pub trait StorageBackend: Send {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Establish whatever process-level session the substrate needs
    fn initialize(&mut self) -> Result<()>;

    /// Tear down the session created by `initialize`
    fn shutdown(&mut self) -> Result<()>;

    /// Acquire exclusive access to a slot
    ///
    /// Fails with `Mount` if the location is busy or the session cannot be
    /// established, `NotFound` if a read-only open finds nothing, and
    /// `CorruptionDetected` if the substrate detects corruption at open time.
    fn open<'a>(&'a mut self, slot: &SlotName, mode: OpenMode)
        -> Result<Box<dyn BackendSession + 'a>>;

    /// Whether a backup generation exists for `slot`
    fn has_backup(&mut self, slot: &SlotName) -> Result<bool>;

    /// Copy the backup generation over the primary
    fn restore_backup(&mut self, slot: &SlotName) -> Result<()>;

    /// Remove a slot's stored data
    fn delete(&mut self, slot: &SlotName) -> Result<()>;
}

/// Scoped access to one slot
///
/// Dropping a session without calling `close` still releases it; any bytes
/// staged but not committed are discarded.
pub trait BackendSession {
    /// Stage `bytes` where they are not yet visible as the primary
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Make the staged bytes the primary and rotate the backup
    fn commit(&mut self) -> Result<()>;

    /// Read the full primary copy
    fn read(&mut self) -> Result<Vec<u8>>;

    /// Release the session, reporting any release failure
    fn close(self: Box<Self>) -> Result<()>;
}

/// Build the backend selected by `config`
pub fn from_config(config: &Config) -> Box<dyn StorageBackend> {
    match config.backend {
        BackendKind::LocalFile => Box::new(LocalFileBackend::new(config)),
        BackendKind::MountedContainer => {
            let manager = DirContainerManager::new(&config.data_dir, config.sync_policy);
            Box::new(ContainerBackend::new(manager, config))
        }
    }
}

// =============================================================================
// Shared Filesystem Helpers
// =============================================================================

/// Fsync a directory so renames and unlinks inside it are durable
#[cfg(unix)]
pub(crate) fn sync_dir(path: &Path) -> io::Result<()> {
    let dir = File::open(path)?;
    dir.sync_all()
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_path: &Path) -> io::Result<()> {
    // NTFS journals metadata; directory handles cannot be fsynced
    Ok(())
}

/// Remove a file, treating "already gone" as success
pub(crate) fn remove_file_if_exists(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Remove a directory tree, treating "already gone" as success
pub(crate) fn remove_dir_if_exists(path: &Path) -> io::Result<bool> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Write `data` to a fresh file at `path`, optionally fsyncing it
///
/// A short write is reported as `WriteZero` rather than left on disk
/// looking complete.
pub(crate) fn write_file(path: &Path, data: &[u8], sync: bool) -> io::Result<()> {
    use std::io::Write;

    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.flush()?;
    if sync {
        file.sync_all()?;
    }

    let written = file.metadata()?.len();
    if written != data.len() as u64 {
        return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("short write: {} of {} bytes", written, data.len()),
        ));
    }

    Ok(())
}
