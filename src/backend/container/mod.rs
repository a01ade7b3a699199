//! Mounted Container Backend
//!
//! Save data lives inside a platform-managed container that has to be
//! mounted before its files can be touched. The platform provides the
//! crash safety: a read-write mount is a private session, and unmounting it
//! with backup promotes the session and keeps the previous state as the
//! backup generation in a single step.
//!
//! ## Layers
//! - `ContainerManager` — the platform primitives (mount, unmount,
//!   unmount-with-backup, backup check/restore, delete)
//! - `DirContainerManager` — a filesystem implementation of those primitives
//! - `ContainerBackend` — adapts any manager to `StorageBackend`

mod backend;
mod manager;
mod manifest;

use std::path::PathBuf;

use thiserror::Error;

use crate::error::SaveError;

pub use backend::ContainerBackend;
pub use manager::DirContainerManager;
pub use manifest::{Manifest, ManifestEntry, MANIFEST_FILE};

/// Result type for container primitives
pub type ContainerResult<T> = std::result::Result<T, ContainerError>;

/// Error codes reported by container primitives
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container '{0}' is busy")]
    Busy(String),

    #[error("container '{0}' already exists")]
    Exists(String),

    #[error("container '{0}' not found")]
    NotFound(String),

    #[error("container '{0}' is broken: {1}")]
    Broken(String, String),

    #[error("container service not initialized")]
    NotInitialized,

    #[error("container IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ContainerError> for SaveError {
    fn from(err: ContainerError) -> Self {
        match err {
            ContainerError::Broken(name, reason) => {
                SaveError::CorruptionDetected(format!("container '{}': {}", name, reason))
            }
            ContainerError::NotFound(name) => SaveError::NotFound(name),
            ContainerError::Io(e) => SaveError::Io(e),
            other @ (ContainerError::Busy(_)
            | ContainerError::Exists(_)
            | ContainerError::NotInitialized) => SaveError::Mount(other.to_string()),
        }
    }
}

/// How a container is mounted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountMode {
    /// Create the container, then mount it read-write
    Create,

    /// Private read-write session over the committed state
    ReadWrite,

    /// Direct read-only view of the committed state
    ReadOnly,
}

impl MountMode {
    pub fn is_writable(&self) -> bool {
        !matches!(self, MountMode::ReadOnly)
    }
}

/// A mounted container; files are accessed relative to `path`
#[derive(Debug)]
pub struct MountPoint {
    dir_name: String,
    path: PathBuf,
    mode: MountMode,
}

impl MountPoint {
    pub fn dir_name(&self) -> &str {
        &self.dir_name
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn mode(&self) -> MountMode {
        self.mode
    }
}

/// Platform save-container primitives
pub trait ContainerManager: Send {
    /// Bring up the platform save-data service for the current user
    ///
    /// Calling it on an already-initialized manager succeeds.
    fn initialize(&mut self) -> ContainerResult<()>;

    /// Shut the save-data service down
    fn terminate(&mut self) -> ContainerResult<()>;

    fn mount(&mut self, dir_name: &str, mode: MountMode) -> ContainerResult<MountPoint>;

    /// Release a mount; a read-write session is discarded
    fn unmount(&mut self, mount: MountPoint) -> ContainerResult<()>;

    /// Release a read-write mount, promoting its contents and keeping the
    /// previously committed state as the backup generation
    fn unmount_with_backup(&mut self, mount: MountPoint) -> ContainerResult<()>;

    /// `Ok` if a backup generation exists, `NotFound` otherwise
    fn check_backup(&mut self, dir_name: &str) -> ContainerResult<()>;

    /// Replace the committed state with the backup generation
    fn restore_backup(&mut self, dir_name: &str) -> ContainerResult<()>;

    /// Remove the container and its backup
    fn delete(&mut self, dir_name: &str) -> ContainerResult<()>;
}
