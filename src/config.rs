//! Configuration for Durasave
//!
//! Centralized configuration with sensible defaults. The backend variant is
//! chosen here once, at process start.

use std::path::PathBuf;

use crate::error::{Result, SaveError};
use crate::record::SlotName;

/// Main configuration for a Durasave store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all save data
    /// Internal structure (local file backend):
    ///   {data_dir}/
    ///     ├── <slot>            (primary copy)
    ///     ├── <slot>.bak        (backup, or backup.dat when shared)
    ///     ├── temp.dat          (staging file)
    ///     └── .durasave.lock    (advisory lock)
    pub data_dir: PathBuf,

    /// Which storage backend the store drives
    pub backend: BackendKind,

    /// On-disk representation of a record (local file backend)
    pub frame_format: FrameFormat,

    /// Exact payload size the reader expects, if known up front
    pub expected_len: Option<usize>,

    /// Where the backup generation lives (local file backend)
    pub backup_scope: BackupScope,

    /// Name of the staging file used between write and commit
    pub staging_name: String,

    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// Sync policy: whether staged data and directories are fsynced
    pub sync_policy: SyncPolicy,

    // -------------------------------------------------------------------------
    // Container Configuration
    // -------------------------------------------------------------------------
    /// Fixed container name shared by all slots of a save profile
    pub container_dir_name: String,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Plain files in `data_dir`
    LocalFile,

    /// Platform save-container mounted per operation
    MountedContainer,
}

/// Record representation on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// Payload bytes verbatim, no header
    Raw,

    /// Magic + version + length + CRC32 header in front of the payload
    Checksummed,
}

/// Backup placement for the local file backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupScope {
    /// One `<slot>.bak` per slot
    PerSlot,

    /// A single `backup.dat` shared by every slot
    Shared,
}

/// Fsync policy for staged data and directory entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// fsync staged files and the directory on every commit (safest, slowest)
    Always,

    /// Leave flushing to the OS (tests and benchmarks)
    Never,
}

impl SyncPolicy {
    pub fn should_sync(&self) -> bool {
        matches!(self, SyncPolicy::Always)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./durasave_data"),
            backend: BackendKind::LocalFile,
            frame_format: FrameFormat::Checksummed,
            expected_len: None,
            backup_scope: BackupScope::PerSlot,
            staging_name: "temp.dat".to_string(),
            sync_policy: SyncPolicy::Always,
            container_dir_name: "SAVEDATA00".to_string(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check settings that would otherwise fail deep inside a backend
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(SaveError::Config("data_dir is empty".to_string()));
        }

        // Both names become single path components under data_dir
        SlotName::parse(&self.staging_name)
            .map_err(|_| SaveError::Config(format!("invalid staging_name '{}'", self.staging_name)))?;
        SlotName::parse(&self.container_dir_name).map_err(|_| {
            SaveError::Config(format!(
                "invalid container_dir_name '{}'",
                self.container_dir_name
            ))
        })?;

        if self.expected_len == Some(0) {
            return Err(SaveError::Config("expected_len must be non-zero".to_string()));
        }

        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Select the storage backend
    pub fn backend(mut self, kind: BackendKind) -> Self {
        self.config.backend = kind;
        self
    }

    /// Set the on-disk frame format
    pub fn frame_format(mut self, format: FrameFormat) -> Self {
        self.config.frame_format = format;
        self
    }

    /// Set the exact payload length the reader expects
    pub fn expected_len(mut self, len: usize) -> Self {
        self.config.expected_len = Some(len);
        self
    }

    /// Set the backup scope
    pub fn backup_scope(mut self, scope: BackupScope) -> Self {
        self.config.backup_scope = scope;
        self
    }

    /// Set the staging file name
    pub fn staging_name(mut self, name: impl Into<String>) -> Self {
        self.config.staging_name = name.into();
        self
    }

    /// Set the sync policy
    pub fn sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.config.sync_policy = policy;
        self
    }

    /// Set the container directory name
    pub fn container_dir_name(mut self, name: impl Into<String>) -> Self {
        self.config.container_dir_name = name.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
