//! Error types for Durasave
//!
//! Provides a unified error type for all backend and protocol operations.
//! None of these cross the public `Store::save` / `Store::load` contract;
//! the store converts them into a bool or an invalid `Record`.

use thiserror::Error;

/// Result type alias using SaveError
pub type Result<T> = std::result::Result<T, SaveError>;

/// Unified error type for Durasave operations
#[derive(Debug, Error)]
pub enum SaveError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Session Errors
    // -------------------------------------------------------------------------
    #[error("Mount error: {0}")]
    Mount(String),

    #[error("Store not initialized")]
    NotInitialized,

    // -------------------------------------------------------------------------
    // Recovery Errors
    // -------------------------------------------------------------------------
    #[error("Corruption detected: {0}")]
    CorruptionDetected(String),

    #[error("No backup generation available for slot '{0}'")]
    BackupUnavailable(String),

    #[error("Slot '{0}' not found")]
    NotFound(String),

    // -------------------------------------------------------------------------
    // Input Errors
    // -------------------------------------------------------------------------
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid slot name '{0}'")]
    InvalidSlot(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SaveError {
    /// True if this error means the primary copy exists but cannot be trusted
    pub fn is_corruption(&self) -> bool {
        matches!(self, SaveError::CorruptionDetected(_))
    }
}

impl From<bincode::Error> for SaveError {
    fn from(err: bincode::Error) -> Self {
        SaveError::Serialization(err.to_string())
    }
}
