//! Store Module
//!
//! The durable record store callers talk to.
//!
//! ## Responsibilities
//! - Own the backend selected by `Config`
//! - Lifecycle: `initialize` / `shutdown` (also on drop)
//! - Public `save` / `load` contract: bool and possibly-invalid `Record`,
//!   never an error or a panic
//!
//! ## Concurrency Model
//! `save`, `load`, and `delete` take `&mut self`, so at most one operation
//! is in flight per store. Callers sharing a store across threads wrap it
//! in a mutex of their own.

use std::path::Path;

use tracing::{debug, error, info, warn};

use crate::backend::{self, StorageBackend};
use crate::config::Config;
use crate::error::{Result, SaveError};
use crate::record::{Record, SlotName};
use crate::recovery::{self, LoadReport, SaveOutcome};

/// Crash-tolerant record store with one backup generation per slot
pub struct Store {
    /// Store configuration
    config: Config,

    /// Storage substrate, chosen once at construction
    backend: Box<dyn StorageBackend>,

    /// Set between a successful `initialize` and `shutdown`
    initialized: bool,
}

impl Store {
    /// Create a store with the backend named in `config`
    ///
    /// Nothing touches storage until `initialize`.
    pub fn new(config: Config) -> Self {
        let backend = backend::from_config(&config);
        Self::with_backend(config, backend)
    }

    /// Create a store over a caller-supplied backend
    pub fn with_backend(config: Config, backend: Box<dyn StorageBackend>) -> Self {
        Self {
            config,
            backend,
            initialized: false,
        }
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Self {
        let config = Config::builder().data_dir(path).build();
        Self::new(config)
    }

    /// Set up backend session state
    ///
    /// Safe to call more than once; later calls are no-ops.
    pub fn initialize(&mut self) -> bool {
        if self.initialized {
            debug!(backend = self.backend.name(), "Store already initialized");
            return true;
        }

        if let Err(e) = self.config.validate() {
            error!(error = %e, "Refusing to initialize store");
            return false;
        }

        match self.backend.initialize() {
            Ok(()) => {
                self.initialized = true;
                info!(
                    backend = self.backend.name(),
                    data_dir = %self.config.data_dir.display(),
                    "Store initialized"
                );
                true
            }
            Err(e) => {
                error!(backend = self.backend.name(), error = %e, "Failed to initialize store");
                false
            }
        }
    }

    /// Tear down backend session state
    pub fn shutdown(&mut self) {
        if !self.initialized {
            return;
        }

        self.initialized = false;
        match self.backend.shutdown() {
            Ok(()) => info!(backend = self.backend.name(), "Store shut down"),
            Err(e) => warn!(backend = self.backend.name(), error = %e, "Failed to shut down store"),
        }
    }

    /// Save `record` as the new generation of `slot`
    ///
    /// Returns true when the bytes were written. A failure while promoting
    /// them or rotating the backup is logged but still reports true; use
    /// `save_with_outcome` to tell the two apart.
    pub fn save(&mut self, record: &Record, slot: &str) -> bool {
        self.save_with_outcome(record, slot).is_success()
    }

    /// Save and report exactly how far the save got
    pub fn save_with_outcome(&mut self, record: &Record, slot: &str) -> SaveOutcome {
        if let Err(e) = self.ensure_initialized() {
            warn!(slot, error = %e, "Rejected save");
            return SaveOutcome::Rejected;
        }

        let slot = match SlotName::parse(slot) {
            Ok(slot) => slot,
            Err(e) => {
                warn!(error = %e, "Rejected save");
                return SaveOutcome::Rejected;
            }
        };

        recovery::save_record(self.backend.as_mut(), record, &slot)
    }

    /// Load the current generation of `slot`
    ///
    /// Returns an invalid record if nothing could be loaded.
    pub fn load(&mut self, slot: &str) -> Record {
        self.load_with_report(slot).0
    }

    /// Load and report whether a backup had to be restored
    pub fn load_with_report(&mut self, slot: &str) -> (Record, LoadReport) {
        if let Err(e) = self.ensure_initialized() {
            warn!(slot, error = %e, "Rejected load");
            let report = LoadReport {
                failure: Some(e.to_string()),
                ..LoadReport::default()
            };
            return (Record::invalid(), report);
        }

        let slot = match SlotName::parse(slot) {
            Ok(slot) => slot,
            Err(e) => {
                warn!(error = %e, "Rejected load");
                let report = LoadReport {
                    failure: Some(e.to_string()),
                    ..LoadReport::default()
                };
                return (Record::invalid(), report);
            }
        };

        recovery::load_record(self.backend.as_mut(), &slot)
    }

    /// Remove a slot's data
    pub fn delete(&mut self, slot: &str) -> bool {
        let result = self
            .ensure_initialized()
            .and_then(|()| SlotName::parse(slot))
            .and_then(|slot| self.backend.delete(&slot));
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(slot, error = %e, "Failed to delete slot");
                false
            }
        }
    }

    fn ensure_initialized(&self) -> Result<()> {
        if !self.initialized {
            return Err(SaveError::NotInitialized);
        }
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Name of the active backend
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.shutdown();
    }
}
