//! # Durasave
//!
//! A crash-tolerant store for small binary game-state records:
//! - Staged writes promoted by atomic rename (local files) or
//!   unmount-with-backup (mounted save containers)
//! - Exactly one retained backup generation per slot
//! - Load falls back to the backup, with a single bounded restore
//! - `save` / `load` never error or panic; they return a bool and a
//!   possibly-invalid `Record`
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                              │
//! │           initialize / shutdown / save / load               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  Recovery Protocol                          │
//! │     write → commit → rotate  |  read → restore → retry      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌──────────────────┐
//!   │  LocalFile  │          │ MountedContainer │
//!   │  (renames)  │          │ (mount sessions) │
//!   └─────────────┘          └──────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use durasave::{Config, Record, Store};
//!
//! let mut store = Store::new(Config::builder().data_dir("./saves").build());
//! assert!(store.initialize());
//!
//! store.save(&Record::new(vec![5, 0, 0, 0]), "save.dat");
//! let record = store.load("save.dat");
//! assert!(record.is_valid());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod backend;
pub mod recovery;
pub mod store;
pub mod game;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{SaveError, Result};
pub use config::Config;
pub use record::Record;
pub use store::Store;
pub use game::SaveGame;
pub use recovery::{LoadReport, SaveOutcome};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Durasave
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
