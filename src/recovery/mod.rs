//! Recovery Protocol Module
//!
//! The save and load algorithms, built only on `StorageBackend` primitives.
//!
//! ## Save
//! ```text
//! validate ─► open(rw) ─► write ─► commit ─► close
//!                           │         │
//!                      fail: close   fail: log, still "written"
//! ```
//!
//! ## Load
//! ```text
//! open(ro) + read ──ok──► Record
//!      │
//!      └─ corruption ─► backup? ──no──► invalid Record
//!                          │
//!                         yes ─► restore ─► retry once
//! ```

mod load;
mod save;

pub use load::{load_record, LoadReport, MAX_RESTORE_ATTEMPTS};
pub use save::{save_record, SaveOutcome};
