//! Game payload
//!
//! The game-state record the demo persists: a single score.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SaveError};
use crate::record::Record;

/// Game state persisted between runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveGame {
    pub score: u32,
}

impl SaveGame {
    /// Encoded size: one little-endian u32
    pub const ENCODED_LEN: usize = 4;

    pub fn new(score: u32) -> Self {
        Self { score }
    }

    pub fn increment(&mut self) {
        self.score = self.score.saturating_add(1);
    }

    /// Decrease the score, stopping at zero
    pub fn decrement(&mut self) {
        self.score = self.score.saturating_sub(1);
    }

    /// Serialize into a record
    pub fn to_record(&self) -> Result<Record> {
        let bytes = bincode::serialize(self)?;
        Ok(Record::new(bytes))
    }

    /// Deserialize from a record returned by `Store::load`
    pub fn from_record(record: &Record) -> Result<Self> {
        if !record.is_valid() {
            return Err(SaveError::InvalidRecord("record is empty".to_string()));
        }
        if record.len() != Self::ENCODED_LEN {
            return Err(SaveError::InvalidRecord(format!(
                "expected {} bytes, got {}",
                Self::ENCODED_LEN,
                record.len()
            )));
        }

        Ok(bincode::deserialize(record.bytes())?)
    }
}
