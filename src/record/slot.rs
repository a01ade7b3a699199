//! Slot names
//!
//! A slot name becomes a file name on disk, so it must stay a single path
//! component.

use std::fmt;

use crate::error::{Result, SaveError};

/// A validated slot name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotName(String);

impl SlotName {
    /// Longest accepted slot name, in bytes
    pub const MAX_LEN: usize = 255;

    /// Validate `name` as a single, non-special path component
    pub fn parse(name: &str) -> Result<Self> {
        let invalid = || SaveError::InvalidSlot(name.to_string());

        if name.is_empty() || name.len() > Self::MAX_LEN {
            return Err(invalid());
        }

        if name == "." || name == ".." {
            return Err(invalid());
        }

        if name.chars().any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control()) {
            return Err(invalid());
        }

        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SlotName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
