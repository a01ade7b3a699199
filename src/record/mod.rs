//! Record Module
//!
//! The opaque byte payload the store persists, plus the slot names it is
//! persisted under.
//!
//! ## Responsibilities
//! - Own the payload bytes exclusively
//! - Answer the validity predicate (`is_valid`)
//! - Frame payloads for on-disk storage (`frame`)
//! - Validate slot names before they reach a backend (`slot`)

pub mod frame;
mod slot;

pub use slot::SlotName;

/// An owned byte payload
///
/// The length is always the length of the owned bytes, so
/// `length == len(bytes)` holds by construction. An empty record is the
/// "absent" record `Store::load` hands back on failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    bytes: Vec<u8>,
}

impl Record {
    /// Create a record that owns `bytes`
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// The absent record
    pub fn invalid() -> Self {
        Self::default()
    }

    /// Borrow the payload
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// A record is valid when it carries at least one byte
    pub fn is_valid(&self) -> bool {
        !self.bytes.is_empty()
    }

    /// Take ownership of the payload
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl From<Vec<u8>> for Record {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for Record {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}

impl AsRef<[u8]> for Record {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}
