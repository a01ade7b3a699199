//! Record Frame
//!
//! On-disk representation of a record payload.
//!
//! ## Checksummed Format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                        │
//! │   Magic: "DSAV" (4) | Version: u16 (2) | Len: u32 (4)    │
//! │   CRC32 of payload: u32 (4)                              │
//! ├──────────────────────────────────────────────────────────┤
//! │ Payload (Len bytes)                                      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Raw Format
//! The payload verbatim. Corruption can only be detected by an empty file
//! or, when the reader knows the expected size, a length mismatch.

use bytes::{Buf, BufMut, BytesMut};

use crate::config::FrameFormat;
use crate::error::{Result, SaveError};

/// Magic bytes identifying a Durasave record frame
pub const MAGIC: &[u8; 4] = b"DSAV";

/// Current frame format version
pub const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + Len (4) + CRC (4) = 14 bytes
pub const HEADER_SIZE: usize = 14;

/// Largest payload a frame can describe
pub const MAX_PAYLOAD_SIZE: usize = u32::MAX as usize;

// =============================================================================
// Checksummed Frame
// =============================================================================

/// Wrap a payload in a checksummed frame
pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(SaveError::InvalidRecord(format!(
            "payload of {} bytes exceeds frame limit",
            payload.len()
        )));
    }

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_slice(MAGIC);
    buf.put_u16_le(VERSION);
    buf.put_u32_le(payload.len() as u32);
    buf.put_u32_le(crc32fast::hash(payload));
    buf.put_slice(payload);

    Ok(buf.to_vec())
}

/// Validate a checksummed frame and return its payload
///
/// Any structural mismatch is reported as `CorruptionDetected`.
pub fn decode(data: &[u8]) -> Result<&[u8]> {
    if data.len() < HEADER_SIZE {
        return Err(SaveError::CorruptionDetected(format!(
            "frame truncated: {} bytes, header needs {}",
            data.len(),
            HEADER_SIZE
        )));
    }

    let mut header = &data[..HEADER_SIZE];

    let mut magic = [0u8; 4];
    header.copy_to_slice(&mut magic);
    if &magic != MAGIC {
        return Err(SaveError::CorruptionDetected("bad frame magic".to_string()));
    }

    let version = header.get_u16_le();
    if version != VERSION {
        return Err(SaveError::CorruptionDetected(format!(
            "unsupported frame version {}",
            version
        )));
    }

    let len = header.get_u32_le() as usize;
    let stored_crc = header.get_u32_le();

    let payload = &data[HEADER_SIZE..];
    if payload.len() != len {
        return Err(SaveError::CorruptionDetected(format!(
            "frame length mismatch: header says {}, found {}",
            len,
            payload.len()
        )));
    }

    let actual_crc = crc32fast::hash(payload);
    if actual_crc != stored_crc {
        return Err(SaveError::CorruptionDetected(format!(
            "CRC mismatch: stored {:08x}, computed {:08x}",
            stored_crc, actual_crc
        )));
    }

    Ok(payload)
}

// =============================================================================
// Format Dispatch
// =============================================================================

/// Turn a payload into the bytes written to disk
pub fn seal(format: FrameFormat, payload: &[u8]) -> Result<Vec<u8>> {
    match format {
        FrameFormat::Raw => Ok(payload.to_vec()),
        FrameFormat::Checksummed => encode(payload),
    }
}

/// Turn bytes read from disk back into the payload
pub fn unseal(format: FrameFormat, expected_len: Option<usize>, data: Vec<u8>) -> Result<Vec<u8>> {
    let payload = match format {
        FrameFormat::Raw => data,
        FrameFormat::Checksummed => decode(&data)?.to_vec(),
    };

    if payload.is_empty() {
        return Err(SaveError::CorruptionDetected("empty payload".to_string()));
    }

    if let Some(expected) = expected_len {
        if payload.len() != expected {
            return Err(SaveError::CorruptionDetected(format!(
                "payload is {} bytes, expected {}",
                payload.len(),
                expected
            )));
        }
    }

    Ok(payload)
}
