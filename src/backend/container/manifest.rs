//! Container Manifest
//!
//! Every sealed container carries a `MANIFEST` describing the files it
//! holds. A container whose files do not match their manifest is broken.
//!
//! ## File Format
//! ```text
//! ┌────────────┬──────────────────────────────────────────┐
//! │ CRC32 (4)  │ bincode(Manifest)                        │
//! └────────────┴──────────────────────────────────────────┘
//! ```

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backend::write_file;

/// File name of the manifest inside a container directory
pub const MANIFEST_FILE: &str = "MANIFEST";

const MANIFEST_VERSION: u16 = 1;

/// One sealed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub len: u64,
    pub crc: u32,
}

/// Contents of a sealed container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u16,
    /// Sorted by name
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Describe every regular file currently in `dir`
    pub fn scan(dir: &Path) -> io::Result<Self> {
        let mut entries = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if name == MANIFEST_FILE {
                continue;
            }

            let data = fs::read(&path)?;
            entries.push(ManifestEntry {
                name,
                len: data.len() as u64,
                crc: crc32fast::hash(&data),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Self {
            version: MANIFEST_VERSION,
            entries,
        })
    }

    /// Write the manifest for the current contents of `dir`
    pub fn seal(dir: &Path, sync: bool) -> io::Result<Self> {
        let manifest = Self::scan(dir)?;

        let body = bincode::serialize(&manifest)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        let mut data = Vec::with_capacity(4 + body.len());
        data.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        data.extend_from_slice(&body);

        write_file(&dir.join(MANIFEST_FILE), &data, sync)?;
        Ok(manifest)
    }

    /// Load the manifest stored in `dir`
    ///
    /// Returns a description of the problem if it is missing or damaged.
    pub fn load(dir: &Path) -> std::result::Result<Self, String> {
        let data = fs::read(dir.join(MANIFEST_FILE))
            .map_err(|e| format!("manifest unreadable: {}", e))?;

        if data.len() < 4 {
            return Err("manifest truncated".to_string());
        }

        let (crc_bytes, body) = data.split_at(4);
        let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        if crc32fast::hash(body) != stored {
            return Err("manifest checksum mismatch".to_string());
        }

        let manifest: Manifest =
            bincode::deserialize(body).map_err(|e| format!("manifest undecodable: {}", e))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(format!("unsupported manifest version {}", manifest.version));
        }

        Ok(manifest)
    }

    /// Check that `dir` holds exactly the files its manifest describes
    pub fn verify(dir: &Path) -> std::result::Result<Self, String> {
        let stored = Self::load(dir)?;
        let actual = Self::scan(dir).map_err(|e| format!("container unreadable: {}", e))?;

        if stored.entries.len() != actual.entries.len() {
            return Err(format!(
                "manifest lists {} files, container holds {}",
                stored.entries.len(),
                actual.entries.len()
            ));
        }

        for (want, have) in stored.entries.iter().zip(&actual.entries) {
            if want != have {
                return Err(format!("file '{}' does not match manifest", want.name));
            }
        }

        Ok(stored)
    }
}
