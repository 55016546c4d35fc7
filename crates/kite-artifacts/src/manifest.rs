//! `.manifest.json` envelope: schema, (de)serialization, and the atomic
//! write-temp-then-rename persistence routine.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{ArtifactError, Result};

pub const MANIFEST_FILE_NAME: &str = ".manifest.json";
const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    File,
    Directory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    #[serde(rename = "relativePath")]
    pub relative_path: String,
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    #[serde(rename = "sizeBytes")]
    pub size_bytes: u64,
    #[serde(rename = "createdAt")]
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(rename = "rideName", default)]
    pub ride_name: Option<String>,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub artifacts: HashMap<String, ManifestEntry>,
}

fn default_version() -> u32 {
    SCHEMA_VERSION
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            ride_name: None,
            timestamp: 0,
            artifacts: HashMap::new(),
        }
    }
}

impl Manifest {
    pub fn new(ride_name: Option<String>, artifacts: HashMap<String, ManifestEntry>) -> Self {
        Self {
            version: SCHEMA_VERSION,
            ride_name,
            timestamp: now_epoch_ms(),
            artifacts,
        }
    }

    /// Serialize to `<dir>/.manifest.json`, writing to a temp file in the
    /// same directory and renaming over the target so a crash never leaves
    /// a partially-written manifest (grounded on `FsCasStore::put`'s
    /// write-temp-then-persist pattern).
    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(MANIFEST_FILE_NAME);
        let json = serde_json::to_vec_pretty(self).expect("Manifest serializes infallibly");

        let mut tmp = NamedTempFile::new_in(dir).map_err(ArtifactError::ManifestIo)?;
        tmp.write_all(&json).map_err(ArtifactError::ManifestIo)?;
        tmp.persist(&path)
            .map_err(|e| ArtifactError::ManifestIo(e.error))?;
        Ok(())
    }

    /// Load `<dir>/.manifest.json`. Absent or corrupt manifests are treated
    /// as absent (`Ok(None)`), per spec: "the run proceeds".
    pub fn load(dir: &Path) -> Option<Manifest> {
        let path = dir.join(MANIFEST_FILE_NAME);
        let bytes = std::fs::read(path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

pub fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
