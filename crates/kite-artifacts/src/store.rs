//! `ArtifactStore`: a process-safe name -> path map over a single directory,
//! with manifest save/restore (spec §4.3).
//!
//! Grounded on `aivcs_core::cas::fs::FsCasStore`: a concurrent map guards
//! insertions, directory layout lives under one root, and writes land via a
//! temp file renamed into place.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use kite_model::{ArtifactAccess, RuntimeError};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::{ArtifactError, Result};
use crate::manifest::{now_epoch_ms, ArtifactKind, Manifest, ManifestEntry};

pub const DEFAULT_ARTIFACTS_DIR: &str = ".kite/artifacts";

struct Entry {
    path: PathBuf,
}

/// The ride-scoped artifact store. `put`/`get`/`has`/`list` are lock-free
/// for the common case by way of a single `RwLock` guarding only the
/// in-memory index; directory copies of distinct names proceed
/// independently of the lock.
pub struct ArtifactStore {
    dir: PathBuf,
    index: RwLock<HashMap<String, Entry>>,
}

impl ArtifactStore {
    /// Create a store rooted at `dir`, creating it if absent. Does not
    /// restore a manifest; call [`ArtifactStore::restore_from_manifest`]
    /// explicitly.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(ArtifactError::ManifestIo)?;
        Ok(Self {
            dir,
            index: RwLock::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn target_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Copy `source` under the store as `name` (file -> file copy, directory
    /// -> recursive copy), replacing any existing entry with the same name.
    /// The copy lands via a sibling temp path renamed into place, so a
    /// reader never observes a partially-written artifact. Two racing
    /// `put`s for the same name resolve last-writer-wins; this
    /// implementation logs a warning when an existing entry is overwritten
    /// concurrently, matching spec §5's documented race.
    pub fn put(&self, name: &str, source: &Path) -> Result<()> {
        let target = self.target_path(name);
        let io_err = |e: std::io::Error| ArtifactError::Io {
            name: name.to_string(),
            source: e,
        };
        let parent = target.parent().unwrap_or(&self.dir);
        fs::create_dir_all(parent).map_err(io_err)?;

        if source.is_dir() {
            let tmp = tempfile::Builder::new()
                .prefix(".kite-tmp-")
                .tempdir_in(parent)
                .map_err(io_err)?;
            copy_dir_recursive(source, tmp.path()).map_err(io_err)?;
            if target.exists() {
                fs::remove_dir_all(&target).map_err(io_err)?;
            }
            fs::rename(tmp.into_path(), &target).map_err(io_err)?;
        } else {
            let mut tmp = NamedTempFile::new_in(parent).map_err(io_err)?;
            let mut source_file = fs::File::open(source).map_err(io_err)?;
            std::io::copy(&mut source_file, tmp.as_file_mut()).map_err(io_err)?;
            tmp.persist(&target)
                .map_err(|e| ArtifactError::Io { name: name.to_string(), source: e.error })?;
        }

        let mut index = self.index.write().expect("artifact index lock poisoned");
        if index
            .insert(name.to_string(), Entry { path: target })
            .is_some()
        {
            warn!(artifact = name, "artifact overwritten by concurrent put");
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<PathBuf> {
        self.index
            .read()
            .expect("artifact index lock poisoned")
            .get(name)
            .map(|e| e.path.clone())
    }

    pub fn has(&self, name: &str) -> bool {
        self.index.read().expect("artifact index lock poisoned").contains_key(name)
    }

    pub fn list(&self) -> Vec<String> {
        self.index
            .read()
            .expect("artifact index lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn remove(&self, name: &str) -> bool {
        self.index
            .write()
            .expect("artifact index lock poisoned")
            .remove(name)
            .is_some()
    }

    pub fn clear(&self) {
        self.index.write().expect("artifact index lock poisoned").clear();
    }

    /// Serialize the current index to `<dir>/.manifest.json` atomically.
    pub fn save_manifest(&self, ride_name: impl Into<String>) -> Result<()> {
        let index = self.index.read().expect("artifact index lock poisoned");
        let mut artifacts = HashMap::new();

        for (name, entry) in index.iter() {
            let relative = entry
                .path
                .strip_prefix(&self.dir)
                .unwrap_or(&entry.path)
                .to_string_lossy()
                .into_owned();
            let (kind, size_bytes) = describe(&entry.path)?;
            artifacts.insert(
                name.clone(),
                ManifestEntry {
                    name: name.clone(),
                    relative_path: relative,
                    kind,
                    size_bytes,
                    created_at: now_epoch_ms(),
                },
            );
        }
        drop(index);

        let manifest = Manifest::new(Some(ride_name.into()), artifacts);
        manifest.save(&self.dir)
    }

    /// Load `.manifest.json` if present and register every entry whose
    /// backing path still exists. Returns the count registered; corrupted
    /// or absent manifests yield 0 and the run proceeds.
    pub fn restore_from_manifest(&self) -> usize {
        let Some(manifest) = Manifest::load(&self.dir) else {
            return 0;
        };

        let mut index = self.index.write().expect("artifact index lock poisoned");
        let mut count = 0;
        for (name, entry) in manifest.artifacts {
            let path = self.dir.join(&entry.relative_path);
            if path.exists() {
                index.insert(name, Entry { path });
                count += 1;
            }
        }
        count
    }
}

impl ArtifactAccess for ArtifactStore {
    fn get(&self, name: &str) -> Option<PathBuf> {
        ArtifactStore::get(self, name)
    }

    fn has(&self, name: &str) -> bool {
        ArtifactStore::has(self, name)
    }

    fn list(&self) -> Vec<String> {
        ArtifactStore::list(self)
    }

    fn put(&self, name: &str, source: &Path) -> std::result::Result<(), RuntimeError> {
        ArtifactStore::put(self, name, source).map_err(|e| RuntimeError::BodyFailure {
            segment: "artifact-store".to_string(),
            message: e.to_string(),
        })
    }
}

fn describe(path: &Path) -> Result<(ArtifactKind, u64)> {
    if path.is_dir() {
        let size = dir_size(path).map_err(ArtifactError::ManifestIo)?;
        Ok((ArtifactKind::Directory, size))
    } else {
        let meta = fs::metadata(path).map_err(ArtifactError::ManifestIo)?;
        Ok((ArtifactKind::File, meta.len()))
    }
}

fn dir_size(path: &Path) -> std::io::Result<u64> {
    let mut total = 0u64;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += meta.len();
        }
    }
    Ok(total)
}

fn copy_dir_recursive(source: &Path, target: &Path) -> std::io::Result<()> {
    fs::create_dir_all(target)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let dest = target.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), dest)?;
        }
    }
    Ok(())
}
