// src/artifacts.rs
//
// Model artifact store.
//
// Layout under `dir`:
//   <name>.json            artifact blob as produced by `TrainablePolicy::to_artifact`
//   <name>.manifest.json   { name, sha256, bytes, saved_at_unix_ms }
//
// Both files are written atomically (temp file + rename) and overwritten on
// every save. `load` refuses a blob whose hash does not match its manifest.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const BASELINE_MODEL: &str = "baseline_model";
pub const OPTIMIZED_MODEL: &str = "optimized_model";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub name: String,
    pub sha256: String,
    pub bytes: u64,
    pub saved_at_unix_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn blob_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    pub fn manifest_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.manifest.json"))
    }

    pub fn save(&self, name: &str, blob: &[u8]) -> Result<ArtifactManifest> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create model dir {}", self.dir.display()))?;

        let manifest = ArtifactManifest {
            name: name.to_string(),
            sha256: sha256_hex(blob),
            bytes: blob.len() as u64,
            saved_at_unix_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
        };

        atomic_write(&self.blob_path(name), blob)?;
        let manifest_json = serde_json::to_vec_pretty(&manifest)
            .context("failed to serialize artifact manifest")?;
        atomic_write(&self.manifest_path(name), &manifest_json)?;

        Ok(manifest)
    }

    pub fn load_manifest(&self, name: &str) -> Result<ArtifactManifest> {
        let path = self.manifest_path(name);
        let raw = fs::read(&path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse manifest {}", path.display()))
    }

    /// Read a blob and verify it against its manifest.
    pub fn load(&self, name: &str) -> Result<Vec<u8>> {
        let manifest = self.load_manifest(name)?;
        let path = self.blob_path(name);
        let blob =
            fs::read(&path).with_context(|| format!("failed to read artifact {}", path.display()))?;

        let actual = sha256_hex(&blob);
        if actual != manifest.sha256 {
            bail!(
                "artifact {} hash mismatch: manifest={} actual={}",
                path.display(),
                manifest.sha256,
                actual
            );
        }
        Ok(blob)
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path has no parent: {}", path.display()))?;
    let temp_path = parent.join(format!(
        ".tmp_{}_{}",
        std::process::id(),
        path.file_name()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default()
    ));

    fs::write(&temp_path, data)
        .with_context(|| format!("failed to write {}", temp_path.display()))?;
    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "failed to rename {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("models"));

        let manifest = store.save(OPTIMIZED_MODEL, b"{\"w\":[1,2]}").unwrap();
        assert_eq!(manifest.bytes, 11);
        assert!(store.blob_path(OPTIMIZED_MODEL).exists());
        assert_eq!(store.load_manifest(OPTIMIZED_MODEL).unwrap(), manifest);
        assert_eq!(store.load(OPTIMIZED_MODEL).unwrap(), b"{\"w\":[1,2]}");
    }

    #[test]
    fn tampered_blob_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        store.save(BASELINE_MODEL, b"original").unwrap();
        fs::write(store.blob_path(BASELINE_MODEL), b"tampered").unwrap();

        let err = store.load(BASELINE_MODEL).unwrap_err();
        assert!(err.to_string().contains("hash mismatch"));
    }

    #[test]
    fn save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        store.save(BASELINE_MODEL, b"one").unwrap();
        store.save(BASELINE_MODEL, b"two").unwrap();
        assert_eq!(store.load(BASELINE_MODEL).unwrap(), b"two");
    }
}
