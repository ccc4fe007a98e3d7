//! Per-machine identity and metadata files
//!
//! Layout inside the machine's data directory:
//! - `id`: the engine identifier, one line of plain text
//! - `metadata.json`: [`MachineMetadata`]
//!
//! A missing file means "not created yet", never an error.

use crate::models::MachineMetadata;
use crate::Result;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const IDENTITY_FILE: &str = "id";
pub const METADATA_FILE: &str = "metadata.json";

pub struct MachineStore {
    dir: PathBuf,
}

impl MachineStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn identity_path(&self) -> PathBuf {
        self.dir.join(IDENTITY_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    pub fn read_identity(&self) -> Result<Option<String>> {
        let raw = match read_optional(&self.identity_path())? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let id = raw.lines().next().unwrap_or("").trim();
        if id.is_empty() {
            Ok(None)
        } else {
            Ok(Some(id.to_string()))
        }
    }

    pub fn read_metadata(&self) -> Result<Option<MachineMetadata>> {
        match read_optional(&self.metadata_path())? {
            Some(raw) if !raw.trim().is_empty() => Ok(Some(serde_json::from_str(&raw)?)),
            _ => Ok(None),
        }
    }

    /// Persist identity and metadata of a freshly created machine. Either
    /// both files are written or neither is left behind.
    pub fn record_creation(&self, metadata: &MachineMetadata) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(metadata)?;
        self.write_atomic(IDENTITY_FILE, format!("{}\n", metadata.machine_name).as_bytes())?;

        if let Err(e) = self.write_atomic(METADATA_FILE, json.as_bytes()) {
            if let Err(undo) = remove_optional(&self.identity_path()) {
                tracing::error!(
                    "could not roll back identity file for {}: {}",
                    metadata.machine_name,
                    undo
                );
            }
            return Err(e);
        }
        Ok(())
    }

    /// Remove both files; already-missing files are fine. Each removal is
    /// attempted even when the other fails; the first failure is returned.
    pub fn clear(&self) -> Result<()> {
        let mut first_err = None;
        for path in [self.identity_path(), self.metadata_path()] {
            if let Err(e) = remove_optional(&path) {
                tracing::warn!("could not remove {}: {}", path.display(), e);
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // Readers see either the old file or the complete new one
    fn write_atomic(&self, name: &str, contents: &[u8]) -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.dir.join(name)).map_err(|e| e.error)?;
        Ok(())
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn remove_optional(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (MachineStore, TempDir) {
        let temp = TempDir::new().unwrap();
        (MachineStore::new(temp.path().join("default")), temp)
    }

    #[test]
    fn test_missing_files_read_as_absent() {
        let (store, _temp) = test_store();
        assert_eq!(store.read_identity().unwrap(), None);
        assert_eq!(store.read_metadata().unwrap(), None);
    }

    #[test]
    fn test_record_and_read_back() {
        let (store, _temp) = test_store();
        let meta = MachineMetadata::new("vagrant-default-a3b2c1", "ubuntu:noble");
        store.record_creation(&meta).unwrap();

        assert_eq!(
            store.read_identity().unwrap().as_deref(),
            Some("vagrant-default-a3b2c1")
        );
        assert_eq!(store.read_metadata().unwrap(), Some(meta));

        let raw = std::fs::read_to_string(store.identity_path()).unwrap();
        assert_eq!(raw, "vagrant-default-a3b2c1\n");
    }

    #[test]
    fn test_blank_identity_is_absent() {
        let (store, _temp) = test_store();
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.identity_path(), "  \n").unwrap();
        assert_eq!(store.read_identity().unwrap(), None);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (store, _temp) = test_store();
        store
            .record_creation(&MachineMetadata::new("vagrant-web-010101", "ubuntu:noble"))
            .unwrap();

        store.clear().unwrap();
        store.clear().unwrap();
        assert!(!store.identity_path().exists());
        assert!(!store.metadata_path().exists());
    }

    #[test]
    fn test_failed_metadata_write_leaves_no_identity() {
        let (store, _temp) = test_store();
        std::fs::create_dir_all(store.metadata_path()).unwrap();

        let meta = MachineMetadata::new("vagrant-web-010101", "ubuntu:noble");
        assert!(store.record_creation(&meta).is_err());
        assert_eq!(store.read_identity().unwrap(), None);
    }

    #[test]
    fn test_clear_attempts_both_files() {
        let (store, _temp) = test_store();
        std::fs::create_dir_all(store.metadata_path()).unwrap();
        std::fs::write(store.identity_path(), "vagrant-web-010101\n").unwrap();

        assert!(store.clear().is_err());
        assert!(!store.identity_path().exists());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let (store, _temp) = test_store();
        store
            .record_creation(&MachineMetadata::new("vagrant-web-010101", "ubuntu:noble"))
            .unwrap();

        let mut names: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["id", "metadata.json"]);
    }
}
