use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::{decode_records, encode_records, BackendKind, RecordMap, StoreBackend};
use crate::error::StoreError;
use crate::models::Namespace;

/// Preferred backend: one pretty-printed JSON file per namespace.
///
/// Writes go to a temporary file in the same directory and are renamed over the
/// target, so a crash mid-write never leaves a half-written record file behind.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Open the backend rooted at `dir`, creating it if needed.
    ///
    /// Fails when the directory cannot be created or written to; callers use
    /// that as the signal to fall back to the key-value backend.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        // probe writability once, at selection time
        NamedTempFile::new_in(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, namespace: Namespace) -> PathBuf {
        self.dir.join(namespace.file_name())
    }
}

impl StoreBackend for FileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::File
    }

    fn read(&self, namespace: Namespace) -> Result<RecordMap, StoreError> {
        match fs::read_to_string(self.path(namespace)) {
            Ok(raw) => decode_records(&raw),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(RecordMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, namespace: Namespace, records: &RecordMap) -> Result<(), StoreError> {
        let raw = encode_records(records, true)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(raw.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path(namespace))?;
        Ok(())
    }
}
