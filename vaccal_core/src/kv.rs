//! Key-value persistence for the vaccination store.
//!
//! The store only needs `get`/`set`/`remove` over string keys and opaque byte
//! values. [`FileStore`] keeps every record in one JSON file that is rewritten
//! atomically with file locking; [`MemoryStore`] is an in-process fake.

use crate::{Error, Result};
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A single write in a batch
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KvOp {
    Set(String, Vec<u8>),
    Remove(String),
}

/// Synchronous string-keyed storage
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn set(&mut self, key: &str, value: &[u8]) -> Result<()>;

    fn remove(&mut self, key: &str) -> Result<()>;

    /// Apply several writes together
    ///
    /// The default applies them one by one; backends that can commit a batch
    /// atomically should override this.
    fn apply(&mut self, ops: Vec<KvOp>) -> Result<()> {
        for op in ops {
            match op {
                KvOp::Set(key, value) => self.set(&key, &value)?,
                KvOp::Remove(key) => self.remove(&key)?,
            }
        }
        Ok(())
    }
}

/// In-memory store, for tests and ephemeral sessions
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.records.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.records.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.records.remove(key);
        Ok(())
    }
}

/// All records in a single JSON object file
///
/// Values must be UTF-8 (the store writes JSON). Writers take an exclusive
/// lock on `<file>.lock`, re-read the file, and replace it via a temp file
/// and rename, so a batch is committed atomically and concurrent processes
/// don't drop each other's keys.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    records: BTreeMap<String, String>,
}

impl FileStore {
    /// Open the store at `path`
    ///
    /// Returns an empty store if the file doesn't exist.
    /// If the file is corrupted, logs a warning and starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = Self::read_records(&path);
        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_records(path: &Path) -> BTreeMap<String, String> {
        if !path.exists() {
            tracing::info!("No store file found at {:?}, starting empty", path);
            return BTreeMap::new();
        }

        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!("Unable to open store file {:?}: {}. Starting empty.", path, e);
                return BTreeMap::new();
            }
        };

        // Acquire shared lock for reading
        if let Err(e) = file.lock_shared() {
            tracing::warn!("Unable to lock store file {:?}: {}. Starting empty.", path, e);
            return BTreeMap::new();
        }

        let mut contents = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
        let _ = file.unlock();
        if let Err(e) = read {
            tracing::warn!("Failed to read store file {:?}: {}. Starting empty.", path, e);
            return BTreeMap::new();
        }

        match serde_json::from_str::<BTreeMap<String, String>>(&contents) {
            Ok(records) => {
                tracing::debug!("Loaded {} records from {:?}", records.len(), path);
                records
            }
            Err(e) => {
                tracing::warn!("Failed to parse store file {:?}: {}. Starting empty.", path, e);
                BTreeMap::new()
            }
        }
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Sidecar file whose exclusive lock serializes writers across processes
    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.parent_dir().join(name)
    }

    /// Atomically write all records by:
    /// 1. Writing to a temp file in the same directory
    /// 2. Syncing to disk
    /// 3. Renaming over the original
    ///
    /// Callers must hold the writer lock.
    fn flush(&self, records: &BTreeMap<String, String>) -> Result<()> {
        let temp = NamedTempFile::new_in(self.parent_dir())?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string(records)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved {} records to {:?}", records.len(), self.path);
        Ok(())
    }
}

fn stage(records: &mut BTreeMap<String, String>, op: KvOp) -> Result<()> {
    match op {
        KvOp::Set(key, value) => {
            let value = String::from_utf8(value)
                .map_err(|_| Error::Other(format!("Value for '{}' is not UTF-8", key)))?;
            records.insert(key, value);
        }
        KvOp::Remove(key) => {
            records.remove(&key);
        }
    }
    Ok(())
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.records.get(key).map(|v| v.as_bytes().to_vec()))
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.apply(vec![KvOp::Set(key.to_string(), value.to_vec())])
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.apply(vec![KvOp::Remove(key.to_string())])
    }

    /// Read-modify-write under an exclusive lock on the sidecar file
    ///
    /// Records are re-read from disk while the lock is held, so writes made
    /// by other processes since `open` are kept.
    fn apply(&mut self, ops: Vec<KvOp>) -> Result<()> {
        std::fs::create_dir_all(self.parent_dir())?;

        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .open(self.lock_path())?;
        lock.lock_exclusive()?;

        let result: Result<BTreeMap<String, String>> = (|| {
            let mut records = Self::read_records(&self.path);
            for op in ops {
                stage(&mut records, op)?;
            }
            self.flush(&records)?;
            Ok(records)
        })();

        lock.unlock()?;

        // Only a committed batch becomes visible
        self.records = result?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_basics() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);

        store.set("a", b"1").unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"1".to_vec()));

        store
            .apply(vec![KvOp::Set("b".into(), b"2".to_vec()), KvOp::Remove("a".into())])
            .unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_file_store_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("data").join("store.json");

        let mut store = FileStore::open(&path).unwrap();
        store.set("profile", br#"{"countryCode":"RU"}"#).unwrap();
        store.set("notes", b"{}").unwrap();
        store.remove("notes").unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("profile").unwrap(),
            Some(br#"{"countryCode":"RU"}"#.to_vec())
        );
        assert_eq!(reopened.get("notes").unwrap(), None);
    }

    #[test]
    fn test_file_store_corrupt_file_starts_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("store.json");
        std::fs::write(&path, "{ invalid json }").unwrap();

        let mut store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("profile").unwrap(), None);

        // Writing replaces the corrupt file
        store.set("profile", b"{}").unwrap();
        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("profile").unwrap(), Some(b"{}".to_vec()));
    }

    #[test]
    fn test_file_store_rejects_non_utf8_batch_atomically() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("store.json");

        let mut store = FileStore::open(&path).unwrap();
        store.set("keep", b"1").unwrap();

        let result = store.apply(vec![
            KvOp::Remove("keep".into()),
            KvOp::Set("bad".into(), vec![0xff, 0xfe]),
        ]);
        assert!(result.is_err());
        assert_eq!(store.get("keep").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get("bad").unwrap(), None);
    }

    #[test]
    fn test_file_stores_sharing_a_path_keep_each_others_writes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("store.json");

        // Both opened before either writes, like two overlapping CLI runs
        let mut first = FileStore::open(&path).unwrap();
        let mut second = FileStore::open(&path).unwrap();

        first.set("completionStatus", br#"{"m1":true}"#).unwrap();
        second.set("notes", br#"{"m1":"x"}"#).unwrap();
        first.remove("missing").unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("completionStatus").unwrap(),
            Some(br#"{"m1":true}"#.to_vec())
        );
        assert_eq!(reopened.get("notes").unwrap(), Some(br#"{"m1":"x"}"#.to_vec()));

        // A writer also picks up what the other committed
        assert_eq!(first.get("notes").unwrap(), Some(br#"{"m1":"x"}"#.to_vec()));
    }

    #[test]
    fn test_atomic_save_leaves_no_temp_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("store.json");

        let mut store = FileStore::open(&path).unwrap();
        store.set("a", b"1").unwrap();

        let extras: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "store.json" && e.file_name() != "store.json.lock")
            .collect();
        assert!(
            extras.is_empty(),
            "Expected only store.json and its lock, found extras: {:?}",
            extras
        );
    }
}
