use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::StoreError;
use crate::job::ResultMap;

/// Key/value store shared between a worker and its supervisor.
///
/// Backed by a single JSON object file. Every insert rewrites the file
/// through a temporary sibling and a rename, so a reader never sees a
/// half-written object.
#[derive(Debug)]
pub struct ResultStore {
    path: PathBuf,
    entries: ResultMap,
}

impl ResultStore {
    /// Create (or truncate) an empty store at `path`.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self {
            path: path.into(),
            entries: ResultMap::new(),
        };
        store.flush()?;
        Ok(store)
    }

    /// Open the store at `path`, keeping whatever it already holds.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = Self::read(&path)?;
        Ok(Self { path, entries })
    }

    /// Read a store file. A missing or blank file reads as empty.
    pub fn read(path: impl AsRef<Path>) -> Result<ResultMap, StoreError> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(text) if text.trim().is_empty() => Ok(ResultMap::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ResultMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Insert or replace one entry and write the store through.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), StoreError> {
        self.entries.insert(key.into(), value.into());
        self.flush()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn entries(&self) -> &ResultMap {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec(&self.entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn insert_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        let mut store = ResultStore::create(&path).unwrap();
        assert!(ResultStore::read(&path).unwrap().is_empty());

        store.insert("x", 1).unwrap();
        store.insert("name", "run-a").unwrap();

        let on_disk = ResultStore::read(&path).unwrap();
        assert_eq!(on_disk.get("x"), Some(&json!(1)));
        assert_eq!(on_disk.keys().collect::<Vec<_>>(), ["x", "name"]);
    }

    #[test]
    fn open_keeps_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        std::fs::write(&path, r#"{"a": [1, 2]}"#).unwrap();

        let mut store = ResultStore::open(&path).unwrap();
        store.insert("b", true).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(ResultStore::read(&path).unwrap()["a"], json!([1, 2]));
    }

    #[test]
    fn missing_or_blank_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ResultStore::read(dir.path().join("nope.json")).unwrap().is_empty());

        let blank = dir.path().join("blank.json");
        std::fs::write(&blank, "  \n").unwrap();
        assert!(ResultStore::read(&blank).unwrap().is_empty());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(ResultStore::read(&path), Err(StoreError::Format(_))));
    }
}
