//! Filesystem-backed store: one JSON document per namespace.

use super::traits::{PersistenceStore, StoreError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

type Document = BTreeMap<String, String>;

/// Reject namespaces that would escape the root directory or produce an
/// unusable file name.
fn validate_namespace(namespace: &str) -> Result<(), StoreError> {
    if namespace.is_empty() {
        return Err(StoreError::InvalidNamespace(
            "namespace must not be empty".to_string(),
        ));
    }
    if namespace.contains('\0') || namespace.contains('/') || namespace.contains('\\') {
        return Err(StoreError::InvalidNamespace(format!(
            "namespace {:?} contains a path separator or NUL byte",
            namespace
        )));
    }
    if namespace == "." || namespace == ".." || namespace.starts_with("..") {
        return Err(StoreError::InvalidNamespace(format!(
            "namespace {:?} is not a valid file name",
            namespace
        )));
    }
    Ok(())
}

/// Atomically write data to a file using write-to-temp + fsync + rename.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::Other("Cannot atomic-write to a path with no parent".into()))?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

/// Filesystem store
///
/// Storage layout:
/// ```text
/// {root}/{namespace}.json   # flat JSON object: { "KEY": "value", ... }
/// ```
///
/// Every mutation rewrites the whole document through a temp file and a
/// rename, so batch writes and removals are all-or-nothing on disk.
pub struct FileStore {
    namespace: String,
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (or lazily create) the store for `namespace` under `root`.
    pub fn open(
        root: impl Into<PathBuf>,
        namespace: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let root = root.into();
        let namespace = namespace.into();
        validate_namespace(&namespace)?;
        fs::create_dir_all(&root)?;

        let path = root.join(format!("{}.json", namespace));
        Ok(Self {
            namespace,
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Document, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(Document::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Document::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, doc: &Document) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(doc)?;
        atomic_write(&self.path, &data)
    }

    /// Apply `f` to the current document and write the result back.
    fn update<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Document) -> bool,
    {
        let _guard = self.write_lock.lock();
        let mut doc = self.load()?;
        if f(&mut doc) {
            self.save(&doc)?;
        }
        Ok(())
    }
}

impl PersistenceStore for FileStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    #[instrument(skip(self, value), fields(namespace = %self.namespace))]
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        debug!("put");
        self.update(|doc| {
            doc.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.write_lock.lock();
        Ok(self.load()?.remove(key))
    }

    #[instrument(skip(self), fields(namespace = %self.namespace))]
    fn remove(&self, key: &str) -> Result<(), StoreError> {
        debug!("remove");
        self.update(|doc| doc.remove(key).is_some())
    }

    #[instrument(skip_all, fields(namespace = %self.namespace, count = entries.len()))]
    fn put_all(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        debug!("put_all");
        self.update(|doc| {
            for (key, value) in entries {
                doc.insert(key.to_string(), value.clone());
            }
            true
        })
    }

    #[instrument(skip_all, fields(namespace = %self.namespace, count = keys.len()))]
    fn remove_all(&self, keys: &[&str]) -> Result<(), StoreError> {
        debug!("remove_all");
        self.update(|doc| {
            let mut changed = false;
            for key in keys {
                changed |= doc.remove(*key).is_some();
            }
            changed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path(), "ns").unwrap();
        assert_eq!(store.get("USERNAME").unwrap(), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = FileStore::open(dir.path(), "ns").unwrap();
            store
                .put_all(&[("USERNAME", "alice".to_string()), ("LOGIN_TIME", "42".to_string())])
                .unwrap();
        }
        let store = FileStore::open(dir.path(), "ns").unwrap();
        assert_eq!(store.get("USERNAME").unwrap().as_deref(), Some("alice"));
        assert_eq!(store.get("LOGIN_TIME").unwrap().as_deref(), Some("42"));
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let dir = TempDir::new().unwrap();
        let a = FileStore::open(dir.path(), "app.a").unwrap();
        let b = FileStore::open(dir.path(), "app.b").unwrap();
        a.put("USERNAME", "alice").unwrap();
        assert_eq!(b.get("USERNAME").unwrap(), None);
    }

    #[test]
    fn test_remove_all_leaves_other_keys() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path(), "ns").unwrap();
        store.put("KEEP", "x").unwrap();
        store.put("USERNAME", "alice").unwrap();
        store.remove_all(&["USERNAME", "PASSWORD"]).unwrap();
        assert_eq!(store.get("USERNAME").unwrap(), None);
        assert_eq!(store.get("KEEP").unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn test_rejects_bad_namespace() {
        let dir = TempDir::new().unwrap();
        for bad in ["", "..", "../escape", "a/b", "a\\b"] {
            assert!(
                matches!(
                    FileStore::open(dir.path(), bad),
                    Err(StoreError::InvalidNamespace(_))
                ),
                "namespace {:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_corrupt_document_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path(), "ns").unwrap();
        std::fs::write(store.path(), b"{not json").unwrap();
        assert!(matches!(
            store.get("USERNAME"),
            Err(StoreError::Serialization(_))
        ));
    }
}
