//! Persistence store trait definitions

use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("Store error: {0}")]
    Other(String),
}

/// Durable key/value store scoped to a single namespace.
///
/// The session manager only ever calls these methods; it never assumes
/// anything about how the values are laid out on disk. Implementations must
/// be usable from several threads at once.
///
/// This trait is object-safe and can be used with `Box<dyn PersistenceStore>`.
pub trait PersistenceStore: Send + Sync {
    /// The namespace every key of this store lives under
    fn namespace(&self) -> &str;

    /// Store `value` under `key`, replacing any previous value
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Retrieve the value stored under `key`
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Remove `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Store several entries.
    ///
    /// The default writes one key at a time and stops at the first failure,
    /// so a failure can leave some entries written. Stores that can commit
    /// a batch atomically should override this.
    fn put_all(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        for (key, value) in entries {
            self.put(key, value)?;
        }
        Ok(())
    }

    /// Remove several keys. Same atomicity caveat as [`put_all`](Self::put_all).
    fn remove_all(&self, keys: &[&str]) -> Result<(), StoreError> {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }
}

/// Blanket implementation for boxed trait objects, enabling dynamic dispatch
impl PersistenceStore for Box<dyn PersistenceStore> {
    fn namespace(&self) -> &str {
        (**self).namespace()
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).put(key, value)
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }

    fn put_all(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        (**self).put_all(entries)
    }

    fn remove_all(&self, keys: &[&str]) -> Result<(), StoreError> {
        (**self).remove_all(keys)
    }
}

impl<T: PersistenceStore + ?Sized> PersistenceStore for Arc<T> {
    fn namespace(&self) -> &str {
        (**self).namespace()
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).put(key, value)
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }

    fn put_all(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        (**self).put_all(entries)
    }

    fn remove_all(&self, keys: &[&str]) -> Result<(), StoreError> {
        (**self).remove_all(keys)
    }
}
