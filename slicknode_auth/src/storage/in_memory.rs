//! An in-memory credential store

use std::collections::HashMap;

use parking_lot::RwLock;

use super::CredentialStore;
use crate::error::StorageError;

/// An in-memory credential store
///
/// Values live as long as the store does.
#[derive(Default, Debug)]
pub struct InMemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    /// Constructs a new, empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of values currently held
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Whether the store holds no values
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl CredentialStore for InMemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.read().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values.write().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values.write().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.values.write().clear();
        Ok(())
    }
}
