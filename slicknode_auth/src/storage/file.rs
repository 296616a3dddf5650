//! A credential store persisted to a local file

use std::{
    collections::BTreeMap,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use parking_lot::Mutex;

use super::CredentialStore;
use crate::error::{StorageError, StorageOperation};

/// A credential store that keeps its values as a JSON object in a local file
///
/// The file is read on every access and rewritten on every mutation, so
/// several stores pointed at the same path observe each other's writes. No
/// locking is performed across processes.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Constructs a new file store at `path`
    ///
    /// The file does not need to exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> io::Result<BTreeMap<String, String>> {
        match fs::read(&self.path) {
            Ok(data) if data.is_empty() => Ok(BTreeMap::new()),
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err),
        }
    }

    fn save(&self, values: &BTreeMap<String, String>) -> io::Result<()> {
        let mut file_opts = OpenOptions::new();

        file_opts.create(true).truncate(true).write(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            file_opts.mode(0o600);
        }

        let mut file = file_opts.open(&self.path)?;
        let data = serde_json::to_vec_pretty(values)?;
        file.write_all(&data)?;
        file.flush()
    }

    fn update<F>(&self, operation: StorageOperation, key: &str, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let _guard = self.write_lock.lock();
        let mut values = self
            .load()
            .map_err(|err| StorageError::new(operation, key, err))?;
        f(&mut values);
        self.save(&values)
            .map_err(|err| StorageError::new(operation, key, err))
    }
}

impl CredentialStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut values = self
            .load()
            .map_err(|err| StorageError::new(StorageOperation::Read, key, err))?;
        Ok(values.remove(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(StorageOperation::Write, key, |values| {
            values.insert(key.to_owned(), value.to_owned());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(StorageOperation::Remove, key, |values| {
            values.remove(key);
        })
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.update(StorageOperation::Clear, "", |values| values.clear())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("credentials.json"));
        (dir, store)
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let (_dir, store) = temp_store();
        assert_eq!(store.read("anything").unwrap(), None);
    }

    #[test]
    fn values_survive_a_new_store_instance() {
        let (_dir, store) = temp_store();
        store.write("ns:auth:accessToken", "abc").unwrap();

        let reopened = FileStore::new(store.path());
        assert_eq!(
            reopened.read("ns:auth:accessToken").unwrap().as_deref(),
            Some("abc")
        );
    }

    #[test]
    fn remove_and_clear_rewrite_the_file() {
        let (_dir, store) = temp_store();
        store.write("a", "1").unwrap();
        store.write("b", "2").unwrap();

        store.remove("a").unwrap();
        assert_eq!(store.read("a").unwrap(), None);
        assert_eq!(store.read("b").unwrap().as_deref(), Some("2"));

        store.clear().unwrap();
        assert_eq!(store.read("b").unwrap(), None);
    }

    #[test]
    fn corrupt_file_is_a_read_error() {
        let (_dir, store) = temp_store();
        fs::write(store.path(), b"not json").unwrap();

        let err = store.read("a").unwrap_err();
        assert_eq!(err.operation(), StorageOperation::Read);
        assert_eq!(err.key(), "a");
    }

    #[cfg(unix)]
    #[test]
    fn file_is_private_to_the_owner() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, store) = temp_store();
        store.write("a", "1").unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
