//! File-backed entity store.

use crate::error::{StoreError, StoreResult};
use crate::memory::{InMemoryStore, MemoryState};
use crate::model::{Access, Account, Alert, Budget, Category, Row, Transaction, UserData, UserId};
use crate::store::{EntityStore, StoreWriter};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Extension of the advisory lock file next to the state file.
const LOCK_EXTENSION: &str = "lock";
/// Extension of the temporary file used for atomic commits.
const TEMP_EXTENSION: &str = "tmp";

/// A file-backed entity store.
///
/// The whole state is held in memory and written back on every commit.
///
/// ## File Format
///
/// ```text
/// <64 hex chars: SHA-256 of the JSON body>\n<JSON body>
/// ```
///
/// # Durability
///
/// A commit writes the new state to `<path>.tmp`, syncs it and renames it
/// over `<path>`. If any of these steps fails the transaction is rolled
/// back and the in-memory state is left untouched.
///
/// # Locking
///
/// An exclusive advisory lock on `<path>.lock` is held for the lifetime of
/// the store, so two processes can never commit to the same file.
///
/// # Example
///
/// ```no_run
/// use tally_store::{Category, EntityStore, FileStore, UserId};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("tally.json")).unwrap();
/// store
///     .with_transaction(UserId(1), &mut |w| {
///         w.insert_categories(vec![Category::new("Rent")])?;
///         Ok(())
///     })
///     .unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: InMemoryStore,
    _lock_file: File,
}

impl FileStore {
    /// Opens the store at `path`, creating an empty one if the file does
    /// not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another process holds the lock (`Locked`)
    /// - The file exists but its checksum does not match (`Corrupted`)
    /// - I/O or deserialization fails
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.with_extension(LOCK_EXTENSION))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked);
        }

        let state = if path.exists() {
            let state = read_state(path)?;
            info!(path = %path.display(), "opened store");
            state
        } else {
            debug!(path = %path.display(), "creating empty store");
            MemoryState::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            inner: InMemoryStore::from_state(state),
            _lock_file: lock_file,
        })
    }

    /// Returns the path of the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn checksum(body: &[u8]) -> String {
    Sha256::digest(body)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn read_state(path: &Path) -> StoreResult<MemoryState> {
    let contents = fs::read(path)?;
    let split = contents
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| StoreError::corrupted("missing checksum line"))?;
    let (header, body) = (&contents[..split], &contents[split + 1..]);

    let expected = std::str::from_utf8(header)
        .map_err(|_| StoreError::corrupted("checksum line is not UTF-8"))?;
    let actual = checksum(body);
    if expected != actual {
        return Err(StoreError::corrupted(format!(
            "checksum mismatch: expected {expected}, got {actual}"
        )));
    }

    Ok(serde_json::from_slice(body)?)
}

fn write_state(path: &Path, state: &MemoryState) -> StoreResult<()> {
    let body = serde_json::to_vec(state)?;
    let temp_path = path.with_extension(TEMP_EXTENSION);

    let mut file = File::create(&temp_path)?;
    file.write_all(checksum(&body).as_bytes())?;
    file.write_all(b"\n")?;
    file.write_all(&body)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;
    Ok(())
}

impl EntityStore for FileStore {
    fn list_accesses(&self, user: UserId) -> StoreResult<Vec<Row<Access>>> {
        self.inner.list_accesses(user)
    }

    fn list_accounts(&self, user: UserId) -> StoreResult<Vec<Row<Account>>> {
        self.inner.list_accounts(user)
    }

    fn list_categories(&self, user: UserId) -> StoreResult<Vec<Row<Category>>> {
        self.inner.list_categories(user)
    }

    fn list_transactions(&self, user: UserId) -> StoreResult<Vec<Row<Transaction>>> {
        self.inner.list_transactions(user)
    }

    fn list_budgets(&self, user: UserId) -> StoreResult<Vec<Row<Budget>>> {
        self.inner.list_budgets(user)
    }

    fn list_settings(&self, user: UserId) -> StoreResult<BTreeMap<String, String>> {
        self.inner.list_settings(user)
    }

    fn list_alerts(&self, user: UserId) -> StoreResult<Vec<Row<Alert>>> {
        self.inner.list_alerts(user)
    }

    fn read_user(&self, user: UserId) -> StoreResult<UserData> {
        self.inner.read_user(user)
    }

    fn with_transaction(
        &self,
        user: UserId,
        work: &mut dyn FnMut(&mut dyn StoreWriter) -> StoreResult<()>,
    ) -> StoreResult<()> {
        self.inner
            .transact(user, work, |staged| write_state(&self.path, staged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        {
            let store = FileStore::open(&path).unwrap();
            store
                .with_transaction(UserId(3), &mut |w| {
                    w.insert_categories(vec![Category::new("Rent")])?;
                    w.put_setting("locale", "fr")?;
                    Ok(())
                })
                .unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        let categories = store.list_categories(UserId(3)).unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].value.label, "Rent");
        assert_eq!(
            store.list_settings(UserId(3)).unwrap().get("locale").map(String::as_str),
            Some("fr")
        );
    }

    #[test]
    fn file_store_sequences_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        {
            let store = FileStore::open(&path).unwrap();
            store
                .with_transaction(UserId(1), &mut |w| {
                    w.insert_categories(vec![Category::new("A"), Category::new("B")])?;
                    Ok(())
                })
                .unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        let mut ids = Vec::new();
        store
            .with_transaction(UserId(1), &mut |w| {
                ids = w.insert_categories(vec![Category::new("C")])?;
                Ok(())
            })
            .unwrap();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn file_store_is_exclusive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let _first = FileStore::open(&path).unwrap();
        assert!(matches!(FileStore::open(&path), Err(StoreError::Locked)));
    }

    #[test]
    fn file_store_detects_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        {
            let store = FileStore::open(&path).unwrap();
            store
                .with_transaction(UserId(1), &mut |w| {
                    w.insert_categories(vec![Category::new("Rent")])?;
                    Ok(())
                })
                .unwrap();
        }

        let mut contents = fs::read(&path).unwrap();
        let last = contents.len() - 2;
        contents[last] ^= 0x01;
        fs::write(&path, contents).unwrap();

        assert!(matches!(
            FileStore::open(&path),
            Err(StoreError::Corrupted(_))
        ));
    }

    #[test]
    fn failed_transaction_is_not_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        {
            let store = FileStore::open(&path).unwrap();
            let _ = store.with_transaction(UserId(1), &mut |w| {
                w.insert_categories(vec![Category::new("Rent")])?;
                Err(StoreError::write_failed("abort"))
            });
        }

        assert!(!path.exists());
    }
}
