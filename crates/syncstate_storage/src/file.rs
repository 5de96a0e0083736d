//! Directory-backed record store.
//!
//! Layout:
//!
//! ```text
//! <root>/
//! ├─ LOCK                 # Advisory lock serializing compare-and-swap
//! ├─ VERSION              # Last version handed out, shared by all objects
//! ├─ <name>.rec           # One CBOR-encoded object per file
//! └─ <name>.rec.tmp       # Transient, renamed over <name>.rec on write
//! ```
//!
//! Every mutation takes an exclusive advisory lock on `LOCK`, so several
//! processes can share one directory and still get per-object
//! compare-and-swap semantics. Reads take a shared lock.

use crate::error::{StorageError, StorageResult};
use crate::store::{matches_selector, validate_name, Labels, RecordStore, StoredObject};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const LOCK_FILE: &str = "LOCK";
const VERSION_FILE: &str = "VERSION";
const OBJECT_EXT: &str = "rec";
const TEMP_EXT: &str = "rec.tmp";

/// A record store persisted as one file per object.
///
/// # Durability
///
/// Writes go to a temporary file that is synced and then renamed over the
/// object file, so a crash never leaves a half-written object behind.
///
/// # Example
///
/// ```no_run
/// use syncstate_storage::{FileStore, Labels, RecordStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("/var/lib/syncstate")).unwrap();
/// store.create("tunnel-abc", &Labels::new(), b"payload").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    // flock is per open file description; this keeps threads of one
    // process from racing on the same descriptor setup.
    local: Mutex<()>,
}

impl FileStore {
    /// Opens a store rooted at `path`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the path exists but is not a directory, or if
    /// the lock file cannot be created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("not a directory: {}", path.display()),
            )));
        }

        let store = Self {
            root: path.to_path_buf(),
            local: Mutex::new(()),
        };
        store.open_lock_file()?;
        store.with_lock(true, || {
            store.remove_stale_temp_files()?;
            store.seed_version_counter()
        })?;
        debug!(path = %path.display(), "opened file store");
        Ok(store)
    }

    /// Returns the root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    fn open_lock_file(&self) -> StorageResult<File> {
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.root.join(LOCK_FILE))?)
    }

    fn object_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{OBJECT_EXT}"))
    }

    fn temp_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{TEMP_EXT}"))
    }

    fn with_lock<T>(
        &self,
        exclusive: bool,
        f: impl FnOnce() -> StorageResult<T>,
    ) -> StorageResult<T> {
        let _local = self.local.lock();
        let lock = self.open_lock_file()?;
        if exclusive {
            FileExt::lock_exclusive(&lock)?;
        } else {
            FileExt::lock_shared(&lock)?;
        }

        let result = f();
        FileExt::unlock(&lock)?;
        result
    }

    /// Removes temp files left by a writer that died before its rename.
    fn remove_stale_temp_files(&self) -> StorageResult<()> {
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            let is_temp = path
                .extension()
                .is_some_and(|ext| ext == "tmp");
            if is_temp {
                debug!(path = %path.display(), "removing stale temp file");
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Initializes `VERSION` from the objects on disk if it is missing.
    fn seed_version_counter(&self) -> StorageResult<()> {
        if self.root.join(VERSION_FILE).exists() {
            return Ok(());
        }
        let mut highest = 0;
        for name in self.object_names()? {
            match self.read_object(&name) {
                Ok(Some(object)) => highest = highest.max(object.version),
                Ok(None) => {}
                Err(e) => warn!(object = %name, error = %e, "skipping undecodable object"),
            }
        }
        self.store_last_version(highest)
    }

    fn load_last_version(&self) -> StorageResult<u64> {
        match fs::read_to_string(self.root.join(VERSION_FILE)) {
            Ok(text) => text
                .trim()
                .parse()
                .map_err(|e| StorageError::Corrupted(format!("{VERSION_FILE}: {e}"))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn store_last_version(&self, version: u64) -> StorageResult<()> {
        let temp = self.root.join(format!("{VERSION_FILE}.tmp"));
        fs::write(&temp, version.to_string())?;
        fs::rename(&temp, self.root.join(VERSION_FILE))?;
        Ok(())
    }

    /// Hands out the next version. Callers hold the exclusive lock.
    fn next_version(&self, at_least: u64) -> StorageResult<u64> {
        let next = self.load_last_version()?.max(at_least) + 1;
        self.store_last_version(next)?;
        Ok(next)
    }

    fn object_names(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(OBJECT_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn read_object(&self, name: &str) -> StorageResult<Option<StoredObject>> {
        let bytes = match fs::read(self.object_path(name)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        decode_object(&bytes).map(Some)
    }

    fn write_object(&self, object: &StoredObject) -> StorageResult<()> {
        let mut encoded = Vec::new();
        ciborium::into_writer(object, &mut encoded)
            .map_err(|e| StorageError::Corrupted(format!("encode {}: {e}", object.name)))?;

        let temp = self.temp_path(&object.name);
        {
            let mut file = File::create(&temp)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }
        fs::rename(&temp, self.object_path(&object.name))?;
        Ok(())
    }
}

fn decode_object(bytes: &[u8]) -> StorageResult<StoredObject> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Corrupted(e.to_string()))
}

impl RecordStore for FileStore {
    fn get(&self, name: &str) -> StorageResult<Option<StoredObject>> {
        if validate_name(name).is_err() {
            return Ok(None);
        }
        self.with_lock(false, || self.read_object(name))
    }

    fn create(&self, name: &str, labels: &Labels, data: &[u8]) -> StorageResult<StoredObject> {
        validate_name(name)?;

        self.with_lock(true, || {
            if self.object_path(name).exists() {
                return Err(StorageError::AlreadyExists {
                    name: name.to_string(),
                });
            }

            let object = StoredObject {
                name: name.to_string(),
                version: self.next_version(0)?,
                labels: labels.clone(),
                data: data.to_vec(),
            };
            self.write_object(&object)?;
            Ok(object)
        })
    }

    fn update(
        &self,
        name: &str,
        expected_version: u64,
        data: &[u8],
    ) -> StorageResult<StoredObject> {
        validate_name(name)?;

        self.with_lock(true, || {
            let mut object = self.read_object(name)?.ok_or_else(|| StorageError::NotFound {
                name: name.to_string(),
            })?;

            if object.version != expected_version {
                return Err(StorageError::VersionConflict {
                    name: name.to_string(),
                    expected: expected_version,
                    actual: object.version,
                });
            }

            object.version = self.next_version(object.version)?;
            object.data = data.to_vec();
            self.write_object(&object)?;
            Ok(object)
        })
    }

    fn delete(&self, name: &str, expected_version: Option<u64>) -> StorageResult<()> {
        validate_name(name)?;

        self.with_lock(true, || {
            let object = self.read_object(name)?.ok_or_else(|| StorageError::NotFound {
                name: name.to_string(),
            })?;

            if let Some(expected) = expected_version {
                if object.version != expected {
                    return Err(StorageError::VersionConflict {
                        name: name.to_string(),
                        expected,
                        actual: object.version,
                    });
                }
            }

            fs::remove_file(self.object_path(name))?;
            Ok(())
        })
    }

    fn names(&self) -> StorageResult<Vec<String>> {
        self.with_lock(false, || self.object_names())
    }

    fn list(&self, selector: &Labels) -> StorageResult<Vec<StoredObject>> {
        self.with_lock(false, || {
            let mut objects = Vec::new();
            for name in self.object_names()? {
                let Some(object) = self.read_object(&name).inspect_err(|e| {
                    warn!(object = %name, error = %e, "undecodable object file");
                })?
                else {
                    continue;
                };
                if matches_selector(&object.labels, selector) {
                    objects.push(object);
                }
            }
            Ok(objects)
        })
    }
}
