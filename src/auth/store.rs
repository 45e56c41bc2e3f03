//! Credential store: password hash → profile id, persisted as one JSON object.
//!
//! Snapshot layout (pretty-printed, keys in insertion order):
//!
//! ```json
//! {
//!   "$2b$12$...": "Default",
//!   "$2b$12$...": "Profile 1"
//! }
//! ```
//!
//! The whole snapshot is reloaded at the start of every operation and written
//! back wholesale on every mutation. Mutations go through
//! [`CredentialStore::begin`], which holds the process-wide store lock for the
//! full load → modify → save sequence.

use anyhow::{Context, Result};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

/// One stored credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub password_hash: String,
    pub profile_id: String,
}

/// In-memory view of a snapshot.
///
/// Records keep snapshot order. Two indexes sit alongside them: hash → position
/// (primary key) and profile → position of the first record for that profile.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    records: Vec<CredentialRecord>,
    by_hash: HashMap<String, usize>,
    by_profile: HashMap<String, usize>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a snapshot. Anything other than a JSON object of strings is an error.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).context("snapshot is not valid JSON")?;
        let serde_json::Value::Object(map) = value else {
            anyhow::bail!("snapshot root is not a JSON object");
        };

        let mut credentials = Self::new();
        for (hash, profile) in map {
            let serde_json::Value::String(profile) = profile else {
                anyhow::bail!("profile for a stored hash is not a string");
            };
            credentials.insert(hash, profile);
        }
        Ok(credentials)
    }

    pub fn to_json(&self) -> Result<String> {
        let map: serde_json::Map<String, serde_json::Value> = self
            .records
            .iter()
            .map(|r| {
                (
                    r.password_hash.clone(),
                    serde_json::Value::String(r.profile_id.clone()),
                )
            })
            .collect();
        serde_json::to_string_pretty(&serde_json::Value::Object(map))
            .context("Failed to serialize credential snapshot")
    }

    /// Append a record. Returns `false` (and changes nothing) if the hash is
    /// already a key.
    pub fn insert(&mut self, password_hash: String, profile_id: String) -> bool {
        if self.by_hash.contains_key(&password_hash) {
            return false;
        }
        let idx = self.records.len();
        self.by_hash.insert(password_hash.clone(), idx);
        self.by_profile.entry(profile_id.clone()).or_insert(idx);
        self.records.push(CredentialRecord {
            password_hash,
            profile_id,
        });
        true
    }

    /// Remove the record keyed by `password_hash`.
    pub fn remove(&mut self, password_hash: &str) -> Option<CredentialRecord> {
        let idx = self.by_hash.get(password_hash).copied()?;
        let removed = self.records.remove(idx);
        self.reindex();
        Some(removed)
    }

    /// Hash stored for `profile_id`. With duplicate records for one profile,
    /// the first in snapshot order wins.
    pub fn find_by_profile(&self, profile_id: &str) -> Option<&str> {
        self.by_profile
            .get(profile_id)
            .map(|&idx| self.records[idx].password_hash.as_str())
    }

    pub fn contains_profile(&self, profile_id: &str) -> bool {
        self.by_profile.contains_key(profile_id)
    }

    pub fn contains_hash(&self, password_hash: &str) -> bool {
        self.by_hash.contains_key(password_hash)
    }

    pub fn get(&self, password_hash: &str) -> Option<&str> {
        self.by_hash
            .get(password_hash)
            .map(|&idx| self.records[idx].profile_id.as_str())
    }

    /// Records in snapshot order.
    pub fn iter(&self) -> impl Iterator<Item = &CredentialRecord> {
        self.records.iter()
    }

    /// Profile ids in snapshot order.
    pub fn profiles(&self) -> Vec<String> {
        self.records.iter().map(|r| r.profile_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn reindex(&mut self) {
        self.by_hash.clear();
        self.by_profile.clear();
        for (idx, record) in self.records.iter().enumerate() {
            self.by_hash.insert(record.password_hash.clone(), idx);
            self.by_profile
                .entry(record.profile_id.clone())
                .or_insert(idx);
        }
    }
}

/// Where snapshots live.
pub trait CredentialBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Raw snapshot bytes, or `None` if nothing has been written yet.
    fn read(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the snapshot. Readers must see either the old or the new
    /// contents, never a mix.
    fn write(&self, contents: &str) -> Result<()>;
}

/// Snapshot file on disk, replaced via temp file + rename.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialBackend for JsonFileBackend {
    fn name(&self) -> &str {
        "json-file"
    }

    fn read(&self) -> Result<Option<Vec<u8>>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read {}", self.path.display())),
        }
    }

    fn write(&self, contents: &str) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(contents.as_bytes())
            .context("Failed to write credential snapshot")?;
        tmp.as_file()
            .sync_all()
            .context("Failed to flush credential snapshot")?;
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

/// Snapshot held in memory. Used by tests and ephemeral servers.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    contents: Mutex<Option<Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from raw snapshot bytes (which need not be valid).
    pub fn with_contents(contents: impl Into<Vec<u8>>) -> Self {
        Self {
            contents: Mutex::new(Some(contents.into())),
        }
    }
}

impl CredentialBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn read(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.contents.lock().clone())
    }

    fn write(&self, contents: &str) -> Result<()> {
        *self.contents.lock() = Some(contents.as_bytes().to_vec());
        Ok(())
    }
}

/// Credential store over a backend, with the process-wide write lock.
pub struct CredentialStore {
    backend: Box<dyn CredentialBackend>,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(backend: impl CredentialBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            write_lock: Mutex::new(()),
        }
    }

    /// File-backed store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::new(JsonFileBackend::new(path))
    }

    /// In-memory store starting empty.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Write an empty snapshot if none exists yet.
    pub fn ensure_initialized(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        if self.backend.read()?.is_none() {
            self.backend.write("{}")?;
            tracing::info!(backend = self.backend.name(), "Created empty credential snapshot");
        }
        Ok(())
    }

    /// Read the current snapshot.
    ///
    /// A missing snapshot is empty. A corrupt one is logged and also treated as
    /// empty; only backend I/O failures are errors.
    pub fn load(&self) -> Result<Credentials> {
        let Some(bytes) = self.backend.read()? else {
            return Ok(Credentials::new());
        };
        match Credentials::from_json(&bytes) {
            Ok(credentials) => Ok(credentials),
            Err(e) => {
                tracing::warn!(
                    backend = self.backend.name(),
                    error = %format!("{e:#}"),
                    "Credential snapshot is corrupt, using empty configuration"
                );
                Ok(Credentials::new())
            }
        }
    }

    /// Overwrite the snapshot with `credentials`.
    pub fn save(&self, credentials: &Credentials) -> Result<()> {
        let json = credentials.to_json()?;
        self.backend.write(&json)
    }

    /// Hash stored for `profile_id` in a loaded snapshot.
    pub fn find_by_profile<'a>(credentials: &'a Credentials, profile_id: &str) -> Option<&'a str> {
        credentials.find_by_profile(profile_id)
    }

    /// Take the store lock and load the snapshot. Changes are written only by
    /// [`StoreTransaction::commit`]; dropping the transaction discards them.
    pub fn begin(&self) -> Result<StoreTransaction<'_>> {
        let guard = self.write_lock.lock();
        let credentials = self.load()?;
        Ok(StoreTransaction {
            store: self,
            credentials,
            _guard: guard,
        })
    }
}

/// A locked load → modify → save unit.
pub struct StoreTransaction<'a> {
    store: &'a CredentialStore,
    credentials: Credentials,
    _guard: MutexGuard<'a, ()>,
}

impl StoreTransaction<'_> {
    /// Persist the modified snapshot, then release the lock.
    pub fn commit(self) -> Result<()> {
        self.store.save(&self.credentials)
    }

    /// Release the lock without saving, keeping the loaded snapshot.
    pub fn into_snapshot(self) -> Credentials {
        self.credentials
    }
}

impl Deref for StoreTransaction<'_> {
    type Target = Credentials;

    fn deref(&self) -> &Credentials {
        &self.credentials
    }
}

impl DerefMut for StoreTransaction<'_> {
    fn deref_mut(&mut self) -> &mut Credentials {
        &mut self.credentials
    }
}
