//! SettingsStore — redb-backed persistence for the charge configuration.
//!
//! Values are JSON-serialized into redb's `&[u8]` value column. Successful
//! writes publish the changed key on a broadcast channel so the controller
//! can reload exactly that key.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::debug;

use chargekeeper_core::types::{DEFAULT_CEILING, DEFAULT_FLOOR};

use crate::error::{StoreError, StoreResult};

/// Charge settings keyed by `SettingKey` name.
const SETTINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("settings");

/// Capacity of the change-notification channel. Laggards miss keys, which is
/// acceptable: the controller can always do a full reload.
const NOTIFY_CAPACITY: usize = 16;

/// The three persisted charge settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    Ceiling,
    Floor,
    Enabled,
}

impl SettingKey {
    /// The persisted key name.
    pub fn name(self) -> &'static str {
        match self {
            SettingKey::Ceiling => "charge.ceiling",
            SettingKey::Floor => "charge.floor",
            SettingKey::Enabled => "charge.enabled",
        }
    }

    /// All keys, in reload order.
    pub fn all() -> [SettingKey; 3] {
        [SettingKey::Ceiling, SettingKey::Floor, SettingKey::Enabled]
    }
}

/// Thread-safe settings store backed by redb.
#[derive(Clone)]
pub struct SettingsStore {
    db: Arc<Database>,
    notify: broadcast::Sender<SettingKey>,
    fail_writes: Arc<AtomicBool>,
}

impl SettingsStore {
    /// Open (or create) a persistent settings store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(|e| StoreError::Open(e.to_string()))?;
        let store = Self::wrap(db)?;
        debug!(?path, "settings store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory settings store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(|e| StoreError::Open(e.to_string()))?;
        let store = Self::wrap(db)?;
        debug!("in-memory settings store opened");
        Ok(store)
    }

    fn wrap(db: Database) -> StoreResult<Self> {
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        let store = Self {
            db: Arc::new(db),
            notify,
            fail_writes: Arc::new(AtomicBool::new(false)),
        };
        store.ensure_table()?;
        Ok(store)
    }

    /// Create the settings table if it doesn't exist yet.
    fn ensure_table(&self) -> StoreResult<()> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SETTINGS)
            .map_err(|e| StoreError::Table(e.to_string()))?;
        txn.commit()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        Ok(())
    }

    /// Subscribe to changed-key notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SettingKey> {
        self.notify.subscribe()
    }

    /// Make every subsequent write fail, so dependents can exercise
    /// persistence error paths without a real I/O fault. Shared across
    /// clones; reads are unaffected.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// The persisted ceiling, or the default (80) if unset or unreadable.
    pub fn ceiling(&self) -> StoreResult<u8> {
        Ok(self.get(SettingKey::Ceiling)?.unwrap_or(DEFAULT_CEILING))
    }

    /// The persisted floor, or the default (75) if unset or unreadable.
    pub fn floor(&self) -> StoreResult<u8> {
        Ok(self.get(SettingKey::Floor)?.unwrap_or(DEFAULT_FLOOR))
    }

    /// The persisted master toggle, defaulting to disabled.
    pub fn enabled(&self) -> StoreResult<bool> {
        Ok(self.get(SettingKey::Enabled)?.unwrap_or(false))
    }

    /// Persist the ceiling and notify watchers.
    pub fn set_ceiling(&self, level: u8) -> StoreResult<()> {
        self.put(SettingKey::Ceiling, &level)
    }

    /// Persist the floor and notify watchers.
    pub fn set_floor(&self, level: u8) -> StoreResult<()> {
        self.put(SettingKey::Floor, &level)
    }

    /// Persist the master toggle and notify watchers.
    pub fn set_enabled(&self, enabled: bool) -> StoreResult<()> {
        self.put(SettingKey::Enabled, &enabled)
    }

    fn get<T: DeserializeOwned>(&self, key: SettingKey) -> StoreResult<Option<T>> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        let table = txn
            .open_table(SETTINGS)
            .map_err(|e| StoreError::Table(e.to_string()))?;
        match table
            .get(key.name())
            .map_err(|e| StoreError::Read(e.to_string()))?
        {
            Some(guard) => {
                let value = serde_json::from_slice(guard.value())
                    .map_err(|e| StoreError::Deserialize(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(&self, key: SettingKey, value: &T) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Write("injected".to_string()));
        }
        let bytes = serde_json::to_vec(value).map_err(|e| StoreError::Serialize(e.to_string()))?;
        let txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        {
            let mut table = txn
                .open_table(SETTINGS)
                .map_err(|e| StoreError::Table(e.to_string()))?;
            table
                .insert(key.name(), bytes.as_slice())
                .map_err(|e| StoreError::Write(e.to_string()))?;
        }
        txn.commit()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        debug!(key = key.name(), "setting stored");
        // Nobody listening is fine (e.g. before the watcher starts).
        let _ = self.notify.send(key);
        Ok(())
    }
}
