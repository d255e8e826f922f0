use crate::errors::{AppError, AppResult};
use crate::models::{ConsoleSettings, LeadFilters, LeadSort, Opportunity};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS kv_entries (
    key TEXT PRIMARY KEY,
    value_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
);";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    Filters,
    Sort,
    Opportunities,
    Settings,
}

impl StorageKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Filters => "leads-console-filters",
            Self::Sort => "leads-console-sort",
            Self::Opportunities => "leads-console-opportunities",
            Self::Settings => "leads-console-settings",
        }
    }
}

/// Durable string store. Every write replaces the whole value for its key.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> AppResult<()>;
    fn remove(&self, key: &str) -> AppResult<()>;
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Storage(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("store mutex poisoned".to_string()))
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT value_json FROM kv_entries WHERE key = ?1",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(raw)
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO kv_entries (key, value_json, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM kv_entries WHERE key = ?1", [key])?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| AppError::Internal("store mutex poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Serializing wrapper over a [`KeyValueStore`]. Reads fall back to the caller's default and
/// writes only log on failure, so callers keep working from memory when the store is gone.
#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn KeyValueStore>,
}

impl Persistence {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn save<T: Serialize + ?Sized>(&self, key: StorageKey, value: &T) {
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(error) => {
                tracing::warn!(key = key.as_str(), error = %error, "failed to encode value for storage");
                return;
            }
        };
        if let Err(error) = self.store.set(key.as_str(), &encoded) {
            tracing::warn!(key = key.as_str(), error = %error, "failed to save to storage");
        }
    }

    pub fn load<T: DeserializeOwned>(&self, key: StorageKey, default: T) -> T {
        let raw = match self.store.get(key.as_str()) {
            Ok(Some(raw)) if !raw.trim().is_empty() => raw,
            Ok(_) => return default,
            Err(error) => {
                tracing::warn!(key = key.as_str(), error = %error, "failed to load from storage");
                return default;
            }
        };

        match serde_json::from_str::<T>(&raw) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(key = key.as_str(), error = %error, "stored value is corrupt, using default");
                default
            }
        }
    }

    pub fn clear(&self, key: StorageKey) {
        if let Err(error) = self.store.remove(key.as_str()) {
            tracing::warn!(key = key.as_str(), error = %error, "failed to clear storage");
        }
    }

    pub fn load_filters(&self) -> LeadFilters {
        self.load(StorageKey::Filters, LeadFilters::default())
    }

    pub fn save_filters(&self, filters: &LeadFilters) {
        self.save(StorageKey::Filters, filters);
    }

    pub fn load_sort(&self) -> LeadSort {
        self.load(StorageKey::Sort, LeadSort::default())
    }

    pub fn save_sort(&self, sort: &LeadSort) {
        self.save(StorageKey::Sort, sort);
    }

    pub fn load_opportunities(&self) -> Vec<Opportunity> {
        self.load(StorageKey::Opportunities, Vec::new())
    }

    pub fn save_opportunities(&self, opportunities: &[Opportunity]) {
        self.save(StorageKey::Opportunities, opportunities);
    }

    pub fn load_settings(&self) -> ConsoleSettings {
        self.load(StorageKey::Settings, ConsoleSettings::default())
    }

    /// Merges a JSON patch into the stored settings. Unlike the view-state keys this
    /// reports failures, since the caller asked for the change explicitly.
    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<ConsoleSettings> {
        let current = self.load_settings();
        let mut merged = serde_json::to_value(current)?;
        merge_json(&mut merged, update);
        let mut settings: ConsoleSettings =
            serde_json::from_value(merged).map_err(|error| AppError::Validation(error.to_string()))?;
        settings.update_failure_rate = settings.update_failure_rate.clamp(0.0, 1.0);
        settings.convert_failure_rate = settings.convert_failure_rate.clamp(0.0, 1.0);

        self.store
            .set(StorageKey::Settings.as_str(), &serde_json::to_string(&settings)?)?;
        Ok(settings)
    }
}

fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}
