use crate::errors::{AppError, AppResult};
use crate::models::AppSettings;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Logical keys of the key-value store. Each key holds one whole JSON value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    Operators,
    Contracts,
    Invoices,
    EmailNotifications,
    EmailConfig,
    AppSettings,
}

impl StoreKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Operators => "operators",
            Self::Contracts => "contracts",
            Self::Invoices => "invoices",
            Self::EmailNotifications => "emailNotifications",
            Self::EmailConfig => "emailConfig",
            Self::AppSettings => "appSettings",
        }
    }
}

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        let db = Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        };

        db.ensure_default_settings()?;

        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn read_raw(&self, key: StoreKey) -> AppResult<Option<String>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let raw = conn
            .query_row(
                "SELECT value_json FROM store WHERE key = ?1",
                [key.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(raw)
    }

    fn write_raw(&self, key: StoreKey, raw: &str) -> AppResult<()> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO store (key, value_json, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
            params![key.as_str(), raw, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Strict read: a missing key is an empty collection, a value that does not
    /// parse is an error.
    pub fn try_read_collection<T: DeserializeOwned>(&self, key: StoreKey) -> AppResult<Vec<T>> {
        match self.read_raw(key)? {
            Some(raw) => serde_json::from_str::<Vec<T>>(&raw).map_err(|error| {
                AppError::Storage(format!("malformed '{}' collection: {}", key.as_str(), error))
            }),
            None => Ok(Vec::new()),
        }
    }

    /// Lenient read used by the CRUD surface: failures degrade to an empty
    /// collection.
    pub fn read_collection<T: DeserializeOwned>(&self, key: StoreKey) -> Vec<T> {
        match self.try_read_collection(key) {
            Ok(items) => items,
            Err(error) => {
                tracing::warn!(key = key.as_str(), error = %error, "failed to read collection, treating as empty");
                Vec::new()
            }
        }
    }

    pub fn write_collection<T: Serialize>(&self, key: StoreKey, items: &[T]) -> AppResult<()> {
        let raw = serde_json::to_string(items)?;
        self.write_raw(key, &raw)
    }

    pub fn read_value<T: DeserializeOwned>(&self, key: StoreKey) -> AppResult<Option<T>> {
        match self.read_raw(key)? {
            Some(raw) => Ok(Some(serde_json::from_str::<T>(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn write_value<T: Serialize>(&self, key: StoreKey, value: &T) -> AppResult<()> {
        let raw = serde_json::to_string(value)?;
        self.write_raw(key, &raw)
    }

    /// Stores a JSON document exported from the browser client as-is. Only the
    /// JSON syntax is checked; shape mismatches surface on the next read.
    pub fn import_raw(&self, key: StoreKey, raw: &str) -> AppResult<()> {
        serde_json::from_str::<serde_json::Value>(raw)?;
        self.write_raw(key, raw)
    }

    pub fn get_settings(&self) -> AppResult<AppSettings> {
        match self.read_raw(StoreKey::AppSettings)? {
            Some(raw) => match serde_json::from_str::<AppSettings>(&raw) {
                Ok(settings) if settings.validate().is_ok() => Ok(settings),
                _ => {
                    tracing::warn!("stored settings are invalid, using defaults");
                    Ok(AppSettings::default())
                }
            },
            None => Ok(AppSettings::default()),
        }
    }

    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<AppSettings> {
        let current = self.get_settings()?;
        let mut merged = serde_json::to_value(current)?;
        merge_json(&mut merged, update);
        let settings: AppSettings = serde_json::from_value(merged)?;
        settings.validate()?;
        self.write_value(StoreKey::AppSettings, &settings)?;
        Ok(settings)
    }

    fn ensure_default_settings(&self) -> AppResult<()> {
        if self.read_raw(StoreKey::AppSettings)?.is_none() {
            self.write_value(StoreKey::AppSettings, &AppSettings::default())?;
        }
        Ok(())
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
