use crate::error::{AppError, Result};
use crate::store::*;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

/// Storage key for the profile record.
const KEY_USER: &str = "user";
/// Storage key for the book collection.
const KEY_BOOKS: &str = "books";
/// Storage key for the progress collection.
const KEY_PROGRESS: &str = "progress";

/// Key-value store for thread-safe access.
///
/// Each collection lives under one key as one JSON document; writes
/// replace the whole document. The library is small enough that this
/// stays cheap, and it keeps the on-disk value identical to the
/// export format.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open or create the store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open store: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.initialize_schema()?;
        Ok(store)
    }

    /// Open in-memory store (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open store: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize store schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            -- One JSON document per collection
            CREATE TABLE IF NOT EXISTS records (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    // ========== RAW KEY-VALUE OPERATIONS ==========

    /// Read the raw JSON document stored under a key.
    fn read_raw(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM records WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to read '{}': {}", key, e)))
    }

    /// Write a raw JSON document under a key, replacing any previous value.
    fn write_raw(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO records (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .map_err(|e| AppError::Internal(format!("Failed to write '{}': {}", key, e)))?;
        Ok(())
    }

    /// Read a collection, defaulting to empty when the key was never written.
    ///
    /// A stored document that no longer parses is a real fault and
    /// propagates to the caller instead of masquerading as empty data.
    fn read_collection<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        match self.read_raw(key)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    /// Serialize a value and store it under a key.
    fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.write_raw(key, &serde_json::to_string(value)?)
    }

    // ========== PROFILE OPERATIONS ==========

    /// Get the profile, or a fresh default when none was ever saved.
    pub fn user(&self) -> Result<User> {
        match self.read_raw(KEY_USER)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(User::default_profile()),
        }
    }

    /// Whether a profile was ever saved.
    pub fn has_user(&self) -> Result<bool> {
        Ok(self.read_raw(KEY_USER)?.is_some())
    }

    /// Replace the stored profile.
    pub fn save_user(&self, user: &User) -> Result<()> {
        self.write_json(KEY_USER, user)
    }

    // ========== BOOK OPERATIONS ==========

    /// All books, in insertion order.
    pub fn books(&self) -> Result<Vec<Book>> {
        self.read_collection(KEY_BOOKS)
    }

    /// Replace the whole book collection.
    pub fn save_books(&self, books: &[Book]) -> Result<()> {
        self.write_json(KEY_BOOKS, &books)
    }

    // ========== PROGRESS OPERATIONS ==========

    /// All progress records.
    pub fn progress(&self) -> Result<Vec<Progress>> {
        self.read_collection(KEY_PROGRESS)
    }

    /// Replace the whole progress collection.
    pub fn save_progress(&self, progress: &[Progress]) -> Result<()> {
        self.write_json(KEY_PROGRESS, &progress)
    }

    // ========== BACKUP OPERATIONS ==========

    /// Export the three collections as one pretty-printed JSON document.
    pub fn export_all(&self) -> Result<String> {
        let snapshot = Snapshot {
            user: Some(self.user()?),
            books: Some(self.books()?),
            progress: Some(self.progress()?),
        };

        Ok(serde_json::to_string_pretty(&snapshot)?)
    }

    /// Import a backup document, applying whichever collections it carries.
    ///
    /// The whole document is parsed before anything is written, so a
    /// malformed payload leaves the store untouched.
    pub fn import_all(&self, data: &str) -> Result<()> {
        let snapshot: Snapshot = serde_json::from_str(data)?;

        if let Some(user) = &snapshot.user {
            self.save_user(user)?;
        }
        if let Some(books) = &snapshot.books {
            self.save_books(books)?;
        }
        if let Some(progress) = &snapshot.progress {
            self.save_progress(progress)?;
        }

        Ok(())
    }

    /// Remove every stored collection.
    pub fn clear_all(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM records", [])
            .map_err(|e| AppError::Internal(format!("Failed to clear store: {}", e)))?;
        Ok(())
    }
}
