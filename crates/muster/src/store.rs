//! Persistence collaborator.
//!
//! Durable store for session history and the action log. The core
//! defines the schema and delegates CRUD mechanics; the default
//! implementation is a single JSON file rewritten on every mutation,
//! which is plenty for one operator clicking a dashboard.

use crate::actionlog::ActionLogEntry;
use crate::error::Result;
use crate::sessions::Session;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::RwLock;

/// Storage backend for sessions and the action log.
pub trait RigStore: Send + Sync {
    /// Insert or update a session by id.
    fn save_session(&self, session: &Session) -> Result<()>;

    /// All known sessions, oldest first.
    fn load_sessions(&self) -> Result<Vec<Session>>;

    /// Append one action log entry.
    fn append_log(&self, entry: &ActionLogEntry) -> Result<()>;

    /// All log entries, oldest first.
    fn load_log(&self) -> Result<Vec<ActionLogEntry>>;

    /// Persist to storage (if applicable).
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    sessions: Vec<Session>,
    log: Vec<ActionLogEntry>,
}

/// JSON-file-backed store.
pub struct FileStore {
    path: PathBuf,
    inner: RwLock<StoreData>,
}

impl FileStore {
    /// Open the store, loading existing data if the file is present.
    pub fn open(path: PathBuf) -> Result<Self> {
        let inner = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            StoreData::default()
        };

        Ok(Self {
            path,
            inner: RwLock::new(inner),
        })
    }

    fn save(&self, data: &StoreData) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        // Write-then-rename so a crash mid-write cannot truncate the store.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl RigStore for FileStore {
    fn save_session(&self, session: &Session) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        match inner.sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => *existing = session.clone(),
            None => inner.sessions.push(session.clone()),
        }
        self.save(&inner)
    }

    fn load_sessions(&self) -> Result<Vec<Session>> {
        Ok(self.inner.read().unwrap().sessions.clone())
    }

    fn append_log(&self, entry: &ActionLogEntry) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.log.push(entry.clone());
        self.save(&inner)
    }

    fn load_log(&self) -> Result<Vec<ActionLogEntry>> {
        Ok(self.inner.read().unwrap().log.clone())
    }

    fn flush(&self) -> Result<()> {
        let inner = self.inner.read().unwrap();
        self.save(&inner)
    }
}
