//! Action Log
//!
//! Append-only record of who did what, when, against which device.
//! Every mutating operation appends here; the dashboard reads it
//! newest-first. The core never mutates or prunes entries - retention is
//! the storage layer's concern.

use crate::error::Result;
use crate::store::RigStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// One logged operator action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLogEntry {
    /// Monotonically increasing identifier.
    pub id: u64,
    pub user: String,
    pub timestamp: DateTime<Utc>,
    /// What the action was aimed at (device name, session folder, ...).
    pub target: String,
    /// Target category: "camera", "rpi", "session".
    pub category: String,
    /// Verb, e.g. "start recording", "kill".
    pub action: String,
}

/// Append-only action log, write-through to the store.
pub struct ActionLog {
    store: Arc<dyn RigStore>,
    entries: Mutex<Vec<ActionLogEntry>>,
    next_id: AtomicU64,
}

impl ActionLog {
    /// Reload the log from the store and resume the id sequence.
    pub fn load(store: Arc<dyn RigStore>) -> Result<Self> {
        let entries = store.load_log()?;
        let next_id = entries.iter().map(|e| e.id).max().map_or(0, |id| id + 1);
        Ok(Self {
            store,
            entries: Mutex::new(entries),
            next_id: AtomicU64::new(next_id),
        })
    }

    /// Append one entry. No deduplication, ever.
    pub fn append(
        &self,
        user: impl Into<String>,
        target: impl Into<String>,
        category: impl Into<String>,
        action: impl Into<String>,
    ) -> Result<ActionLogEntry> {
        let entry = ActionLogEntry {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            user: user.into(),
            timestamp: Utc::now(),
            target: target.into(),
            category: category.into(),
            action: action.into(),
        };

        self.store.append_log(&entry)?;
        tracing::info!(
            log.id = entry.id,
            user = %entry.user,
            target = %entry.target,
            action = %entry.action,
            "action logged"
        );

        self.entries.lock().unwrap().push(entry.clone());
        Ok(entry)
    }

    /// Entries newest-first, paginated by the caller.
    pub fn recent(&self, offset: usize, limit: usize) -> Vec<ActionLogEntry> {
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}
