//! Process Tracker
//!
//! In-memory ledger of running recording and preview processes, keyed by
//! device. At most one entry per device at any time. Operations that
//! involve network or process I/O follow a reserve / commit / abort
//! discipline: the slot is reserved under the lock, the I/O happens with
//! the lock released, and the reservation is committed or rolled back
//! based on the outcome. A reservation that is never committed leaves no
//! trace in `list_active`.

use crate::error::{Result, RigError};
use crate::registry::{Device, DeviceKind, DeviceName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Opaque process identifier: local PID or PID on a remote controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "pid", rename_all = "snake_case")]
pub enum ProcessId {
    Local(u32),
    Remote(u32),
}

impl ProcessId {
    pub fn raw(&self) -> u32 {
        match self {
            ProcessId::Local(pid) | ProcessId::Remote(pid) => *pid,
        }
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessId::Local(pid) => write!(f, "{}", pid),
            ProcessId::Remote(pid) => write!(f, "remote:{}", pid),
        }
    }
}

/// A live reference to a running process on a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessHandle {
    pub pid: ProcessId,
    pub device: DeviceName,
    pub kind: DeviceKind,
    pub description: String,
    /// Block this process writes to, if it is a recording.
    pub block: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Listing scope for active processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// All local camera processes.
    Local,
    /// Remote processes, optionally narrowed to one controller role.
    Remote(Option<String>),
    /// Everything.
    All,
}

impl Scope {
    fn matches(&self, kind: &DeviceKind) -> bool {
        match (self, kind) {
            (Scope::All, _) => true,
            (Scope::Local, DeviceKind::Local) => true,
            (Scope::Remote(None), DeviceKind::Remote { .. }) => true,
            (Scope::Remote(Some(wanted)), DeviceKind::Remote { rpi_type }) => wanted == rpi_type,
            _ => false,
        }
    }
}

/// Tracker statistics for the health endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TrackerStats {
    pub reserved: usize,
    pub running: usize,
}

enum Entry {
    /// Slot held while a start is in flight. Never listed, but the
    /// target block is recorded so lifecycle checks see it as busy.
    Reserved {
        description: String,
        block: Option<String>,
    },
    Running(ProcessHandle),
}

/// Ledger of running processes, one slot per device.
#[derive(Clone)]
pub struct ProcessTracker {
    entries: Arc<Mutex<HashMap<DeviceName, Entry>>>,
}

impl ProcessTracker {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Reserve the device's slot ahead of a start attempt.
    ///
    /// Fails with a conflict if the device already has a reservation or a
    /// running process.
    pub fn reserve(
        &self,
        device: &Device,
        description: &str,
        block: Option<String>,
    ) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(device.name()) {
            return Err(RigError::Conflict(format!(
                "{} already has a running or starting process",
                device.name()
            )));
        }
        entries.insert(
            device.name().clone(),
            Entry::Reserved {
                description: description.to_string(),
                block,
            },
        );
        tracing::debug!(device = %device.name(), "slot reserved");
        Ok(())
    }

    /// Commit a reservation with the pid the start produced. The handle
    /// inherits the reservation's description and block.
    pub fn commit(&self, device: &Device, pid: ProcessId) -> Result<ProcessHandle> {
        let mut entries = self.entries.lock().unwrap();
        let name = device.name();
        match entries.get(name) {
            Some(Entry::Reserved { description, block }) => {
                let handle = ProcessHandle {
                    pid,
                    device: name.clone(),
                    kind: device.kind(),
                    description: description.clone(),
                    block: block.clone(),
                    started_at: Utc::now(),
                };
                entries.insert(name.clone(), Entry::Running(handle.clone()));
                tracing::info!(
                    device = %name,
                    pid = %pid,
                    description = %handle.description,
                    "process registered"
                );
                Ok(handle)
            }
            Some(Entry::Running(_)) => Err(RigError::Conflict(format!(
                "{} already has a running process",
                name
            ))),
            None => Err(RigError::ProcessNotFound(name.to_string())),
        }
    }

    /// Roll back a reservation after a failed start.
    pub fn abort(&self, name: &DeviceName) {
        let mut entries = self.entries.lock().unwrap();
        if matches!(entries.get(name), Some(Entry::Reserved { .. })) {
            entries.remove(name);
            tracing::debug!(device = %name, "reservation rolled back");
        }
    }

    /// Reserve and commit in one step, for starts with no I/O phase
    /// between intent and outcome.
    pub fn register(
        &self,
        device: &Device,
        pid: ProcessId,
        description: &str,
        block: Option<String>,
    ) -> Result<ProcessHandle> {
        self.reserve(device, description, block)?;
        self.commit(device, pid)
    }

    /// Remove the device's entry. Idempotent: returns whether an entry
    /// was actually removed.
    pub fn unregister(&self, name: &DeviceName) -> bool {
        let removed = self.entries.lock().unwrap().remove(name).is_some();
        if removed {
            tracing::info!(device = %name, "process unregistered");
        }
        removed
    }

    /// Get the running handle for a device, if any.
    pub fn get(&self, name: &DeviceName) -> Option<ProcessHandle> {
        let entries = self.entries.lock().unwrap();
        match entries.get(name) {
            Some(Entry::Running(handle)) => Some(handle.clone()),
            _ => None,
        }
    }

    /// Find a running handle by raw pid.
    pub fn find_by_pid(&self, pid: u32) -> Option<ProcessHandle> {
        let entries = self.entries.lock().unwrap();
        entries.values().find_map(|e| match e {
            Entry::Running(handle) if handle.pid.raw() == pid => Some(handle.clone()),
            _ => None,
        })
    }

    /// Snapshot of running handles in scope, sorted by device name so
    /// listings are stable.
    pub fn list_active(&self, scope: Scope) -> Vec<ProcessHandle> {
        let entries = self.entries.lock().unwrap();
        let mut handles: Vec<ProcessHandle> = entries
            .values()
            .filter_map(|e| match e {
                Entry::Running(handle) if scope.matches(&handle.kind) => Some(handle.clone()),
                _ => None,
            })
            .collect();
        handles.sort_by(|a, b| a.device.cmp(&b.device));
        handles
    }

    /// Devices with neither a reservation nor a running process.
    pub fn is_idle(&self, name: &DeviceName) -> bool {
        !self.entries.lock().unwrap().contains_key(name)
    }

    /// Devices whose process targets the given block, counting both
    /// running handles and in-flight reservations. A start that has
    /// reserved its slot but not yet committed still holds the block.
    pub fn devices_writing_block(&self, block: &str) -> Vec<DeviceName> {
        let entries = self.entries.lock().unwrap();
        let mut names: Vec<DeviceName> = entries
            .iter()
            .filter(|(_, entry)| {
                let target = match entry {
                    Entry::Reserved { block, .. } => block.as_deref(),
                    Entry::Running(handle) => handle.block.as_deref(),
                };
                target == Some(block)
            })
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn stats(&self) -> TrackerStats {
        let entries = self.entries.lock().unwrap();
        let mut stats = TrackerStats::default();
        for entry in entries.values() {
            match entry {
                Entry::Reserved { .. } => stats.reserved += 1,
                Entry::Running(_) => stats.running += 1,
            }
        }
        stats
    }
}

impl Default for ProcessTracker {
    fn default() -> Self {
        Self::new()
    }
}
