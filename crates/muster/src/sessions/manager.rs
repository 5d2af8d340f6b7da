//! Session manager - the session/block state machine.
//!
//! States: no session, session active without a block, session active
//! with a block. At most one session is active at a time, and at most one
//! block is active per session. All mutations go through this manager;
//! there is no ambient session state anywhere else.

use super::types::{Block, Session};
use crate::error::{Result, RigError};
use crate::registry::DeviceName;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::info;

/// Owns the active session state.
pub struct SessionManager {
    data_root: PathBuf,
    active: RwLock<Option<Session>>,
}

impl SessionManager {
    pub fn new(data_root: PathBuf) -> Self {
        Self {
            data_root,
            active: RwLock::new(None),
        }
    }

    pub fn data_root(&self) -> &PathBuf {
        &self.data_root
    }

    /// Start a new session.
    ///
    /// Fails with a conflict if one is already active.
    pub fn start_session(
        &self,
        user: impl Into<String>,
        folder: impl Into<String>,
        notes: impl Into<String>,
    ) -> Result<Session> {
        let mut active = self.active.write().unwrap();

        if let Some(current) = active.as_ref() {
            return Err(RigError::Conflict(format!(
                "session {} is already active, end it first",
                current.folder
            )));
        }

        let session = Session::new(user, folder, notes);
        info!(session = %session.id, folder = %session.folder, user = %session.user, "session started");

        *active = Some(session.clone());
        Ok(session)
    }

    /// Create a new block in the active session, superseding the current
    /// one. Fails with a conflict when no session is active.
    pub fn new_block(&self, notes: impl Into<String>) -> Result<Block> {
        let mut active = self.active.write().unwrap();

        let session = active
            .as_mut()
            .ok_or_else(|| RigError::Conflict("no active session".to_string()))?;

        let block = session.start_block(notes, &self.data_root);
        info!(session = %session.id, block = %block.id, path = %block.path.display(), "block started");

        Ok(block)
    }

    /// End the active session.
    ///
    /// Refuses when processes are still recording to the active block:
    /// the caller passes the devices it knows to be busy, and the
    /// operator must kill them first. Returns the ended session so it
    /// can be persisted.
    pub fn end_session(&self, still_recording: &[DeviceName]) -> Result<Session> {
        let mut active = self.active.write().unwrap();

        let session = active
            .as_ref()
            .ok_or_else(|| RigError::Conflict("no active session".to_string()))?;

        if !still_recording.is_empty() {
            let names: Vec<&str> = still_recording.iter().map(|d| d.as_str()).collect();
            return Err(RigError::Conflict(format!(
                "cannot end session {}: still recording on {}",
                session.folder,
                names.join(", ")
            )));
        }

        let session = active.take().unwrap();
        info!(session = %session.id, folder = %session.folder, "session ended");
        Ok(session)
    }

    /// Snapshot of the active session, if any. Side-effect free.
    pub fn active(&self) -> Option<Session> {
        self.active.read().unwrap().clone()
    }

    /// Snapshot of the active block, if any. Side-effect free.
    pub fn active_block(&self) -> Option<Block> {
        self.active
            .read()
            .unwrap()
            .as_ref()
            .and_then(|s| s.active_block().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new(PathBuf::from("/data/acq"))
    }

    #[test]
    fn test_single_active_session() {
        let mgr = manager();
        assert!(mgr.active().is_none());

        mgr.start_session("fayat", "2020-11-23_rat1", "").unwrap();
        assert_eq!(mgr.active().unwrap().folder, "2020-11-23_rat1");

        let err = mgr.start_session("fayat", "2020-11-24_rat1", "").unwrap_err();
        assert!(matches!(err, RigError::Conflict(_)));
        // Still the original session.
        assert_eq!(mgr.active().unwrap().folder, "2020-11-23_rat1");

        mgr.end_session(&[]).unwrap();
        assert!(mgr.active().is_none());

        // A new session may start after the old one ended.
        mgr.start_session("fayat", "2020-11-24_rat1", "").unwrap();
        assert_eq!(mgr.active().unwrap().folder, "2020-11-24_rat1");
    }

    #[test]
    fn test_end_without_session_conflicts() {
        let mgr = manager();
        let err = mgr.end_session(&[]).unwrap_err();
        assert!(matches!(err, RigError::Conflict(_)));
    }

    #[test]
    fn test_block_requires_active_session() {
        let mgr = manager();
        let err = mgr.new_block("").unwrap_err();
        assert!(matches!(err, RigError::Conflict(_)));
    }

    #[test]
    fn test_exactly_one_active_block() {
        let mgr = manager();
        mgr.start_session("fayat", "2020-11-23_rat1", "").unwrap();
        assert!(mgr.active_block().is_none());

        let b0 = mgr.new_block("").unwrap();
        assert_eq!(mgr.active_block().unwrap().id, b0.id);

        let b1 = mgr.new_block("").unwrap();
        assert_eq!(mgr.active_block().unwrap().id, b1.id);
        assert_ne!(b0.path, b1.path);

        // Both blocks remain recorded in the session.
        assert_eq!(mgr.active().unwrap().blocks.len(), 2);
    }

    #[test]
    fn test_end_session_refuses_while_recording() {
        let mgr = manager();
        mgr.start_session("fayat", "2020-11-23_rat1", "").unwrap();
        mgr.new_block("").unwrap();

        let busy = vec![DeviceName::new("CAM0"), DeviceName::new("pwm0")];
        let err = mgr.end_session(&busy).unwrap_err();
        match err {
            RigError::Conflict(msg) => {
                assert!(msg.contains("CAM0"));
                assert!(msg.contains("pwm0"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Session survives the refusal.
        assert!(mgr.active().is_some());

        mgr.end_session(&[]).unwrap();
        assert!(mgr.active().is_none());
    }
}
