//! Domain types for recording sessions.
//!
//! A session groups recording blocks under one folder; a block is one
//! take with its own storage path. Blocks are superseded, never deleted:
//! the active block is always the most recent one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Unique identifier for a recording session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Generate a new unique session ID
    pub fn generate() -> Self {
        let random = uuid::Uuid::new_v4();
        Self(format!("session-{}", random.as_simple()))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a block within its session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(pub String);

impl BlockId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Block id for the session's n-th block (zero based).
    pub fn for_index(index: usize) -> Self {
        Self(format!("block_{}", index))
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One recording take within a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub created_at: DateTime<Utc>,
    pub notes: String,
    /// Storage path, `<data root>/<session folder>/<block id>`.
    /// Deterministic, unique per (folder, id).
    pub path: PathBuf,
}

/// A named grouping of recording blocks, owned by one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub folder: String,
    pub user: String,
    pub created_at: DateTime<Utc>,
    pub notes: String,
    pub blocks: Vec<Block>,
}

impl Session {
    pub fn new(user: impl Into<String>, folder: impl Into<String>, notes: impl Into<String>) -> Self {
        Self {
            id: SessionId::generate(),
            folder: folder.into(),
            user: user.into(),
            created_at: Utc::now(),
            notes: notes.into(),
            blocks: Vec::new(),
        }
    }

    /// Create the next block, superseding the current one.
    pub fn start_block(&mut self, notes: impl Into<String>, data_root: &Path) -> Block {
        let id = BlockId::for_index(self.blocks.len());
        let block = Block {
            path: data_root.join(&self.folder).join(id.as_str()),
            id,
            created_at: Utc::now(),
            notes: notes.into(),
        };
        self.blocks.push(block.clone());
        block
    }

    /// The block recordings currently target, if any.
    pub fn active_block(&self) -> Option<&Block> {
        self.blocks.last()
    }
}
