//! Error taxonomy for orchestration operations.
//!
//! Every variant is an operator-visible, actionable failure. None of
//! them should take the server down; the web layer maps them to status
//! codes and JSON problem bodies.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RigError>;

#[derive(Debug, Error)]
pub enum RigError {
    /// An invariant-violating transition was requested (session already
    /// active, device already recording, end_session with processes
    /// still running, ...). State is unchanged.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The target of a kill/unregister no longer exists.
    #[error("no running process for {0}")]
    ProcessNotFound(String),

    /// A local termination command failed. The handle stays registered
    /// so the operator can retry.
    #[error("failed to terminate process on {device}: {reason}")]
    Termination { device: String, reason: String },

    /// A remote launch failed or timed out. No handle was registered.
    #[error("remote start on {device} failed: {detail}")]
    RemoteStart { device: String, detail: String },

    /// A remote stop failed or timed out. The handle stays registered
    /// so the operator can retry.
    #[error("remote stop on {device} failed: {reason}")]
    RemoteStop { device: String, reason: String },

    /// Connectivity check failed.
    #[error("{device} unreachable: {reason}")]
    Unreachable { device: String, reason: String },

    /// The named device is not in the registry.
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("storage i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding: {0}")]
    Json(#[from] serde_json::Error),
}

impl RigError {
    /// Short machine-readable kind, used by the web layer.
    pub fn kind(&self) -> &'static str {
        match self {
            RigError::Conflict(_) => "conflict",
            RigError::ProcessNotFound(_) => "process_not_found",
            RigError::Termination { .. } => "termination",
            RigError::RemoteStart { .. } => "remote_start",
            RigError::RemoteStop { .. } => "remote_stop",
            RigError::Unreachable { .. } => "unreachable",
            RigError::UnknownDevice(_) => "unknown_device",
            RigError::Io(_) | RigError::Json(_) => "storage",
        }
    }
}
