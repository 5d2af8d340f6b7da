//! Muster - synchronized acquisition orchestration.
//!
//! Coordinates recording sessions across heterogeneous hardware: local
//! cameras and remote single-board controllers driving timing-pulse
//! generators. The operator starts and stops recording blocks from a
//! browser dashboard; this crate owns the session/block state machine,
//! the ledger of running processes, remote command dispatch, and the
//! overwrite guard that keeps restarts from clobbering existing data.

pub mod actionlog;
pub mod error;
pub mod guard;
pub mod local;
pub mod registry;
pub mod remote;
pub mod rig;
pub mod sessions;
pub mod store;
pub mod tracker;
pub mod web;

pub use error::{Result, RigError};
pub use registry::{Device, DeviceKind, DeviceName, Registry};
pub use rig::Rig;
