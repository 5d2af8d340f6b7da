//! Session and block lifecycle.

pub mod manager;
pub mod types;

pub use manager::SessionManager;
pub use types::{Block, BlockId, Session, SessionId};
