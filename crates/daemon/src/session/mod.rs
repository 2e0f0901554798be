//! Session management module.
//!
//! This module provides PTY spawning and session lifecycle management.
//! Sessions can be created, written to, drained and torn down.

pub mod buffer;
pub mod manager;
pub mod pty;
pub mod spawn;

pub use buffer::OutputBuffer;
pub use manager::{SessionInfo, SessionManager};
pub use pty::{Session, SessionError, SessionId, SessionStatus};
pub use spawn::{SessionTarget, SpawnOptions, LOCAL_HOST};
