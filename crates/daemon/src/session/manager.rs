//! Session manager for managing multiple PTY sessions.
//!
//! This module provides a thread-safe registry that can create, look up and
//! tear down sessions concurrently. Removal is the single place where a
//! session's process and PTY are released: whoever takes the entry out of
//! the map performs the teardown, so it happens exactly once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;

use super::pty::{Session, SessionError, SessionId, SessionStatus};
use super::spawn::SpawnOptions;
use crate::config::Config;

/// Information about a session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Unique session identifier.
    pub id: SessionId,
    /// Human-readable description of what the session runs.
    pub target: String,
    /// Process ID of the session process.
    pub pid: Option<u32>,
    /// When the session was created.
    pub created_at: SystemTime,
    /// Whether the process has reached end of stream.
    pub exited: bool,
    /// Bytes waiting to be drained.
    pub buffered: usize,
    /// Output bytes discarded because the buffer was full.
    pub dropped: u64,
}

impl SessionInfo {
    fn from_session(session: &Session) -> Self {
        Self {
            id: session.id().clone(),
            target: session.target().to_string(),
            pid: session.pid(),
            created_at: session.created_at(),
            exited: session.has_exited(),
            buffered: session.buffered_len(),
            dropped: session.dropped_bytes(),
        }
    }
}

/// Thread-safe session registry backed by a sharded read/write map.
///
/// Lookups run in parallel; inserts and removals lock only the shard that
/// holds the key.
pub struct SessionManager {
    /// Map of session ID to session.
    sessions: DashMap<SessionId, Arc<Session>>,

    /// How new sessions are spawned.
    options: SpawnOptions,

    /// Upper bound on concurrently registered sessions.
    max_sessions: usize,

    /// Registered sessions plus creations still spawning.
    slots: AtomicUsize,
}

impl SessionManager {
    /// Creates a new session manager.
    pub fn new(options: SpawnOptions, max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            options,
            max_sessions,
            slots: AtomicUsize::new(0),
        }
    }

    /// Creates a session manager from the daemon configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            SpawnOptions::from_config(&config.session, &config.ssh),
            config.session.max_sessions,
        )
    }

    /// Spawns a session for `host`, starts its reader and registers it.
    ///
    /// `host` is either `"local"` or an ssh destination.
    ///
    /// A slot is reserved before spawning, so concurrent callers can never
    /// push the registry past `max_sessions`.
    pub fn create(&self, host: &str) -> Result<Arc<Session>, SessionError> {
        let max = self.max_sessions;
        self.slots
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .map_err(SessionError::LimitReached)?;

        let session = match self.spawn(host) {
            Ok(session) => session,
            Err(e) => {
                self.release_slot();
                return Err(e);
            }
        };
        self.insert(Arc::clone(&session));

        tracing::info!(
            session_id = %session.id(),
            target = %session.target(),
            pid = ?session.pid(),
            "Created new session"
        );

        Ok(session)
    }

    fn spawn(&self, host: &str) -> Result<Arc<Session>, SessionError> {
        let target = self.options.target_for(host);
        let session = Arc::new(Session::spawn(target, &self.options)?);
        session.start_reader()?;
        Ok(session)
    }

    /// Registers a session under its own ID; the caller already holds a slot.
    fn insert(&self, session: Arc<Session>) {
        let id = session.id().clone();
        if let Some(previous) = self.sessions.insert(id.clone(), session) {
            // UUID v4 collisions do not happen in practice; if one does, the
            // displaced session must still be released.
            tracing::error!(session_id = %id, "Session ID collision, tearing down previous session");
            self.release_slot();
            previous.teardown();
        }
    }

    fn release_slot(&self) {
        self.slots.fetch_sub(1, Ordering::AcqRel);
    }

    /// Looks up a session.
    ///
    /// The returned session may be removed by another caller at any time;
    /// operations on it then fail with an error instead of panicking.
    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Removes a session and releases its process and PTY.
    ///
    /// Returns false if no such session was registered.
    pub async fn remove(&self, session_id: &str) -> bool {
        let Some((id, session)) = self.sessions.remove(session_id) else {
            tracing::debug!(session_id = %session_id, "Remove of unknown session ignored");
            return false;
        };
        self.release_slot();

        let status = teardown(session).await;
        tracing::info!(session_id = %id, status = ?status, "Session removed");
        true
    }

    /// Removes a session only if its process has already exited.
    ///
    /// The check and the removal are one map operation, so a concurrent
    /// [`SessionManager::remove`] cannot release the same session twice.
    /// The removed session is returned so its remaining output can be
    /// drained.
    pub async fn remove_if_exited(&self, session_id: &str) -> Option<Arc<Session>> {
        let (id, session) = self
            .sessions
            .remove_if(session_id, |_, session| session.has_exited())?;
        self.release_slot();

        let status = teardown(Arc::clone(&session)).await;
        tracing::info!(session_id = %id, status = ?status, "Exited session removed");
        Some(session)
    }

    /// Lists all registered sessions.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .sessions
            .iter()
            .map(|entry| SessionInfo::from_session(entry.value()))
            .collect();
        sessions.sort_by_key(|info| info.created_at);
        sessions
    }

    /// Checks if a session is registered.
    pub fn exists(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Returns the number of registered sessions.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Removes and tears down every session.
    pub async fn shutdown(&self) {
        let ids: Vec<SessionId> = self
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "Shutting down sessions");
        }

        for id in ids {
            self.remove(&id).await;
        }
    }
}

/// Runs the blocking part of teardown (kill, reap) off the async workers.
async fn teardown(session: Arc<Session>) -> SessionStatus {
    let fallback = Arc::clone(&session);
    match tokio::task::spawn_blocking(move || {
        session.teardown();
        session.status()
    })
    .await
    {
        Ok(status) => status,
        Err(e) => {
            tracing::error!(session_id = %fallback.id(), error = %e, "Teardown task failed");
            fallback.teardown();
            fallback.status()
        }
    }
}
