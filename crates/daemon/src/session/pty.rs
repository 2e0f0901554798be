//! PTY session management.
//!
//! A [`Session`] owns one child process attached to a pseudo-terminal, the
//! thread that drains the terminal into an [`OutputBuffer`], and the two
//! one-shot lifecycle signals (`stop` and `exited`).

use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::SystemTime;

use portable_pty::{native_pty_system, Child, MasterPty, PtySize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::buffer::OutputBuffer;
use super::spawn::{SessionTarget, SpawnOptions};

/// Unique identifier for a session.
pub type SessionId = String;

/// Errors that can occur during session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The session has already been terminated.
    #[error("session already terminated: {0}")]
    AlreadyTerminated(SessionId),

    /// Failed to spawn the PTY or the process.
    #[error("failed to spawn PTY: {0}")]
    SpawnFailed(String),

    /// Failed to write to the PTY.
    #[error("failed to write to PTY: {0}")]
    WriteFailed(String),

    /// The configured session limit was reached.
    #[error("session limit reached ({0} active sessions)")]
    LimitReached(usize),
}

/// Status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Session is running.
    Running,
    /// Session has exited with a code.
    Exited(i32),
    /// Session terminated and no exit code could be collected.
    Terminated,
}

/// Buffer size for reading from PTY.
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Handles released together on teardown.
struct PtyHandles {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
}

/// A PTY session with a shell or ssh process.
pub struct Session {
    /// Unique session identifier.
    id: SessionId,

    /// What the session runs.
    target: SessionTarget,

    /// When the process was spawned.
    created_at: SystemTime,

    /// Process ID.
    pid: Option<u32>,

    /// Output accumulated since the last drain.
    output: Arc<OutputBuffer>,

    /// Set by teardown; tells the reader to stop.
    stop: CancellationToken,

    /// Set once by the reader when the PTY reaches end of stream.
    exited: CancellationToken,

    /// Master handle and child process. `None` once torn down.
    handles: Mutex<Option<PtyHandles>>,

    /// PTY input. `None` once torn down.
    writer: Mutex<Option<Box<dyn Write + Send>>>,

    /// PTY output, handed to the reader thread on start.
    reader: Mutex<Option<Box<dyn Read + Send>>>,

    /// Exit status, once known.
    status: Mutex<SessionStatus>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Session {
    /// Spawns the process for `target` on a fresh PTY.
    ///
    /// The reader is not running yet; call [`Session::start_reader`].
    pub fn spawn(target: SessionTarget, options: &SpawnOptions) -> Result<Self, SessionError> {
        let id = Uuid::new_v4().to_string();

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: options.rows,
                cols: options.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        let mut child = pair
            .slave
            .spawn_command(options.command(&target))
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        // Only the child may hold the slave side, otherwise the master never
        // reports end of stream.
        drop(pair.slave);

        let (reader, writer) = match (pair.master.try_clone_reader(), pair.master.take_writer()) {
            (Ok(reader), Ok(writer)) => (reader, writer),
            (Err(e), _) | (_, Err(e)) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SessionError::SpawnFailed(e.to_string()));
            }
        };

        let pid = child.process_id();

        tracing::debug!(
            session_id = %id,
            target = %target,
            pid = ?pid,
            "Spawned PTY process"
        );

        Ok(Session {
            id,
            target,
            created_at: SystemTime::now(),
            pid,
            output: Arc::new(OutputBuffer::with_capacity(options.max_buffer_bytes)),
            stop: CancellationToken::new(),
            exited: CancellationToken::new(),
            handles: Mutex::new(Some(PtyHandles {
                master: pair.master,
                child,
            })),
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(Some(reader)),
            status: Mutex::new(SessionStatus::Running),
        })
    }

    /// Returns the session ID.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns what the session runs.
    pub fn target(&self) -> &SessionTarget {
        &self.target
    }

    /// Returns when the session was spawned.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Returns the process ID, if available.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Returns true once the reader has seen end of stream.
    pub fn has_exited(&self) -> bool {
        self.exited.is_cancelled()
    }

    /// Waits until the reader has seen end of stream.
    pub async fn wait_exited(&self) {
        self.exited.cancelled().await
    }

    /// Returns whether the session is alive and not torn down.
    pub fn is_running(&self) -> bool {
        !self.has_exited() && !self.stop.is_cancelled()
    }

    /// Starts the background reader thread.
    ///
    /// The reader copies PTY output into the session buffer in chunks of at
    /// most 8 KiB until end of stream, a read error, or teardown. It sets the
    /// exit signal when it finishes. Calling this twice is a no-op.
    pub fn start_reader(&self) -> Result<(), SessionError> {
        let Some(mut reader) = lock(&self.reader).take() else {
            tracing::warn!(session_id = %self.id, "Reader already started");
            return Ok(());
        };

        let output = Arc::clone(&self.output);
        let stop = self.stop.clone();
        let exited = self.exited.clone();
        let session_id = self.id.clone();

        thread::Builder::new()
            .name(format!("pty-reader-{}", &self.id[..8]))
            .spawn(move || {
                let mut chunk = vec![0u8; READ_BUFFER_SIZE];

                loop {
                    if stop.is_cancelled() {
                        tracing::debug!(session_id = %session_id, "Read loop stopping: session torn down");
                        break;
                    }

                    match reader.read(&mut chunk) {
                        Ok(0) => {
                            tracing::info!(session_id = %session_id, "PTY EOF - process exited");
                            break;
                        }
                        Ok(n) => {
                            let dropped = output.append(&chunk[..n]);
                            if dropped > 0 {
                                tracing::warn!(
                                    session_id = %session_id,
                                    dropped = dropped,
                                    "Output buffer full, discarded oldest bytes"
                                );
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            // Linux reports EIO on the master once the child is gone.
                            tracing::debug!(
                                session_id = %session_id,
                                error = %e,
                                "PTY read ended"
                            );
                            break;
                        }
                    }
                }

                exited.cancel();
            })
            .map_err(|e| {
                self.exited.cancel();
                SessionError::SpawnFailed(format!("failed to start reader thread: {e}"))
            })?;

        Ok(())
    }

    /// Writes data to the PTY (stdin).
    pub fn write(&self, data: &[u8]) -> Result<(), SessionError> {
        if self.stop.is_cancelled() {
            return Err(SessionError::AlreadyTerminated(self.id.clone()));
        }

        let mut guard = lock(&self.writer);
        let writer = guard
            .as_mut()
            .ok_or_else(|| SessionError::AlreadyTerminated(self.id.clone()))?;

        writer
            .write_all(data)
            .map_err(|e| SessionError::WriteFailed(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| SessionError::WriteFailed(e.to_string()))?;

        Ok(())
    }

    /// Swaps the PTY input for another writer.
    #[cfg(test)]
    pub(crate) fn replace_writer(&self, writer: Box<dyn Write + Send>) {
        *lock(&self.writer) = Some(writer);
    }

    /// Returns all output accumulated since the last call and clears it.
    pub fn read_and_clear(&self) -> Vec<u8> {
        self.output.read_and_clear()
    }

    /// Like [`Session::read_and_clear`], decoded lossily as UTF-8.
    pub fn read_and_clear_string(&self) -> String {
        String::from_utf8_lossy(&self.read_and_clear()).into_owned()
    }

    /// Number of output bytes waiting to be drained.
    pub fn buffered_len(&self) -> usize {
        self.output.len()
    }

    /// Number of output bytes discarded because of the buffer cap.
    pub fn dropped_bytes(&self) -> u64 {
        self.output.dropped()
    }

    /// Returns the exit status without blocking.
    pub fn status(&self) -> SessionStatus {
        let mut status = lock(&self.status);
        if *status != SessionStatus::Running {
            return *status;
        }

        if let Some(handles) = lock(&self.handles).as_mut() {
            if let Ok(Some(exit)) = handles.child.try_wait() {
                *status = SessionStatus::Exited(exit.exit_code() as i32);
            }
        }
        *status
    }

    /// Stops the reader and releases the process and PTY.
    ///
    /// The child is killed if still running and then reaped. Safe to call
    /// more than once; only the first call does anything.
    pub fn teardown(&self) {
        self.stop.cancel();

        let Some(PtyHandles { master, mut child }) = lock(&self.handles).take() else {
            return;
        };

        drop(lock(&self.writer).take());

        let final_status = match child.try_wait() {
            Ok(Some(exit)) => SessionStatus::Exited(exit.exit_code() as i32),
            Ok(None) => match child.kill() {
                Ok(()) => match child.wait() {
                    Ok(exit) => SessionStatus::Exited(exit.exit_code() as i32),
                    Err(e) => {
                        tracing::warn!(session_id = %self.id, error = %e, "Failed to reap process");
                        SessionStatus::Terminated
                    }
                },
                Err(e) => {
                    tracing::warn!(session_id = %self.id, error = %e, "Failed to kill process");
                    SessionStatus::Terminated
                }
            },
            Err(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "Failed to query process status");
                SessionStatus::Terminated
            }
        };

        drop(master);

        {
            let mut status = lock(&self.status);
            if *status == SessionStatus::Running {
                *status = final_status;
            }
        }

        tracing::info!(
            session_id = %self.id,
            status = ?final_status,
            "Session torn down"
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("pid", &self.pid)
            .field("exited", &self.has_exited())
            .finish_non_exhaustive()
    }
}
