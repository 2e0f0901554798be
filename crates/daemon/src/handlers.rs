//! Tool handlers: `start_session`, `interact_session`, `close_session` and
//! `list_sessions`.
//!
//! Handlers translate string arguments into registry and session calls and
//! apply the timing policy: a settle window after spawning and a
//! caller-chosen wait before draining. Every outcome, including failures,
//! is returned as a [`ToolOutput`] so one bad call never affects others.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use termhub_protocol::{CallToolParams, CallToolResult, ToolSpec};

use crate::config::{SessionConfig, MAX_WAIT_SECS};
use crate::session::{Session, SessionManager};

/// Returned by interact when nothing was sent and nothing came back.
pub const NO_NEW_OUTPUT: &str = "(No new output)";

/// Tool names.
pub const START_SESSION: &str = "start_session";
pub const INTERACT_SESSION: &str = "interact_session";
pub const CLOSE_SESSION: &str = "close_session";
pub const LIST_SESSIONS: &str = "list_sessions";

/// Text result of a tool call plus whether it represents a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

impl From<ToolOutput> for CallToolResult {
    fn from(output: ToolOutput) -> Self {
        if output.is_error {
            CallToolResult::error(output.text)
        } else {
            CallToolResult::text(output.text)
        }
    }
}

/// Parses a wait given in seconds (`"0.5"`, `"2"`, `"2s"`).
///
/// Malformed or non-finite input falls back to `default`. Negative values
/// mean no wait; values above five minutes are capped.
pub fn parse_wait(raw: Option<&str>, default: Duration) -> Duration {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return default;
    };

    let number = raw.strip_suffix('s').unwrap_or(raw).trim();
    match number.parse::<f64>() {
        Ok(secs) if secs.is_finite() => Duration::from_secs_f64(secs.clamp(0.0, MAX_WAIT_SECS)),
        _ => {
            tracing::debug!(wait = %raw, "Unparsable wait_duration, using default");
            default
        }
    }
}

/// The session tools, bound to one registry.
pub struct SessionTools {
    manager: Arc<SessionManager>,
    settle: Duration,
    default_wait: Duration,
}

impl SessionTools {
    pub fn new(manager: Arc<SessionManager>, settle: Duration, default_wait: Duration) -> Self {
        Self {
            manager,
            settle,
            default_wait,
        }
    }

    pub fn from_config(manager: Arc<SessionManager>, config: &SessionConfig) -> Self {
        Self::new(manager, config.settle(), config.default_wait())
    }

    /// The registry these tools operate on.
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Tool descriptions for `tools/list`.
    pub fn specs() -> Vec<ToolSpec> {
        vec![
            ToolSpec::new(
                START_SESSION,
                "Start a new SSH session (or local shell). Returns a session_id. \
                 Provide the SSH host alias or destination directly.",
            )
            .with_string_param(
                "host",
                "SSH host alias (e.g. from ~/.ssh/config) or valid SSH destination. \
                 Use 'local' to run a local shell.",
                true,
            ),
            ToolSpec::new(
                INTERACT_SESSION,
                "Write input to the session and/or read pending output.",
            )
            .with_string_param("session_id", "", true)
            .with_string_param(
                "input",
                "Command or text to send to the terminal (e.g. 'ls -la\\n'). Optional.",
                false,
            )
            .with_string_param(
                "wait_duration",
                "Time to wait for output after sending input (in seconds). \
                 Default 0.5s. Set higher for slow commands.",
                false,
            ),
            ToolSpec::new(CLOSE_SESSION, "Terminate a session.")
                .with_string_param("session_id", "", true),
            ToolSpec::new(
                LIST_SESSIONS,
                "List active sessions with their target, age and state.",
            ),
        ]
    }

    /// Dispatches a tool call. Returns `None` for an unknown tool name.
    pub async fn call(&self, params: &CallToolParams) -> Option<ToolOutput> {
        let arg = |key: &str| params.get_string(key).unwrap_or_default();

        let output = match params.name.as_str() {
            START_SESSION => self.start_session(&arg("host")).await,
            INTERACT_SESSION => {
                let input = params.get_string("input");
                let wait = params.get_string("wait_duration");
                self.interact_session(&arg("session_id"), input.as_deref(), wait.as_deref())
                    .await
            }
            CLOSE_SESSION => self.close_session(&arg("session_id")).await,
            LIST_SESSIONS => self.list_sessions(),
            _ => return None,
        };
        Some(output)
    }

    /// Spawns a session and returns its ID with whatever it printed during
    /// the settle window.
    pub async fn start_session(&self, host: &str) -> ToolOutput {
        if host.is_empty() {
            return ToolOutput::error("Host argument is required");
        }

        let session = match self.manager.create(host) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(host = %host, error = %e, "Failed to start session");
                return ToolOutput::error(format!("Failed to start session: {e}"));
            }
        };

        settle(&session, self.settle).await;

        if session.has_exited() {
            self.manager.remove(session.id()).await;
            let output = session.read_and_clear_string();
            tracing::warn!(session_id = %session.id(), host = %host, "Session exited during startup");
            return ToolOutput::error(format!(
                "Session started but exited immediately (SSH error?):\n{output}"
            ));
        }

        let output = session.read_and_clear_string();
        ToolOutput::text(format!(
            "Session started. ID: {}\n\nOutput:\n{}",
            session.id(),
            output
        ))
    }

    /// Sends optional input, waits, and returns accumulated output.
    pub async fn interact_session(
        &self,
        session_id: &str,
        input: Option<&str>,
        wait: Option<&str>,
    ) -> ToolOutput {
        let Some(session) = self.manager.get(session_id) else {
            return ToolOutput::error("Session not found");
        };

        if session.has_exited() {
            // Whoever wins the removal tears the session down; the output
            // left in the buffer is still ours to report.
            self.manager.remove_if_exited(session_id).await;
            let output = session.read_and_clear_string();
            return ToolOutput::text(format!("[Session exited]\nRemaining Output:\n{output}"));
        }

        let input = input.unwrap_or_default();
        if !input.is_empty() {
            if let Err(e) = session.write(input.as_bytes()) {
                tracing::warn!(session_id = %session_id, error = %e, "Write failed");
                return ToolOutput::error(format!("Write error: {e}"));
            }
        }

        settle(&session, parse_wait(wait, self.default_wait)).await;

        let output = session.read_and_clear_string();
        if output.is_empty() && input.is_empty() {
            return ToolOutput::text(NO_NEW_OUTPUT);
        }
        ToolOutput::text(output)
    }

    /// Removes a session. Unknown IDs are not an error.
    pub async fn close_session(&self, session_id: &str) -> ToolOutput {
        self.manager.remove(session_id).await;
        ToolOutput::text("Session closed")
    }

    /// One line per registered session.
    pub fn list_sessions(&self) -> ToolOutput {
        let sessions = self.manager.list();
        if sessions.is_empty() {
            return ToolOutput::text("No active sessions");
        }

        let now = SystemTime::now();
        let lines: Vec<String> = sessions
            .iter()
            .map(|info| {
                let age = now
                    .duration_since(info.created_at)
                    .unwrap_or_default()
                    .as_secs();
                let state = if info.exited { "exited" } else { "running" };
                let pid = info
                    .pid
                    .map(|pid| pid.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let mut line = format!(
                    "{}  {}  pid={}  age={}s  {}",
                    info.id, info.target, pid, age, state
                );
                if info.dropped > 0 {
                    line.push_str(&format!("  dropped={}", info.dropped));
                }
                line
            })
            .collect();

        ToolOutput::text(lines.join("\n"))
    }
}

/// Sleeps for `wait`, returning early if the process exits.
async fn settle(session: &Session, wait: Duration) {
    tokio::select! {
        _ = tokio::time::sleep(wait) => {}
        _ = session.wait_exited() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SpawnOptions;

    fn tools_with(options: SpawnOptions) -> SessionTools {
        let manager = Arc::new(SessionManager::new(options, 8));
        SessionTools::new(manager, Duration::from_millis(300), Duration::from_millis(300))
    }

    fn local_tools() -> SessionTools {
        tools_with(SpawnOptions {
            shell: "/bin/sh".to_string(),
            ..SpawnOptions::default()
        })
    }

    fn session_id_from(output: &ToolOutput) -> String {
        let line = output
            .text
            .lines()
            .next()
            .expect("empty start output");
        line.strip_prefix("Session started. ID: ")
            .expect("unexpected start output")
            .to_string()
    }

    #[test]
    fn test_parse_wait() {
        let default = Duration::from_millis(500);
        assert_eq!(parse_wait(None, default), default);
        assert_eq!(parse_wait(Some(""), default), default);
        assert_eq!(parse_wait(Some("2"), default), Duration::from_secs(2));
        assert_eq!(parse_wait(Some(" 0.25 "), default), Duration::from_millis(250));
        assert_eq!(parse_wait(Some("3s"), default), Duration::from_secs(3));
        assert_eq!(parse_wait(Some("soon"), default), default);
        assert_eq!(parse_wait(Some("NaN"), default), default);
        assert_eq!(parse_wait(Some("-1"), default), Duration::ZERO);
        assert_eq!(
            parse_wait(Some("100000"), default),
            Duration::from_secs_f64(MAX_WAIT_SECS)
        );
    }

    #[test]
    fn test_tool_output_into_result() {
        let ok: CallToolResult = ToolOutput::text("fine").into();
        assert!(!ok.is_error);
        let err: CallToolResult = ToolOutput::error("bad").into();
        assert!(err.is_error);
        assert_eq!(err.joined_text(), "bad");
    }

    #[test]
    fn test_specs_cover_all_tools() {
        let names: Vec<String> = SessionTools::specs().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![START_SESSION, INTERACT_SESSION, CLOSE_SESSION, LIST_SESSIONS]
        );
    }

    #[tokio::test]
    async fn test_start_requires_host() {
        let tools = local_tools();
        let output = tools.start_session("").await;
        assert!(output.is_error);
        assert_eq!(output.text, "Host argument is required");
    }

    #[tokio::test]
    async fn test_local_echo() {
        let tools = local_tools();

        let started = tools.start_session("local").await;
        assert!(!started.is_error, "start failed: {}", started.text);
        let id = session_id_from(&started);

        let output = tools
            .interact_session(&id, Some("echo X_MARKER_X\n"), Some("1"))
            .await;
        assert!(!output.is_error);
        assert!(output.text.contains("X_MARKER_X"), "got: {}", output.text);

        tools.close_session(&id).await;
        assert_eq!(tools.manager().count(), 0);
    }

    #[tokio::test]
    async fn test_no_new_output_sentinel() {
        let tools = local_tools();
        let started = tools.start_session("local").await;
        let id = session_id_from(&started);

        // Let the prompt arrive, then consume it.
        tools.interact_session(&id, None, Some("0.3")).await;

        let output = tools.interact_session(&id, None, Some("0.1")).await;
        assert!(!output.is_error);
        assert_eq!(output.text, NO_NEW_OUTPUT);

        tools.close_session(&id).await;
    }

    #[tokio::test]
    async fn test_interact_unknown_session() {
        let tools = local_tools();
        let output = tools
            .interact_session("does-not-exist", Some("ls\n"), None)
            .await;
        assert!(output.is_error);
        assert_eq!(output.text, "Session not found");
        assert_eq!(tools.manager().count(), 0);
    }

    struct BrokenPipe;

    impl std::io::Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_interact_write_failure_keeps_session() {
        let tools = local_tools();
        let id = session_id_from(&tools.start_session("local").await);

        let session = tools.manager().get(&id).unwrap();
        session.replace_writer(Box::new(BrokenPipe));

        let output = tools.interact_session(&id, Some("ls\n"), None).await;
        assert!(output.is_error);
        assert!(output.text.starts_with("Write error:"), "{}", output.text);
        assert!(tools.manager().exists(&id));

        tools.manager().shutdown().await;
    }

    #[tokio::test]
    async fn test_close_unknown_session() {
        let tools = local_tools();
        let output = tools.close_session("does-not-exist").await;
        assert!(!output.is_error);
        assert_eq!(output.text, "Session closed");

        // Idempotent.
        let output = tools.close_session("does-not-exist").await;
        assert!(!output.is_error);
    }

    #[tokio::test]
    async fn test_interact_after_exit_cleans_up() {
        let tools = local_tools();
        let started = tools.start_session("local").await;
        let id = session_id_from(&started);

        let session = tools.manager().get(&id).unwrap();
        session.write(b"echo last_words; exit\n").unwrap();
        tokio::time::timeout(Duration::from_secs(5), session.wait_exited())
            .await
            .unwrap();

        let output = tools.interact_session(&id, None, None).await;
        assert!(!output.is_error);
        assert!(output.text.starts_with("[Session exited]\nRemaining Output:\n"));
        assert!(output.text.contains("last_words"));
        assert!(!tools.manager().exists(&id));

        // A second call no longer finds it.
        let output = tools.interact_session(&id, None, None).await;
        assert!(output.is_error);
    }

    #[tokio::test]
    async fn test_start_immediate_exit_is_error() {
        // Stand-in for an ssh client that fails authentication at once.
        let tools = tools_with(SpawnOptions {
            ssh_program: "/bin/sh".to_string(),
            ssh_options: vec!["-c".to_string(), "echo 'Permission denied'; exit 255".to_string()],
            ..SpawnOptions::default()
        });

        let output = tools.start_session("nobody@unreachable.invalid").await;
        assert!(output.is_error, "expected error, got: {}", output.text);
        assert!(output
            .text
            .starts_with("Session started but exited immediately (SSH error?):\n"));
        assert!(output.text.contains("Permission denied"));
        assert_eq!(tools.manager().count(), 0);
    }

    #[tokio::test]
    async fn test_start_spawn_failure() {
        let tools = tools_with(SpawnOptions {
            ssh_program: "/nonexistent/ssh".to_string(),
            ..SpawnOptions::default()
        });

        let output = tools.start_session("somewhere").await;
        assert!(output.is_error);
        assert!(output.text.starts_with("Failed to start session:"));
        assert_eq!(tools.manager().count(), 0);
    }

    #[tokio::test]
    async fn test_call_dispatch() {
        let tools = local_tools();

        let unknown = tools.call(&CallToolParams::new("rm_rf")).await;
        assert!(unknown.is_none());

        let closed = tools
            .call(&CallToolParams::new(CLOSE_SESSION).with_arg("session_id", "x"))
            .await
            .unwrap();
        assert_eq!(closed, ToolOutput::text("Session closed"));

        let listed = tools.call(&CallToolParams::new(LIST_SESSIONS)).await.unwrap();
        assert_eq!(listed.text, "No active sessions");
    }

    #[tokio::test]
    async fn test_list_sessions() {
        let tools = local_tools();
        let id = session_id_from(&tools.start_session("local").await);

        let listed = tools.list_sessions();
        assert!(listed.text.contains(&id));
        assert!(listed.text.contains("local (/bin/sh)"));
        assert!(listed.text.contains("running"));
        assert!(!listed.text.contains("dropped="));

        tools.manager().shutdown().await;
    }

    #[tokio::test]
    async fn test_list_sessions_reports_dropped_output() {
        let tools = tools_with(SpawnOptions {
            shell: "/bin/sh".to_string(),
            max_buffer_bytes: 64,
            ..SpawnOptions::default()
        });
        let id = session_id_from(&tools.start_session("local").await);

        let session = tools.manager().get(&id).unwrap();
        session
            .write(b"i=0; while [ $i -lt 50 ]; do echo overflow_line_$i; i=$((i+1)); done\n")
            .unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while session.dropped_bytes() == 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let listed = tools.list_sessions();
        assert!(listed.text.contains("dropped="), "{}", listed.text);

        tools.manager().shutdown().await;
    }
}
