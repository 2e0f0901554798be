//! Process selection for new sessions.
//!
//! A session either runs a local interactive shell or an `ssh` client
//! forced into PTY mode. This module turns a caller-supplied host string
//! into a [`SessionTarget`] and a [`CommandBuilder`] ready to spawn.

use std::fmt;

use portable_pty::CommandBuilder;

use crate::config::{SessionConfig, SshConfig};

/// Host value that selects a local shell instead of a remote one.
pub const LOCAL_HOST: &str = "local";

/// What a session runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTarget {
    /// A local interactive shell.
    Local {
        /// Path or name of the shell binary.
        shell: String,
    },
    /// A remote shell reached through the ssh client.
    Remote {
        /// ssh destination (`host`, `user@host` or a config alias).
        destination: String,
    },
}

impl fmt::Display for SessionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionTarget::Local { shell } => write!(f, "local ({shell})"),
            SessionTarget::Remote { destination } => write!(f, "ssh {destination}"),
        }
    }
}

/// Everything needed to start a session process.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnOptions {
    /// Shell used for local sessions.
    pub shell: String,
    /// ssh client binary.
    pub ssh_program: String,
    /// Arguments placed before the destination.
    pub ssh_options: Vec<String>,
    /// Value for `TERM` in the child environment.
    pub term: String,
    /// Terminal width.
    pub cols: u16,
    /// Terminal height.
    pub rows: u16,
    /// Output buffer cap in bytes; zero for unbounded.
    pub max_buffer_bytes: usize,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default(), &SshConfig::default())
    }
}

impl SpawnOptions {
    /// Builds spawn options from the configuration sections.
    pub fn from_config(session: &SessionConfig, ssh: &SshConfig) -> Self {
        Self {
            shell: session.shell.clone(),
            ssh_program: ssh.program.clone(),
            ssh_options: ssh.options.clone(),
            term: session.term.clone(),
            cols: session.cols,
            rows: session.rows,
            max_buffer_bytes: session.max_buffer_bytes,
        }
    }

    /// Maps a host argument to a target. `"local"` selects the shell.
    pub fn target_for(&self, host: &str) -> SessionTarget {
        if host == LOCAL_HOST {
            SessionTarget::Local {
                shell: self.shell.clone(),
            }
        } else {
            SessionTarget::Remote {
                destination: host.to_string(),
            }
        }
    }

    /// Builds the command line for a target.
    pub fn command(&self, target: &SessionTarget) -> CommandBuilder {
        let mut cmd = match target {
            SessionTarget::Local { shell } => CommandBuilder::new(shell),
            SessionTarget::Remote { destination } => {
                let mut cmd = CommandBuilder::new(&self.ssh_program);
                cmd.args(&self.ssh_options);
                cmd.arg(destination);
                cmd
            }
        };

        if !self.term.is_empty() {
            cmd.env("TERM", &self.term);
        }
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        cmd
    }
}
