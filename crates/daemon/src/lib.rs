//! # termhub Daemon Library
//!
//! This crate lets an MCP client (typically an AI agent) drive interactive
//! terminals: a local shell or an ssh client, each running under its own
//! pseudo-terminal.
//!
//! ## Overview
//!
//! - **Sessions**: spawn a process on a PTY, capture its output in the
//!   background, write keystrokes to it and tear it down exactly once
//! - **Registry**: a concurrent map of live sessions keyed by UUID
//! - **Tools**: `start_session`, `interact_session`, `close_session` and
//!   `list_sessions`, each returning plain text
//! - **Transports**: JSON-RPC 2.0 over stdio or a Unix domain socket
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          Transport (stdio / Unix socket)                │  server
//! ├─────────────────────────────────────────────────────────┤
//! │          JSON-RPC / MCP method dispatch                 │  router
//! ├─────────────────────────────────────────────────────────┤
//! │          Tool handlers (timing, text results)           │  handlers
//! ├─────────────────────────────────────────────────────────┤
//! │  ┌───────────────┐   ┌───────────────────────────────┐  │
//! │  │ SessionManager│──▶│ Session (PTY, reader, buffer) │  │  session
//! │  └───────────────┘   └───────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use termhub::{Config, McpConnection, McpRouter, SessionManager, SessionTools};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!
//!     let manager = Arc::new(SessionManager::from_config(&config));
//!     let tools = SessionTools::from_config(Arc::clone(&manager), &config.session);
//!     let router = Arc::new(McpRouter::new(tools));
//!
//!     McpConnection::stdio().serve(router).await?;
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`session`]: PTY sessions, output buffering and the registry
//! - [`handlers`]: The session tools
//! - [`router`]: JSON-RPC method routing
//! - [`server`]: stdio and Unix socket transports
//! - [`logging`]: tracing subscriber setup

pub mod config;
pub mod handlers;
pub mod logging;
pub mod router;
pub mod server;
pub mod session;

// Re-export protocol for convenience
pub use termhub_protocol as protocol;

// Re-export config types for convenience
pub use config::{Config, ConfigError};

// Re-export session types for convenience
pub use session::{
    OutputBuffer, Session, SessionError, SessionId, SessionInfo, SessionManager, SessionStatus,
    SessionTarget, SpawnOptions,
};

// Re-export handler, router and server types for convenience
pub use handlers::{SessionTools, ToolOutput};
pub use router::{McpRouter, RouterError};
pub use server::{McpConnection, McpSocketServer, ServerError};
