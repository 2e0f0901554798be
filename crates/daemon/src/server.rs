//! MCP transports: stdio and Unix Domain Sockets.
//!
//! A connection reads newline-delimited JSON-RPC requests and writes one
//! response line per answered request. Requests are handled concurrently,
//! so a long `interact_session` wait does not hold up calls for other
//! sessions; responses may therefore arrive out of request order and are
//! matched by id.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use termhub_protocol::{LineCodec, ProtocolError, Response, RpcError};

use crate::router::McpRouter;

/// Errors that can occur on a transport.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A message could not be encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// One line read from the peer.
#[derive(Debug, PartialEq)]
enum Frame {
    /// A complete line without its terminator.
    Line(String),
    /// A line that cannot be decoded; answered with an error, then skipped.
    Rejected(String, i64),
}

impl Frame {
    fn rejected(err: ProtocolError) -> Self {
        Frame::Rejected(err.to_string(), err.rpc_code())
    }
}

/// Reads the next `\n`-terminated line, holding at most `max + 1` bytes of
/// it in memory.
///
/// Longer lines are consumed up to their terminator and rejected. Returns
/// `None` at end of input.
async fn read_frame<R>(reader: &mut R, max: usize, buf: &mut Vec<u8>) -> io::Result<Option<Frame>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let keep = max.saturating_add(1);
    let mut total = 0usize;
    let mut terminated = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            break;
        }

        let (used, done) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (available.len(), false),
        };
        let room = keep.saturating_sub(buf.len());
        buf.extend_from_slice(&available[..used.min(room)]);
        reader.consume(used);
        total = total.saturating_add(used);

        if done {
            terminated = true;
            break;
        }
    }

    if total == 0 {
        return Ok(None);
    }

    let size = if terminated { total - 1 } else { total };
    if size > max {
        return Ok(Some(Frame::rejected(ProtocolError::LineTooLong { size, max })));
    }
    if terminated {
        buf.pop();
    }

    match std::str::from_utf8(buf) {
        Ok(line) => Ok(Some(Frame::Line(line.to_string()))),
        Err(e) => Ok(Some(Frame::rejected(ProtocolError::Deserialization(format!(
            "request line is not valid UTF-8: {e}"
        ))))),
    }
}

/// One client connection speaking newline-delimited JSON-RPC.
pub struct McpConnection<R, W> {
    reader: BufReader<R>,
    writer: W,
    codec: LineCodec,
}

/// Connection over the process's standard input and output.
pub type StdioConnection = McpConnection<tokio::io::Stdin, tokio::io::Stdout>;

/// Connection accepted from a Unix socket.
pub type SocketConnection = McpConnection<OwnedReadHalf, OwnedWriteHalf>;

impl StdioConnection {
    /// Serve on stdin/stdout. Logs must go elsewhere.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> McpConnection<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Create a connection from a reader and a writer.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            codec: LineCodec::new(),
        }
    }

    /// Use a specific codec for incoming lines (mainly to change the line
    /// length limit).
    pub fn with_codec(mut self, codec: LineCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Serve requests until the peer closes the input.
    ///
    /// A line that is too long, not UTF-8 or not JSON is answered with a
    /// parse error and the connection keeps going. Requests still in flight
    /// at end of input are completed and answered before this returns.
    pub async fn serve(self, router: Arc<McpRouter>) -> Result<(), ServerError> {
        let McpConnection {
            mut reader,
            mut writer,
            codec,
        } = self;

        let (tx, mut rx) = mpsc::unbounded_channel::<Response>();

        let writer_task = tokio::spawn(async move {
            let encoder = LineCodec::new();
            while let Some(response) = rx.recv().await {
                write_response(&mut writer, &encoder, &response).await?;
            }
            Ok::<(), ServerError>(())
        });

        let mut in_flight = JoinSet::new();
        let mut buf = Vec::new();

        let read_result = loop {
            let line = match read_frame(&mut reader, codec.max_line_length(), &mut buf).await {
                Ok(Some(Frame::Line(line))) => line,
                Ok(Some(Frame::Rejected(message, code))) => {
                    tracing::warn!(error = %message, "Discarding unreadable line");
                    // The writer only goes away after a write failure, which
                    // is reported below.
                    let _ = tx.send(Response::error(None, RpcError::new(code, message)));
                    continue;
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(ServerError::Io(e)),
            };

            let value = match codec.decode_value(&line) {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding unparsable message");
                    let _ = tx.send(Response::error(None, RpcError::from(&e)));
                    continue;
                }
            };

            let router = Arc::clone(&router);
            let tx = tx.clone();
            in_flight.spawn(async move {
                if let Some(response) = router.handle_value(value).await {
                    let _ = tx.send(response);
                }
            });

            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Request task failed");
                }
            }
        };

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Request task failed");
            }
        }
        drop(tx);

        let write_result = match writer_task.await {
            Ok(result) => result,
            Err(e) => Err(ServerError::Io(io::Error::other(e))),
        };

        read_result.and(write_result)
    }
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    codec: &LineCodec,
    response: &Response,
) -> Result<(), ServerError> {
    let line = match codec.encode(response) {
        Ok(line) => line,
        Err(e) => {
            // Replace an unsendable result with an error the client can see.
            tracing::error!(error = %e, "Failed to encode response");
            let fallback = Response::error(response.id.clone(), RpcError::from(&e));
            codec.encode(&fallback)?
        }
    };

    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// A server that listens for MCP connections on a Unix Domain Socket.
pub struct McpSocketServer {
    listener: UnixListener,
    path: PathBuf,
    codec: LineCodec,
}

impl McpSocketServer {
    /// Bind the server to the specified socket path.
    ///
    /// Parent directories are created as needed and a stale socket file at
    /// the path is replaced.
    pub async fn bind(path: &Path) -> Result<Self, io::Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        if path.exists() {
            std::fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)?;
        tracing::info!(path = %path.display(), "Listening on Unix socket");

        Ok(Self {
            listener,
            path: path.to_path_buf(),
            codec: LineCodec::new(),
        })
    }

    /// Codec handed to every accepted connection.
    pub fn with_codec(mut self, codec: LineCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Path of the bound socket.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept a new incoming connection.
    pub async fn accept(&self) -> Result<SocketConnection, io::Error> {
        let (stream, _addr) = self.listener.accept().await?;
        let (read_half, write_half) = stream.into_split();
        Ok(McpConnection::new(read_half, write_half).with_codec(self.codec.clone()))
    }

    /// Accept and serve connections until `shutdown` is cancelled.
    ///
    /// Every connection shares the router, and therefore the session
    /// registry, so a session started by one client can be used by another.
    pub async fn run(
        &self,
        router: Arc<McpRouter>,
        shutdown: CancellationToken,
    ) -> Result<(), io::Error> {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.accept() => {
                    let connection = match accepted {
                        Ok(connection) => connection,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };
                    tracing::debug!("Accepted connection");

                    let router = Arc::clone(&router);
                    connections.spawn(async move {
                        if let Err(e) = connection.serve(router).await {
                            tracing::warn!(error = %e, "Connection ended with error");
                        }
                        tracing::debug!("Connection closed");
                    });
                }
            }

            while connections.try_join_next().is_some() {}
        }

        connections.shutdown().await;
        Ok(())
    }
}

impl Drop for McpSocketServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
