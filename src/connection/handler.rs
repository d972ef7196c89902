//! Connection Handler Module
//!
//! Each client gets its own session task that runs in a loop: write the
//! prompt, wait for a full line, execute it, write the reply.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Write prompt            │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read until a full line  │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Execute command         │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Write response line     │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects / transport error
//!        │
//!        ▼
//! 5. Handler task ends
//! ```
//!
//! Command errors are answered and the loop continues. Only transport
//! failures and oversized lines end a session, and they end only that one.
//!
//! Store calls are synchronous and finish before the next `.await`, so the
//! store lock is never held across network I/O.

use crate::commands::CommandHandler;
use crate::protocol::{LineParser, ParseError, Response};
use crate::DEFAULT_PROMPT;
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, trace, warn};

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Reads every counter once, for logging.
    pub fn snapshot(&self) -> ConnectionStatsSnapshot {
        ConnectionStatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            commands_processed: self.commands_processed.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ConnectionStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatsSnapshot {
    pub connections_accepted: u64,
    pub active_connections: u64,
    pub commands_processed: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// Handles a single client connection.
///
/// Generic over the transport so the same loop serves a `TcpStream` in
/// production and an in-memory mock in tests.
pub struct ConnectionHandler<S> {
    /// The client stream
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// The command handler (shares the store with every other session)
    command_handler: CommandHandler,

    /// Line framing
    parser: LineParser,

    /// Written before each line is read
    prompt: Bytes,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler using the default prompt.
    ///
    /// # Arguments
    ///
    /// * `stream` - The client stream for this connection
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing commands
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: LineParser::new(),
            prompt: Bytes::from_static(DEFAULT_PROMPT.as_bytes()),
            stats,
        }
    }

    /// Replaces the prompt written before each command.
    pub fn with_prompt(mut self, prompt: impl Into<Bytes>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Replaces the line parser (e.g. to change the line length limit).
    pub fn with_parser(mut self, parser: LineParser) -> Self {
        self.parser = parser;
        self
    }

    /// Runs the main connection loop until the client disconnects or a
    /// transport error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::ClientDisconnected) => {
                info!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.stats.connection_closed();
        result
    }

    /// The prompt-read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            self.send_prompt().await?;

            let tokens = self.read_line().await?;

            // The store is only touched here, synchronously
            let response = self.command_handler.execute(&tokens);
            self.stats.command_processed();

            if response.is_error() {
                debug!(client = %self.addr, response = %response, "Command rejected");
            }

            self.send_response(&response).await?;
        }
    }

    /// Returns the next full line, reading from the socket as needed.
    async fn read_line(&mut self) -> Result<Vec<Bytes>, ConnectionError> {
        loop {
            if let Some(tokens) = self.parser.next_line(&mut self.buffer)? {
                trace!(
                    client = %self.addr,
                    tokens = tokens.len(),
                    remaining = self.buffer.len(),
                    "Parsed line"
                );
                return Ok(tokens);
            }

            self.read_more_data().await?;
        }
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            return if self.buffer.is_empty() {
                Err(ConnectionError::ClientDisconnected)
            } else {
                // Unterminated last line is dropped
                Err(ConnectionError::UnexpectedEof)
            };
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Writes the prompt and flushes everything written so far.
    async fn send_prompt(&mut self) -> Result<(), ConnectionError> {
        self.stream.write_all(&self.prompt).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(self.prompt.len());
        Ok(())
    }

    /// Queues a response; it goes out with the next prompt.
    async fn send_response(&mut self, response: &Response) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Framing error
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Stream ended in the middle of a line
    #[error("Unexpected end of stream")]
    UnexpectedEof,
}

/// Handles a client connection.
///
/// Creates a [`ConnectionHandler`] with the given prompt and runs it to
/// completion. Errors are logged, never propagated.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    prompt: Bytes,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler =
        ConnectionHandler::new(stream, addr, command_handler, stats).with_prompt(prompt);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageEngine;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_test::io::Builder;

    const PROMPT: &[u8] = b"linekv> ";

    fn test_addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn mock_handler(
        mock: tokio_test::io::Mock,
    ) -> (ConnectionHandler<tokio_test::io::Mock>, Arc<StorageEngine>) {
        let storage = Arc::new(StorageEngine::new());
        let handler = ConnectionHandler::new(
            mock,
            test_addr(),
            CommandHandler::new(Arc::clone(&storage)),
            Arc::new(ConnectionStats::new()),
        );
        (handler, storage)
    }

    #[tokio::test]
    async fn test_prompt_then_response() {
        let mock = Builder::new()
            .write(PROMPT)
            .read(b"PING\n")
            .write(b"PONG\n")
            .write(PROMPT)
            .build();

        let (handler, _) = mock_handler(mock);
        let result = handler.run().await;

        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
    }

    #[tokio::test]
    async fn test_error_keeps_session_open() {
        let mock = Builder::new()
            .write(PROMPT)
            .read(b"SET a 1 EX\n")
            .write(b"requires a second expiry parameter\n")
            .write(PROMPT)
            .read(b"SET a 1\n")
            .write(b"OK\n")
            .write(PROMPT)
            .read(b"GET a\n")
            .write(b"1\n")
            .write(PROMPT)
            .build();

        let (handler, storage) = mock_handler(mock);
        let _ = handler.run().await;

        assert_eq!(storage.get(&Bytes::from("a")), Some(Bytes::from("1")));
    }

    #[tokio::test]
    async fn test_blank_line_usage() {
        let mock = Builder::new()
            .write(PROMPT)
            .read(b"   \r\n")
            .write(b"Usage: command \"argument\"\n")
            .write(PROMPT)
            .build();

        let (handler, _) = mock_handler(mock);
        let _ = handler.run().await;
    }

    #[tokio::test]
    async fn test_several_lines_in_one_read() {
        let mock = Builder::new()
            .write(PROMPT)
            .read(b"ECHO hello world\nGET nope\n")
            .write(b"hello world\n")
            .write(PROMPT)
            .write(b"(nil)\n")
            .write(PROMPT)
            .build();

        let (handler, _) = mock_handler(mock);
        let _ = handler.run().await;
    }

    #[tokio::test]
    async fn test_line_split_across_reads() {
        let mock = Builder::new()
            .write(PROMPT)
            .read(b"SE")
            .read(b"T k v\n")
            .write(b"OK\n")
            .write(PROMPT)
            .build();

        let (handler, storage) = mock_handler(mock);
        let _ = handler.run().await;

        assert_eq!(storage.get(&Bytes::from("k")), Some(Bytes::from("v")));
    }

    #[tokio::test]
    async fn test_partial_line_at_eof() {
        let mock = Builder::new().write(PROMPT).read(b"SET k v").build();

        let (handler, storage) = mock_handler(mock);
        let result = handler.run().await;

        assert!(matches!(result, Err(ConnectionError::UnexpectedEof)));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_read_error_ends_session() {
        let mock = Builder::new()
            .write(PROMPT)
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();

        let (handler, _) = mock_handler(mock);
        let result = handler.run().await;

        assert!(matches!(result, Err(ConnectionError::IoError(_))));
    }

    #[tokio::test]
    async fn test_line_too_long_ends_session() {
        let mock = Builder::new().write(PROMPT).read(&[b'x'; 64]).build();

        let (handler, _) = mock_handler(mock);
        let handler = handler.with_parser(LineParser::with_max_line_length(16));
        let result = handler.run().await;

        assert!(matches!(result, Err(ConnectionError::ParseError(_))));
    }

    #[tokio::test]
    async fn test_custom_prompt() {
        let mock = Builder::new()
            .write(b"> ")
            .read(b"PING\n")
            .write(b"PONG\n")
            .write(b"> ")
            .build();

        let (handler, _) = mock_handler(mock);
        let _ = handler.with_prompt("> ").run().await;
    }

    async fn create_test_server() -> (SocketAddr, Arc<StorageEngine>, Arc<ConnectionStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let storage = Arc::new(StorageEngine::new());
        let stats = Arc::new(ConnectionStats::new());

        let storage_clone = Arc::clone(&storage);
        let stats_clone = Arc::clone(&stats);

        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let handler = CommandHandler::new(Arc::clone(&storage_clone));
                let stats = Arc::clone(&stats_clone);
                tokio::spawn(handle_connection(
                    stream,
                    client_addr,
                    handler,
                    stats,
                    Bytes::from_static(PROMPT),
                ));
            }
        });

        (addr, storage, stats)
    }

    /// Test client that strips prompts from what it reads back.
    struct Client {
        reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
        writer: tokio::net::tcp::OwnedWriteHalf,
    }

    impl Client {
        async fn connect(addr: SocketAddr) -> Self {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (read, writer) = stream.into_split();
            let mut client = Self {
                reader: BufReader::new(read),
                writer,
            };
            client.expect_prompt().await;
            client
        }

        async fn expect_prompt(&mut self) {
            let mut prompt = vec![0u8; PROMPT.len()];
            self.reader.read_exact(&mut prompt).await.unwrap();
            assert_eq!(prompt, PROMPT);
        }

        async fn command(&mut self, line: &str) -> String {
            self.writer
                .write_all(format!("{}\n", line).as_bytes())
                .await
                .unwrap();

            let mut response = String::new();
            self.reader.read_line(&mut response).await.unwrap();
            self.expect_prompt().await;
            response.trim_end_matches('\n').to_string()
        }
    }

    #[tokio::test]
    async fn test_tcp_scenarios() {
        let (addr, _, _) = create_test_server().await;
        let mut client = Client::connect(addr).await;

        assert_eq!(client.command("PING").await, "PONG");
        assert_eq!(client.command("ECHO hello world").await, "hello world");
        assert_eq!(client.command("SET a 1").await, "OK");
        assert_eq!(client.command("GET a").await, "1");
        assert_eq!(client.command("SET a 1 EX 0").await, "OK");
        assert_eq!(client.command("GET a").await, "(nil)");
        assert_eq!(
            client.command("SET a 1 EX").await,
            "requires a second expiry parameter"
        );
        assert_eq!(client.command("GET missingkey").await, "(nil)");
        assert_eq!(client.command("NOPE").await, "unknown command: NOPE");
        // Still usable after errors
        assert_eq!(client.command("PING").await, "PONG");
    }

    #[tokio::test]
    async fn test_sessions_share_one_store() {
        let (addr, storage, _) = create_test_server().await;

        let mut writer = Client::connect(addr).await;
        let mut reader = Client::connect(addr).await;

        assert_eq!(writer.command("SET shared yes").await, "OK");
        assert_eq!(reader.command("GET shared").await, "yes");
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let (addr, _, stats) = create_test_server().await;

        assert_eq!(stats.snapshot().active_connections, 0);

        let mut client = Client::connect(addr).await;

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.connections_accepted, 1);
        assert_eq!(snapshot.active_connections, 1);

        client.command("PING").await;

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.commands_processed, 1);
        // "PING\n"
        assert_eq!(snapshot.bytes_read, 5);
        // two prompts plus "PONG\n"
        assert_eq!(snapshot.bytes_written, 2 * PROMPT.len() as u64 + 5);

        drop(client);

        tokio::time::sleep(Duration::from_millis(50)).await;

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.active_connections, 0);
        assert_eq!(snapshot.connections_accepted, 1);
    }
}
