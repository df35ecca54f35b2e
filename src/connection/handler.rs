//! Connection Handler Module
//!
//! Each client gets its own handler task that runs in a loop, reading
//! commands and sending replies.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned with a fresh Session
//!        │
//!        ▼
//! 3. ┌──────────────────────────────────┐
//!    │      Main Loop                   │
//!    │                                  │
//!    │  read bytes ──> parse tokens     │
//!    │                     │            │
//!    │        broadcast to MONITOR      │
//!    │                     │            │
//!    │        Session::handle ──> reply buffer
//!    │                     │            │
//!    │   (buffer drained) flush replies │
//!    └─────────────┬────────────────────┘
//!                  │ MONITOR
//!                  ▼
//! 4. ┌──────────────────────────────────┐
//!    │  Monitor Loop                    │
//!    │  lines from registry ──> socket  │
//!    │  QUIT ──> OK, close              │
//!    │  anything else ──> error         │
//!    └──────────────────────────────────┘
//!        │
//!        ▼
//! 5. Client disconnects / QUIT / error: handler task ends
//! ```
//!
//! ## Buffer Management
//!
//! TCP is a stream protocol: one read may hold a partial command or
//! several pipelined ones. Incoming bytes accumulate in a `BytesMut` that
//! grows while a frame is pending, up to [`MAX_QUERY_BUFFER`] of unparsed
//! data. Every reply produced while draining it goes into one
//! [`RespWriter`] and is written with a single flush.

use crate::commands::Error;
use crate::connection::monitor::Monitor;
use crate::connection::session::{Outcome, Session};
use crate::protocol::parser::MAX_BULK_SIZE;
use crate::protocol::{ParseError, RespParser, RespWriter, Writer};
use crate::storage::Db;
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, error, info, trace, warn};

/// Most unparsed data a client may have pending (1 GiB). Room for one
/// maximum-size bulk argument plus the rest of its command.
pub const MAX_QUERY_BUFFER: usize = 2 * MAX_BULK_SIZE;

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
}

/// Server-wide state every connection shares.
#[derive(Debug, Clone)]
pub struct Shared {
    pub db: Arc<Db>,
    pub monitor: Arc<Monitor>,
    pub stats: Arc<ConnectionStats>,
}

impl Shared {
    pub fn new(db: Arc<Db>) -> Self {
        Self {
            db,
            monitor: Arc::new(Monitor::new()),
            stats: Arc::new(ConnectionStats::new()),
        }
    }
}

/// Handles a single client connection.
pub struct ConnectionHandler {
    /// The TCP stream for this connection
    stream: BufWriter<TcpStream>,

    /// Client's address (for logging and MONITOR lines)
    addr: SocketAddr,

    /// Unparsed incoming bytes
    buffer: BytesMut,

    /// Replies waiting for the next flush
    replies: RespWriter,

    parser: RespParser,

    /// MULTI/EXEC state, owned by this connection only
    session: Session,

    shared: Shared,
}

impl ConnectionHandler {
    pub fn new(stream: TcpStream, addr: SocketAddr, shared: Shared) -> Self {
        shared.stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            replies: RespWriter::new(),
            parser: RespParser::new(),
            session: Session::new(),
            shared,
        }
    }

    /// Runs the connection until the client disconnects, sends QUIT, or an
    /// error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    debug!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        if self.session.is_queueing() {
            debug!(
                client = %self.addr,
                queued = self.session.queued(),
                "Discarding queued transaction"
            );
        }

        self.shared.stats.connection_closed();
        result
    }

    /// The read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(tokens) = self.next_command().await? {
                if tokens.is_empty() {
                    continue;
                }

                self.shared.monitor.broadcast(0, &self.addr, &tokens);
                self.shared.stats.command_processed();

                let outcome = self
                    .session
                    .handle(&self.shared.db, tokens, &mut self.replies);

                match outcome {
                    Outcome::Continue => {}
                    Outcome::Quit => {
                        self.flush_replies().await?;
                        return Ok(());
                    }
                    Outcome::Monitor => {
                        self.flush_replies().await?;
                        return self.monitor_loop().await;
                    }
                }
            }

            self.flush_replies().await?;
            self.read_more_data().await?;
        }
    }

    /// Serves a subscriber connection: forwards broadcast lines and only
    /// answers QUIT.
    async fn monitor_loop(&mut self) -> Result<(), ConnectionError> {
        let mut subscription = self.shared.monitor.subscribe();
        info!(client = %self.addr, subscriber = subscription.id(), "Client is monitoring");

        loop {
            // pipelined after MONITOR, or just read
            while let Some(tokens) = self.next_command().await? {
                if tokens.is_empty() {
                    continue;
                }
                if tokens[0].eq_ignore_ascii_case(b"quit") {
                    self.replies.write_string("OK");
                    self.flush_replies().await?;
                    return Ok(());
                }
                self.replies.write_error(&Error::ReplicaKeyspace.to_string());
            }
            self.flush_replies().await?;

            tokio::select! {
                line = subscription.recv() => match line {
                    Some(line) => self.send_raw(&line).await?,
                    None => return Ok(()),
                },
                read = self.read_more_data() => read?,
            }
        }
    }

    /// Takes the next complete command off the buffer.
    ///
    /// A malformed frame is answered with a protocol error before the
    /// connection is closed.
    async fn next_command(&mut self) -> Result<Option<Vec<Bytes>>, ConnectionError> {
        match self.try_parse_command() {
            Ok(tokens) => Ok(tokens),
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Parse error");
                self.replies.write_error(&format!("ERR Protocol error: {}", e));
                self.flush_replies().await?;
                Err(ConnectionError::ParseError(e))
            }
        }
    }

    fn try_parse_command(&mut self) -> Result<Option<Vec<Bytes>>, ParseError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse_command(&self.buffer)? {
            Some((tokens, consumed)) => {
                let _ = self.buffer.split_to(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed command"
                );
                Ok(Some(tokens))
            }
            None => {
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete command, need more data"
                );
                Ok(None)
            }
        }
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_QUERY_BUFFER {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            self.replies.write_error(&format!(
                "ERR Protocol error: query buffer exceeds {} bytes",
                MAX_QUERY_BUFFER
            ));
            self.flush_replies().await?;
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.shared.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Writes every buffered reply with one flush.
    async fn flush_replies(&mut self) -> Result<(), ConnectionError> {
        if self.replies.is_empty() {
            return Ok(());
        }
        let bytes = self.replies.take();
        self.send_raw(&bytes).await
    }

    async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        self.shared.stats.bytes_written(bytes.len());
        trace!(client = %self.addr, bytes = bytes.len(), "Sent response");
        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// RESP parse error
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial command)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Creates a [`ConnectionHandler`] and runs it to completion.
pub async fn handle_connection(stream: TcpStream, addr: SocketAddr, shared: Shared) {
    let handler = ConnectionHandler::new(stream, addr, shared);
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
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::time::{timeout, Duration};

    async fn create_test_server() -> (SocketAddr, Shared) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Shared::new(Arc::new(Db::new()));

        let accept = shared.clone();
        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                tokio::spawn(handle_connection(stream, client_addr, accept.clone()));
            }
        });

        (addr, shared)
    }

    /// Reads until `expected` bytes arrived or two seconds passed.
    async fn read_exact_len(client: &mut TcpStream, expected: usize) -> Vec<u8> {
        let mut buf = vec![0u8; 4096];
        let mut total = 0;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while total < expected && tokio::time::Instant::now() < deadline {
            match timeout(Duration::from_millis(200), client.read(&mut buf[total..])).await {
                Ok(Ok(n)) if n > 0 => total += n,
                Ok(_) => break,
                Err(_) => {}
            }
        }
        buf.truncate(total);
        buf
    }

    /// Reads one CRLF-terminated line.
    async fn read_line(client: &mut TcpStream) -> String {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        while !line.ends_with(b"\r\n") {
            let n = timeout(Duration::from_secs(2), client.read(&mut byte))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(n, 1, "connection closed mid-line");
            line.push(byte[0]);
        }
        String::from_utf8(line).unwrap()
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (addr, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();

        assert_eq!(read_exact_len(&mut client, 7).await, b"+PONG\r\n");
    }

    #[tokio::test]
    async fn test_set_get() {
        let (addr, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$5\r\nalice\r\n")
            .await
            .unwrap();
        assert_eq!(read_exact_len(&mut client, 5).await, b"+OK\r\n");

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
            .await
            .unwrap();
        assert_eq!(read_exact_len(&mut client, 11).await, b"$5\r\nalice\r\n");
    }

    #[tokio::test]
    async fn test_value_larger_than_one_read() {
        let (addr, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        let value = vec![b'x'; 100 * 1024];
        let mut frame =
            format!("*3\r\n$3\r\nSET\r\n$3\r\nbig\r\n${}\r\n", value.len()).into_bytes();
        frame.extend_from_slice(&value);
        frame.extend_from_slice(b"\r\n");
        client.write_all(&frame).await.unwrap();
        assert_eq!(read_exact_len(&mut client, 5).await, b"+OK\r\n");

        client
            .write_all(b"*2\r\n$6\r\nSTRLEN\r\n$3\r\nbig\r\n")
            .await
            .unwrap();
        assert_eq!(read_exact_len(&mut client, 9).await, b":102400\r\n");
    }

    #[tokio::test]
    async fn test_pipelined_commands() {
        let (addr, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$2\r\nk1\r\n$2\r\nv1\r\n*3\r\n$3\r\nSET\r\n$2\r\nk2\r\n$2\r\nv2\r\n*2\r\n$3\r\nGET\r\n$2\r\nk1\r\n*2\r\n$3\r\nGET\r\n$2\r\nk2\r\n")
            .await
            .unwrap();

        let expected = b"+OK\r\n+OK\r\n$2\r\nv1\r\n$2\r\nv2\r\n";
        assert_eq!(read_exact_len(&mut client, expected.len()).await, expected);
    }

    #[tokio::test]
    async fn test_inline_and_errors() {
        let (addr, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"GET\r\nNOPE x\r\n").await.unwrap();
        let expected = b"-ERR wrong number of arguments (get)\r\n-ERR unknown command (nope)\r\n";
        assert_eq!(read_exact_len(&mut client, expected.len()).await, expected);
    }

    #[tokio::test]
    async fn test_quit_closes() {
        let (addr, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"QUIT\r\n").await.unwrap();
        assert_eq!(read_exact_len(&mut client, 5).await, b"+OK\r\n");

        let mut buf = [0u8; 16];
        let n = timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_protocol_error_closes() {
        let (addr, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"*1\r\n$x\r\n").await.unwrap();
        let reply = read_exact_len(&mut client, 16).await;
        assert!(reply.starts_with(b"-ERR Protocol error"));
    }

    #[tokio::test]
    async fn test_monitor_receives_commands() {
        let (addr, shared) = create_test_server().await;

        let mut watcher = TcpStream::connect(addr).await.unwrap();
        watcher.write_all(b"MONITOR\r\n").await.unwrap();
        assert_eq!(read_exact_len(&mut watcher, 5).await, b"+OK\r\n");

        // wait for the subscription to be registered
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while shared.monitor.subscribers() == 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(shared.monitor.subscribers(), 1);

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"SET k v\r\n").await.unwrap();
        assert_eq!(read_exact_len(&mut client, 5).await, b"+OK\r\n");

        let line = read_line(&mut watcher).await;
        assert!(line.starts_with('+'), "{}", line);
        assert!(line.ends_with("\"SET\" \"k\" \"v\"\r\n"), "{}", line);

        watcher.write_all(b"GET k\r\n").await.unwrap();
        let expected = b"-ERR Replica can't interact with the keyspace\r\n";
        assert_eq!(read_exact_len(&mut watcher, expected.len()).await, expected);

        watcher.write_all(b"QUIT\r\n").await.unwrap();
        assert_eq!(read_exact_len(&mut watcher, 5).await, b"+OK\r\n");

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while shared.monitor.subscribers() != 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(shared.monitor.subscribers(), 0);
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let (addr, shared) = create_test_server().await;
        let stats = Arc::clone(&shared.stats);

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let mut client = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        read_exact_len(&mut client, 7).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(stats.commands_processed.load(Ordering::Relaxed) >= 1);
        assert!(stats.bytes_read.load(Ordering::Relaxed) > 0);
        assert!(stats.bytes_written.load(Ordering::Relaxed) > 0);

        drop(client);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }
}
