//
// Copyright 2025-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Protocol connection management
//!
//! [`ProtocolConnection`] wraps one transport to a remote service. Inbound
//! bytes are inflated (once MCCP is active), scanned for Telnet control
//! sequences, and handed to the option negotiators; what remains is returned
//! as data. Outbound data has its IAC bytes doubled.
//!
//! The read and write halves sit behind separate locks so the session reader
//! task and the task routing typed input never wait on each other.

use crate::negotiation::{
    CompressionPhase, EchoState, NegotiationContext, Negotiator, default_negotiators,
};
use crate::shutdown::ShutdownSignal;
use crate::telnet::{TelnetCommand, TelnetEvent, TelnetParser, build_negotiation, escape_iac};
use chrono::{DateTime, Utc};
use flate2::{Decompress, FlushDecompress, Status};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;

/// Output space added per inflate round
const INFLATE_CHUNK: usize = 8 * 1024;

/// Byte stream a connection can run over
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

type BoxedTransport = Box<dyn Transport>;

/// Observer told about echo state changes
pub type EchoObserver = Arc<dyn Fn(EchoState) + Send + Sync>;

/// Connection errors
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The remote host could not be reached
    #[error("Unable to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Connecting took longer than the configured timeout
    #[error("Timed out connecting to {host}:{port}")]
    ConnectTimeout { host: String, port: u16 },

    /// The connection is closed or failed while in use
    #[error("Connection to {address} closed: {reason}")]
    Closed { address: String, reason: String },
}

/// Result type for connection operations
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Outcome of a write
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Written {
    /// The given number of bytes went out, escapes included
    Sent(usize),

    /// The connection was already shut down; nothing was sent
    NotSent,
}

/// Connection tuning
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Upper bound on establishing the TCP connection
    pub connect_timeout: Duration,

    /// Upper bound on a single read; bounds shutdown latency of reader tasks
    pub read_timeout: Duration,

    /// Size of the buffer handed to each read
    pub read_buffer_size: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_millis(250),
            read_buffer_size: 4096,
        }
    }
}

/// Negotiators and the state they share
struct Negotiation {
    context: NegotiationContext,
    negotiators: Vec<Box<dyn Negotiator>>,
}

impl Negotiation {
    fn dispatch(&mut self, event: &TelnetEvent) {
        for negotiator in &mut self.negotiators {
            match negotiator.handle(event, &mut self.context) {
                Ok(false) => {}
                Ok(true) => return,
                Err(violation) => {
                    tracing::warn!("{} negotiator: {}", negotiator.name(), violation);
                    return;
                }
            }
        }
        tracing::debug!("Ignoring telnet event {:?}", event);
    }

    fn replies_sent(&mut self) {
        for negotiator in &mut self.negotiators {
            negotiator.replies_sent(&mut self.context);
        }
    }
}

/// Inbound side: read half, parser and optional inflater
struct Inbound {
    reader: ReadHalf<BoxedTransport>,
    parser: TelnetParser,
    inflater: Option<Decompress>,
}

/// Telnet connection to one remote service
pub struct ProtocolConnection {
    /// Remote host name
    host: String,

    /// Remote port
    port: u16,

    /// Connection tuning
    options: ConnectionOptions,

    /// Read half and decoding state
    inbound: tokio::sync::Mutex<Inbound>,

    /// Write half; `None` once closed
    writer: tokio::sync::Mutex<Option<WriteHalf<BoxedTransport>>>,

    /// Option negotiation state
    negotiation: Mutex<Negotiation>,

    /// Echo state observers
    observers: Mutex<Vec<EchoObserver>>,

    /// Time of the last successful write
    last_write: Mutex<Option<DateTime<Utc>>>,

    /// Set once by `close`
    closed: AtomicBool,

    /// Signal of the owning session
    signal: Arc<ShutdownSignal>,
}

impl ProtocolConnection {
    /// Open a TCP connection to `host:port`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Connect`] if the host is unreachable or
    /// refuses the connection, and [`ConnectionError::ConnectTimeout`] if it
    /// does not answer within `options.connect_timeout`.
    pub async fn connect(
        host: &str,
        port: u16,
        options: ConnectionOptions,
        signal: Arc<ShutdownSignal>,
    ) -> ConnectionResult<Self> {
        tracing::info!("Connecting to {}:{}", host, port);

        let stream =
            match tokio::time::timeout(options.connect_timeout, TcpStream::connect((host, port)))
                .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(source)) => {
                    return Err(ConnectionError::Connect {
                        host: host.to_string(),
                        port,
                        source,
                    });
                }
                Err(_) => {
                    return Err(ConnectionError::ConnectTimeout {
                        host: host.to_string(),
                        port,
                    });
                }
            };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Unable to set TCP_NODELAY for {}:{}: {}", host, port, e);
        }

        tracing::info!("Connected to {}:{}", host, port);
        Ok(Self::from_transport(host, port, stream, options, signal))
    }

    /// Wrap an already established transport
    pub fn from_transport<T: Transport>(
        host: &str,
        port: u16,
        transport: T,
        options: ConnectionOptions,
        signal: Arc<ShutdownSignal>,
    ) -> Self {
        let boxed: BoxedTransport = Box::new(transport);
        let (reader, writer) = tokio::io::split(boxed);

        Self {
            host: host.to_string(),
            port,
            options,
            inbound: tokio::sync::Mutex::new(Inbound {
                reader,
                parser: TelnetParser::new(),
                inflater: None,
            }),
            writer: tokio::sync::Mutex::new(Some(writer)),
            negotiation: Mutex::new(Negotiation {
                context: NegotiationContext::new(),
                negotiators: default_negotiators(),
            }),
            observers: Mutex::new(Vec::new()),
            last_write: Mutex::new(None),
            closed: AtomicBool::new(false),
            signal,
        }
    }

    /// Get the remote host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Get the remote port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the connection options
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Get the signal this connection triggers when it fails
    pub fn signal(&self) -> &Arc<ShutdownSignal> {
        &self.signal
    }

    /// Check whether the connection has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Current echo state
    pub fn echo_state(&self) -> EchoState {
        self.negotiation().context.echo()
    }

    /// Current compression handshake phase
    pub fn compression_phase(&self) -> CompressionPhase {
        self.negotiation().context.compression()
    }

    /// Time of the last successful write
    pub fn last_write(&self) -> Option<DateTime<Utc>> {
        *self.last_write.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an observer for echo state changes
    pub fn on_echo_change<F>(&self, observer: F)
    where
        F: Fn(EchoState) + Send + Sync + 'static,
    {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(observer));
    }

    /// Add a negotiator for another option.
    ///
    /// It sees every control event after the built-in negotiators.
    pub fn add_negotiator(&self, negotiator: Box<dyn Negotiator>) {
        tracing::debug!("Adding {} negotiator to {}", negotiator.name(), self.address());
        self.negotiation().negotiators.push(negotiator);
    }

    /// Read whatever data is available.
    ///
    /// Returns an empty buffer when the read timeout elapses or the received
    /// bytes were all protocol traffic.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] when the remote end closed, the read
    /// failed, or the compressed stream is corrupt. The connection triggers its
    /// signal and closes itself first.
    pub async fn read(&self) -> ConnectionResult<Vec<u8>> {
        if self.is_closed() {
            return Err(self.closed_error("already closed"));
        }

        let mut inbound = self.inbound.lock().await;
        let mut chunk = vec![0u8; self.options.read_buffer_size];

        let count = match tokio::time::timeout(
            self.options.read_timeout,
            inbound.reader.read(&mut chunk),
        )
        .await
        {
            Err(_) => return Ok(Vec::new()),
            Ok(Ok(0)) => return Err(self.fail("remote end closed the connection").await),
            Ok(Ok(count)) => count,
            Ok(Err(e)) => return Err(self.fail(&format!("read failed: {}", e)).await),
        };

        tracing::trace!("Read {} bytes from {}", count, self.address());
        match self.process(&mut inbound, &chunk[..count]).await {
            Ok(data) => Ok(data),
            Err(reason) => Err(self.fail(&reason).await),
        }
    }

    /// Write text to the remote service
    ///
    /// # Errors
    ///
    /// See [`ProtocolConnection::write_bytes`].
    pub async fn write(&self, text: &str) -> ConnectionResult<Written> {
        self.write_bytes(text.as_bytes()).await
    }

    /// Write data to the remote service, doubling every IAC byte.
    ///
    /// Returns [`Written::NotSent`] if the connection is already shut down.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] if the transport fails during the
    /// write; the connection is closed before returning.
    pub async fn write_bytes(&self, data: &[u8]) -> ConnectionResult<Written> {
        self.write_raw(&escape_iac(data)).await
    }

    /// Send a single `IAC <command> <option>` sequence
    ///
    /// # Errors
    ///
    /// See [`ProtocolConnection::write_bytes`].
    pub async fn send_command(
        &self,
        command: TelnetCommand,
        option: u8,
    ) -> ConnectionResult<Written> {
        self.write_raw(&build_negotiation(command, option)).await
    }

    /// Close the connection and trigger its signal. Calling it again does
    /// nothing.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::info!("Closing connection to {}", self.address());
        self.signal.trigger();

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!("Error shutting down {}: {}", self.address(), e);
            }
        }
    }

    async fn write_raw(&self, bytes: &[u8]) -> ConnectionResult<Written> {
        if self.is_closed() {
            return Ok(Written::NotSent);
        }

        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Ok(Written::NotSent);
        };

        let result = match writer.write_all(bytes).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                *self.last_write.lock().unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
                Ok(Written::Sent(bytes.len()))
            }
            Err(e) => {
                guard.take();
                drop(guard);
                Err(self.fail(&format!("write failed: {}", e)).await)
            }
        }
    }

    /// Turn raw received bytes into data, handling negotiation on the way
    async fn process(&self, inbound: &mut Inbound, raw: &[u8]) -> Result<Vec<u8>, String> {
        let mut stream = self.decode(inbound, raw)?;
        let mut data = Vec::with_capacity(stream.len());
        let mut offset = 0;

        while offset < stream.len() {
            let parsed = inbound.parser.feed(&stream[offset..]);
            offset += parsed.consumed;

            if self.dispatch(parsed.events, &mut data).await? {
                tracing::info!("Compression started on {}", self.address());
                inbound.inflater = Some(Decompress::new(true));
                let rest = stream.split_off(offset);
                stream = self.decode(inbound, &rest)?;
                offset = 0;
            }
        }

        Ok(data)
    }

    /// Inflate `raw` if compression is active
    fn decode(&self, inbound: &mut Inbound, raw: &[u8]) -> Result<Vec<u8>, String> {
        let Some(inflater) = inbound.inflater.as_mut() else {
            return Ok(raw.to_vec());
        };

        let (mut plain, ended) =
            inflate(inflater, raw).map_err(|e| format!("corrupt compressed stream: {}", e))?;

        if let Some(consumed) = ended {
            tracing::info!("Compression ended on {}", self.address());
            inbound.inflater = None;
            self.negotiation().context.end_compression();
            plain.extend_from_slice(&raw[consumed..]);
        }

        Ok(plain)
    }

    /// Route decoded events; returns true when compression must start
    async fn dispatch(&self, events: Vec<TelnetEvent>, data: &mut Vec<u8>) -> Result<bool, String> {
        let mut echo_changes = Vec::new();
        let (replies, start) = {
            let mut negotiation = self.negotiation();
            for event in events {
                match event {
                    TelnetEvent::Data(bytes) => data.extend_from_slice(&bytes),
                    TelnetEvent::Command(command) => {
                        tracing::trace!("Ignoring telnet command {:?}", command);
                    }
                    event => {
                        let before = negotiation.context.echo();
                        negotiation.dispatch(&event);
                        let after = negotiation.context.echo();
                        if before != after {
                            echo_changes.push(after);
                        }
                    }
                }
            }
            (
                negotiation.context.take_replies(),
                negotiation.context.take_compression_start(),
            )
        };

        for echo in echo_changes {
            tracing::debug!("Echo state on {} is now {:?}", self.address(), echo);
            self.notify_echo(echo);
        }

        if !replies.is_empty() {
            match self.write_raw(&replies).await {
                Ok(Written::Sent(_)) => self.negotiation().replies_sent(),
                Ok(Written::NotSent) => {}
                Err(e) => return Err(e.to_string()),
            }
        }

        Ok(start)
    }

    fn notify_echo(&self, echo: EchoState) {
        let observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            observer(echo);
        }
    }

    async fn fail(&self, reason: &str) -> ConnectionError {
        tracing::warn!("Connection to {} failed: {}", self.address(), reason);
        self.close().await;
        self.closed_error(reason)
    }

    fn closed_error(&self, reason: &str) -> ConnectionError {
        ConnectionError::Closed {
            address: self.address(),
            reason: reason.to_string(),
        }
    }

    fn negotiation(&self) -> MutexGuard<'_, Negotiation> {
        self.negotiation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ProtocolConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolConnection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Inflate `input`.
///
/// Returns the inflated bytes and, if the compressed stream ended inside
/// `input`, the number of input bytes it occupied.
fn inflate(
    inflater: &mut Decompress,
    input: &[u8],
) -> Result<(Vec<u8>, Option<usize>), flate2::DecompressError> {
    let mut output = Vec::with_capacity(input.len().saturating_mul(4).max(INFLATE_CHUNK));
    let mut offset = 0;

    loop {
        if output.len() == output.capacity() {
            output.reserve(INFLATE_CHUNK);
        }

        let (in_before, out_before) = (inflater.total_in(), inflater.total_out());
        let status = inflater.decompress_vec(&input[offset..], &mut output, FlushDecompress::None)?;
        offset += (inflater.total_in() - in_before) as usize;

        if status == Status::StreamEnd {
            return Ok((output, Some(offset)));
        }

        let progressed = inflater.total_in() != in_before || inflater.total_out() != out_before;
        if !progressed || (offset >= input.len() && output.len() < output.capacity()) {
            return Ok((output, None));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;
    use tokio::io::DuplexStream;

    const IAC: u8 = 255;
    const WILL: u8 = 251;
    const WONT: u8 = 252;
    const DO: u8 = 253;
    const DONT: u8 = 254;
    const SB: u8 = 250;
    const SE: u8 = 240;
    const ECHO: u8 = 1;
    const COMPRESS: u8 = 85;
    const COMPRESS2: u8 = 86;

    fn options() -> ConnectionOptions {
        ConnectionOptions {
            read_timeout: Duration::from_millis(50),
            ..ConnectionOptions::default()
        }
    }

    fn pair() -> (ProtocolConnection, DuplexStream, Arc<ShutdownSignal>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let signal = Arc::new(ShutdownSignal::new("test"));
        let connection =
            ProtocolConnection::from_transport("mud.example", 4000, client, options(), signal.clone());
        (connection, server, signal)
    }

    /// Keep reading until data shows up or the connection fails
    async fn read_data(connection: &ProtocolConnection) -> Vec<u8> {
        for _ in 0..20 {
            let data = connection.read().await.unwrap();
            if !data.is_empty() {
                return data;
            }
        }
        Vec::new()
    }

    async fn read_exact(server: &mut DuplexStream, count: usize) -> Vec<u8> {
        let mut buffer = vec![0u8; count];
        tokio::time::timeout(Duration::from_secs(1), server.read_exact(&mut buffer))
            .await
            .expect("timed out waiting for client bytes")
            .unwrap();
        buffer
    }

    fn compress(encoder: &mut ZlibEncoder<Vec<u8>>, data: &[u8]) -> Vec<u8> {
        encoder.write_all(data).unwrap();
        encoder.flush().unwrap();
        std::mem::take(encoder.get_mut())
    }

    #[tokio::test]
    async fn test_write_doubles_iac() {
        let (connection, mut server, _) = pair();
        let written = connection.write_bytes(&[b'a', IAC, b'b', IAC]).await.unwrap();
        assert_eq!(written, Written::Sent(6));
        assert_eq!(read_exact(&mut server, 6).await, vec![b'a', IAC, IAC, b'b', IAC, IAC]);
        assert!(connection.last_write().is_some());
    }

    #[tokio::test]
    async fn test_plain_data_passes_through() {
        let (connection, mut server, _) = pair();
        server.write_all(b"Welcome!\r\n").await.unwrap();
        assert_eq!(read_data(&connection).await, b"Welcome!\r\n");
    }

    #[tokio::test]
    async fn test_read_timeout_returns_empty() {
        let (connection, _server, signal) = pair();
        assert!(connection.read().await.unwrap().is_empty());
        assert!(!connection.is_closed());
        assert!(!signal.is_triggered());
    }

    #[tokio::test]
    async fn test_echo_negotiation_and_observer() {
        let (connection, mut server, _) = pair();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        connection.on_echo_change(move |echo| sink.lock().unwrap().push(echo));

        server.write_all(&[IAC, WILL, ECHO]).await.unwrap();
        server.write_all(b"Password: ").await.unwrap();
        assert_eq!(read_data(&connection).await, b"Password: ");
        assert_eq!(connection.echo_state(), EchoState::Server);
        assert_eq!(read_exact(&mut server, 3).await, vec![IAC, DO, ECHO]);

        server.write_all(&[IAC, WONT, ECHO, b'\r', b'\n']).await.unwrap();
        assert_eq!(read_data(&connection).await, b"\r\n");
        assert_eq!(connection.echo_state(), EchoState::Client);
        assert_eq!(read_exact(&mut server, 3).await, vec![IAC, DONT, ECHO]);

        assert_eq!(*seen.lock().unwrap(), vec![EchoState::Server, EchoState::Client]);
    }

    #[tokio::test]
    async fn test_unknown_negotiation_is_ignored() {
        let (connection, mut server, _) = pair();
        server.write_all(&[IAC, DO, 31, b'o', b'k']).await.unwrap();
        assert_eq!(read_data(&connection).await, b"ok");
        assert_eq!(connection.echo_state(), EchoState::Client);
        assert_eq!(connection.compression_phase(), CompressionPhase::Inactive);

        let mut buffer = [0u8; 8];
        let pending =
            tokio::time::timeout(Duration::from_millis(50), server.read(&mut buffer)).await;
        assert!(pending.is_err(), "no reply expected for an unknown option");
    }

    #[tokio::test]
    async fn test_compression_handshake_and_inflation() {
        let (connection, mut server, _) = pair();

        server.write_all(&[IAC, WILL, COMPRESS2]).await.unwrap();
        assert!(connection.read().await.unwrap().is_empty());
        assert_eq!(
            read_exact(&mut server, 6).await,
            vec![IAC, DO, COMPRESS2, IAC, DONT, COMPRESS]
        );
        assert_eq!(connection.compression_phase(), CompressionPhase::OptionConfirmed);

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        let mut chunk = vec![IAC, SB, COMPRESS2, IAC, SE];
        chunk.extend(compress(&mut encoder, b"compressed hello\r\n"));
        server.write_all(&chunk).await.unwrap();

        assert_eq!(read_data(&connection).await, b"compressed hello\r\n");
        assert_eq!(connection.compression_phase(), CompressionPhase::Active);

        // Control sequences inside the compressed stream still negotiate
        let mut inner = vec![IAC, WILL, ECHO];
        inner.extend_from_slice(b"more");
        server.write_all(&compress(&mut encoder, &inner)).await.unwrap();
        assert_eq!(read_data(&connection).await, b"more");
        assert_eq!(connection.echo_state(), EchoState::Server);
    }

    #[tokio::test]
    async fn test_compression_stream_end_resumes_plain_data() {
        let (connection, mut server, _) = pair();
        server.write_all(&[IAC, WILL, COMPRESS2]).await.unwrap();
        assert!(connection.read().await.unwrap().is_empty());
        read_exact(&mut server, 6).await;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"inside ").unwrap();
        let mut chunk = vec![IAC, SB, COMPRESS2, IAC, SE];
        chunk.extend(encoder.finish().unwrap());
        chunk.extend_from_slice(b"outside");
        server.write_all(&chunk).await.unwrap();

        let mut data = Vec::new();
        while data.len() < b"inside outside".len() {
            let more = read_data(&connection).await;
            assert!(!more.is_empty());
            data.extend(more);
        }
        assert_eq!(data, b"inside outside");
        assert_eq!(connection.compression_phase(), CompressionPhase::Inactive);
    }

    #[tokio::test]
    async fn test_mismatched_subnegotiation_keeps_phase() {
        let (connection, mut server, _) = pair();
        server.write_all(&[IAC, WILL, COMPRESS2]).await.unwrap();
        assert!(connection.read().await.unwrap().is_empty());
        read_exact(&mut server, 6).await;

        server
            .write_all(&[IAC, SB, COMPRESS2, b'x', IAC, SE, b'p', b'l', b'a', b'i', b'n'])
            .await
            .unwrap();
        assert_eq!(read_data(&connection).await, b"plain");
        assert_eq!(connection.compression_phase(), CompressionPhase::StreamDetected);
        assert!(!connection.is_closed());
    }

    #[tokio::test]
    async fn test_remote_close_triggers_signal() {
        let (connection, server, signal) = pair();
        drop(server);

        let result = connection.read().await;
        assert!(matches!(result, Err(ConnectionError::Closed { .. })));
        assert!(connection.is_closed());
        assert!(signal.is_triggered());

        assert!(matches!(connection.read().await, Err(ConnectionError::Closed { .. })));
        assert_eq!(connection.write("look").await.unwrap(), Written::NotSent);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (connection, _server, signal) = pair();
        connection.close().await;
        connection.close().await;
        assert!(connection.is_closed());
        assert!(signal.is_triggered());
        assert_eq!(connection.write("north").await.unwrap(), Written::NotSent);
    }

    #[tokio::test]
    async fn test_send_command() {
        let (connection, mut server, _) = pair();
        let written = connection.send_command(TelnetCommand::DONT, ECHO).await.unwrap();
        assert_eq!(written, Written::Sent(3));
        assert_eq!(read_exact(&mut server, 3).await, vec![IAC, DONT, ECHO]);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let signal = Arc::new(ShutdownSignal::new("refused"));
        let result = ProtocolConnection::connect("127.0.0.1", port, options(), signal).await;
        assert!(matches!(result, Err(ConnectionError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_connect_over_tcp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"hi\n").await.unwrap();
            socket
        });

        let signal = Arc::new(ShutdownSignal::new("tcp"));
        let connection = ProtocolConnection::connect("127.0.0.1", port, options(), signal)
            .await
            .unwrap();
        let _socket = accept.await.unwrap();
        assert_eq!(read_data(&connection).await, b"hi\n");
        assert_eq!(connection.address(), format!("127.0.0.1:{}", port));
    }

    #[tokio::test]
    async fn test_scripted_transport_sees_exact_replies() {
        let transport = tokio_test::io::Builder::new()
            .read(&[IAC, WILL, ECHO])
            .write(&[IAC, DO, ECHO])
            .read(&[IAC, WONT, ECHO, b'o', b'k'])
            .write(&[IAC, DONT, ECHO])
            .build();
        let signal = Arc::new(ShutdownSignal::new("scripted"));
        let connection =
            ProtocolConnection::from_transport("scripted", 23, transport, options(), signal);

        assert!(connection.read().await.unwrap().is_empty());
        assert_eq!(connection.echo_state(), EchoState::Server);
        assert_eq!(connection.read().await.unwrap(), b"ok");
        assert_eq!(connection.echo_state(), EchoState::Client);
    }
}
