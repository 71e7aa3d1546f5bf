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

//! Sessions
//!
//! A session binds one connection to its three catcher pipelines and a
//! display. Once started, a reader task owns the session's [`LineBuffer`] and
//! is the only place that waits on the network:
//!
//! ```text
//! connection.read() -> LineBuffer -> input pipeline -> Display::write
//!                                 \-> raw pipeline  -> Display::prompt
//! ```
//!
//! Typed text goes the other way through [`Session::send`].

use crate::buffer::LineBuffer;
use crate::catcher::{CatcherPipeline, Direction, PipelineError};
use crate::connection::{ProtocolConnection, Written};
use crate::display::Display;
use crate::shutdown::ShutdownSignal;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Shown when typed text has nowhere to go
pub const NOT_CONNECTED: &str = "output ignored, not connected";

/// Shown when the remote end goes away
pub const CONNECTION_CLOSED: &str = "connection closed";

/// One remote connection and everything attached to it
pub struct Session {
    id: Uuid,
    name: String,
    signal: Arc<ShutdownSignal>,
    connection: RwLock<Option<Arc<ProtocolConnection>>>,
    display: RwLock<Arc<dyn Display>>,
    input: CatcherPipeline,
    output: CatcherPipeline,
    raw: CatcherPipeline,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Create an unattached session
    pub fn new(name: impl Into<String>, display: Arc<dyn Display>) -> Self {
        let name = name.into();
        Self {
            id: Uuid::new_v4(),
            signal: Arc::new(ShutdownSignal::new(format!("session:{}", name))),
            name,
            connection: RwLock::new(None),
            display: RwLock::new(display),
            input: CatcherPipeline::new(Direction::Input),
            output: CatcherPipeline::new(Direction::Output),
            raw: CatcherPipeline::new(Direction::Raw),
            reader: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signal that stops this session
    pub fn signal(&self) -> &Arc<ShutdownSignal> {
        &self.signal
    }

    /// Pipeline for lines received from the remote service
    pub fn input(&self) -> &CatcherPipeline {
        &self.input
    }

    /// Pipeline for text sent to the remote service
    pub fn output(&self) -> &CatcherPipeline {
        &self.output
    }

    /// Pipeline for the incomplete inbound tail
    pub fn raw(&self) -> &CatcherPipeline {
        &self.raw
    }

    /// Get the pipeline for `direction`
    pub fn pipeline(&self, direction: Direction) -> &CatcherPipeline {
        match direction {
            Direction::Input => &self.input,
            Direction::Output => &self.output,
            Direction::Raw => &self.raw,
        }
    }

    /// The attached connection, if any
    pub fn connection(&self) -> Option<Arc<ProtocolConnection>> {
        self.connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The display this session writes to
    pub fn display(&self) -> Arc<dyn Display> {
        self.display
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Check whether a connection was ever attached
    pub fn is_attached(&self) -> bool {
        self.connection().is_some()
    }

    /// Check whether the session has a live connection
    pub fn is_connected(&self) -> bool {
        !self.signal.is_triggered()
            && self
                .connection()
                .is_some_and(|connection| !connection.is_closed())
    }

    /// Bind a connection and the display its output goes to.
    ///
    /// Echo changes negotiated on the connection are forwarded to the display.
    pub fn attach(&self, connection: Arc<ProtocolConnection>, display: Arc<dyn Display>) {
        tracing::info!("Attaching {} to session '{}'", connection.address(), self.name);

        if !Arc::ptr_eq(connection.signal(), &self.signal) {
            connection.signal().register(self.signal.clone());
        }

        let echo_display = display.clone();
        connection.on_echo_change(move |state| echo_display.set_echo(state));

        *self
            .display
            .write()
            .unwrap_or_else(PoisonError::into_inner) = display;
        *self
            .connection
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(connection);
    }

    /// Spawn the reader task.
    ///
    /// Returns false if the session is unattached or already reading.
    pub fn start(self: &Arc<Self>) -> bool {
        let Some(connection) = self.connection() else {
            tracing::debug!("Session '{}' has no connection to read", self.name);
            return false;
        };

        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        if reader.is_some() {
            return false;
        }

        tracing::debug!("Starting reader for session '{}'", self.name);
        *reader = Some(tokio::spawn(self.clone().run(connection)));
        true
    }

    /// Stop the session and close its connection. Calling it again does
    /// nothing.
    pub async fn shutdown(&self) {
        if self.signal.trigger() {
            tracing::info!("Shutting down session '{}'", self.name);
        }
        if let Some(connection) = self.connection() {
            connection.close().await;
        }
    }

    /// Wait up to `timeout` for the reader task to finish.
    ///
    /// A reader still running after the timeout is aborted and false is
    /// returned.
    pub async fn join(&self, timeout: Duration) -> bool {
        let handle = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut handle) = handle else {
            return true;
        };

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!("Reader for session '{}' failed: {}", self.name, e);
                true
            }
            Err(_) => {
                tracing::warn!("Reader for session '{}' did not stop in time", self.name);
                handle.abort();
                false
            }
        }
    }

    /// Pass typed text through the output pipeline and send what survives.
    ///
    /// A line terminator is appended. Returns [`Written::NotSent`] when a
    /// catcher consumed the text or there is no live connection.
    pub async fn send(&self, text: &str) -> Written {
        let display = self.display();
        let applied = self.output.apply(text);
        report(display.as_ref(), &applied.failures);
        let Some(text) = applied.value else {
            return Written::NotSent;
        };

        let connection = match self.connection() {
            Some(connection) if !self.signal.is_triggered() && !connection.is_closed() => {
                connection
            }
            _ => {
                display.write(NOT_CONNECTED);
                return Written::NotSent;
            }
        };

        match connection.write(&format!("{}\r\n", text)).await {
            Ok(Written::NotSent) => {
                display.write(NOT_CONNECTED);
                Written::NotSent
            }
            Ok(written) => written,
            Err(e) => {
                tracing::warn!("Session '{}' lost its connection: {}", self.name, e);
                display.write(CONNECTION_CLOSED);
                Written::NotSent
            }
        }
    }

    async fn run(self: Arc<Self>, connection: Arc<ProtocolConnection>) {
        let mut buffer = LineBuffer::new();

        loop {
            if self.signal.is_triggered() {
                break;
            }

            let received = tokio::select! {
                _ = self.signal.triggered() => break,
                received = connection.read() => received,
            };

            match received {
                Ok(data) if data.is_empty() => {}
                Ok(data) => self.receive(&mut buffer, &data),
                Err(e) => {
                    tracing::info!("Session '{}' disconnected: {}", self.name, e);
                    self.display().write(CONNECTION_CLOSED);
                    break;
                }
            }
        }

        connection.close().await;
        tracing::debug!("Reader for session '{}' stopped", self.name);
    }

    fn receive(&self, buffer: &mut LineBuffer, data: &[u8]) {
        let display = self.display();

        for line in buffer.add(data) {
            let applied = self.input.apply(line);
            report(display.as_ref(), &applied.failures);
            if let Some(line) = applied.value {
                display.write(&line);
            }
        }

        if buffer.has_pending() {
            let applied = self.raw.apply(buffer.pending().into_owned());
            report(display.as_ref(), &applied.failures);
            if let Some(prompt) = applied.value {
                display.prompt(&prompt);
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("connection", &self.connection().map(|c| c.address()))
            .field("shutdown", &self.signal.is_triggered())
            .finish_non_exhaustive()
    }
}

fn report(display: &dyn Display, failures: &[PipelineError]) {
    for failure in failures {
        display.write(&format!("Warning: {}", failure));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catcher::{Catch, CatchMode, Catcher, CatcherError, FnCatcher};
    use crate::connection::ConnectionOptions;
    use crate::display::{DisplayEvent, MemoryDisplay};
    use crate::negotiation::EchoState;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn attached(name: &str) -> (Arc<Session>, Arc<MemoryDisplay>, DuplexStream) {
        let display = Arc::new(MemoryDisplay::new());
        let session = Arc::new(Session::new(name, display.clone()));
        let (client, server) = tokio::io::duplex(4096);
        let options = ConnectionOptions {
            read_timeout: Duration::from_millis(20),
            ..ConnectionOptions::default()
        };
        let connection = ProtocolConnection::from_transport(
            "localhost",
            4000,
            client,
            options,
            session.signal().clone(),
        );
        session.attach(Arc::new(connection), display.clone());
        (session, display, server)
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_lines_and_prompt_reach_display() {
        let (session, display, mut server) = attached("world");
        assert!(session.start());
        assert!(!session.start());

        server.write_all(b"Welcome\r\nName: ").await.unwrap();
        wait_until(|| {
            display
                .events()
                .contains(&DisplayEvent::Prompt("Name: ".to_string()))
        })
        .await;
        assert_eq!(display.lines(), vec!["Welcome"]);

        session.shutdown().await;
        assert!(session.join(Duration::from_secs(1)).await);
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_send_appends_terminator() {
        let (session, _display, mut server) = attached("world");
        assert_eq!(session.send("look").await, Written::Sent(6));

        let mut received = [0u8; 6];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"look\r\n");
    }

    #[tokio::test]
    async fn test_output_catcher_can_consume_text() {
        let (session, _display, mut server) = attached("world");
        session.output().add(
            Arc::new(FnCatcher::muffle("gag", |text| {
                if text == "secret" {
                    Catch::Suppress
                } else {
                    Catch::Pass
                }
            })),
            false,
        );

        assert_eq!(session.send("secret").await, Written::NotSent);
        assert_eq!(session.send("ok").await, Written::Sent(4));

        let mut received = [0u8; 4];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"ok\r\n");
    }

    #[tokio::test]
    async fn test_unattached_send_warns() {
        let display = Arc::new(MemoryDisplay::new());
        let session = Session::new("default", display.clone());
        assert!(!session.is_attached());
        assert_eq!(session.send("hello").await, Written::NotSent);
        assert_eq!(display.lines(), vec![NOT_CONNECTED]);
    }

    #[tokio::test]
    async fn test_send_after_shutdown_warns() {
        let (session, display, _server) = attached("world");
        session.shutdown().await;
        session.shutdown().await;
        assert_eq!(session.send("hello").await, Written::NotSent);
        assert_eq!(display.lines(), vec![NOT_CONNECTED]);
    }

    #[tokio::test]
    async fn test_remote_close_is_reported() {
        let (session, display, server) = attached("world");
        session.start();
        drop(server);

        wait_until(|| display.lines().contains(&CONNECTION_CLOSED.to_string())).await;
        assert!(session.signal().is_triggered());
        assert!(session.join(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_echo_changes_reach_display() {
        let (session, display, mut server) = attached("world");
        session.start();

        server.write_all(&[255, 251, 1]).await.unwrap();
        wait_until(|| {
            display
                .events()
                .contains(&DisplayEvent::Echo(EchoState::Server))
        })
        .await;

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_input_catchers_filter_and_report_failures() {
        let (session, display, mut server) = attached("world");
        session.input().add(
            Arc::new(FnCatcher::muffle("spam", |line| {
                if line == "spam" {
                    Catch::Suppress
                } else {
                    Catch::Pass
                }
            })),
            false,
        );
        let broken: Arc<dyn Catcher> = Arc::new(FnCatcher::new("broken", CatchMode::Listen, |_| {
            Err(CatcherError::new("boom"))
        }));
        session.input().add(broken, false);
        session.start();

        server.write_all(b"spam\r\nhello\r\n").await.unwrap();
        wait_until(|| display.lines().contains(&"hello".to_string())).await;
        assert_eq!(
            display.lines(),
            vec![
                "Warning: Catcher 'broken' failed in input pipeline: boom".to_string(),
                "hello".to_string(),
            ]
        );

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_raw_catcher_sees_pending_tail() {
        let (session, display, mut server) = attached("world");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        session.raw().add(
            Arc::new(
                FnCatcher::muffle("login", move |tail| {
                    record.lock().unwrap().push(tail.to_string());
                    Catch::Suppress
                })
                .once(),
            ),
            false,
        );
        session.start();

        server.write_all(b"Password: ").await.unwrap();
        wait_until(|| !seen.lock().unwrap().is_empty()).await;
        assert_eq!(*seen.lock().unwrap(), vec!["Password: ".to_string()]);
        assert!(!display
            .events()
            .iter()
            .any(|event| matches!(event, DisplayEvent::Prompt(_))));

        session.shutdown().await;
    }
}
