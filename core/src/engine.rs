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

//! Session engine
//!
//! The engine owns every live session, ordered most recently activated
//! first. The head of the list is the active session: it receives typed input
//! and is the one the frontend shows. The first session ever added becomes
//! the default session. It is never attached to a remote host, never runs a
//! reader and can never be removed, so the list is never empty.
//!
//! Every session's signal hangs off the engine's global signal; triggering it
//! stops everything.

use crate::connection::{ConnectionError, ConnectionOptions, ProtocolConnection, Written};
use crate::display::Frontend;
use crate::profile::ProfileRegistry;
use crate::session::Session;
use crate::shutdown::ShutdownSignal;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Name of the session created with the engine
pub const DEFAULT_SESSION: &str = "default";

/// Upper bound on waiting for reader tasks during shutdown
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// The connection could not be established
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// No profile is registered under this name
    #[error("Unknown profile '{0}'")]
    UnknownProfile(String),

    /// A session with this name already exists
    #[error("Session '{0}' already exists")]
    DuplicateSession(String),

    /// The engine has been shut down
    #[error("Engine is shut down")]
    ShutDown,
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Multiplexer over sessions
pub struct Engine {
    frontend: Arc<dyn Frontend>,
    options: ConnectionOptions,
    profiles: ProfileRegistry,
    signal: Arc<ShutdownSignal>,
    default: OnceLock<Arc<Session>>,
    sessions: Mutex<Vec<Arc<Session>>>,

    /// Names of sessions still connecting
    connecting: Mutex<HashSet<String>>,
}

impl Engine {
    /// Create an engine along with its default session
    pub fn new(
        frontend: Arc<dyn Frontend>,
        options: ConnectionOptions,
        profiles: ProfileRegistry,
    ) -> Self {
        let engine = Self::empty(frontend, options, profiles);
        let display = engine.frontend.open_display(DEFAULT_SESSION);
        engine.add_session(Arc::new(Session::new(DEFAULT_SESSION, display)));
        engine
    }

    /// Create an engine without a default session; the first
    /// [`Engine::add_session`] supplies it.
    pub fn empty(
        frontend: Arc<dyn Frontend>,
        options: ConnectionOptions,
        profiles: ProfileRegistry,
    ) -> Self {
        Self {
            frontend,
            options,
            profiles,
            signal: Arc::new(ShutdownSignal::new("engine")),
            default: OnceLock::new(),
            sessions: Mutex::new(Vec::new()),
            connecting: Mutex::new(HashSet::new()),
        }
    }

    /// Global shutdown signal
    pub fn signal(&self) -> &Arc<ShutdownSignal> {
        &self.signal
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn profiles(&self) -> &ProfileRegistry {
        &self.profiles
    }

    /// The permanent default session
    pub fn default_session(&self) -> Option<Arc<Session>> {
        self.default.get().cloned()
    }

    /// The session receiving typed input
    pub fn active(&self) -> Option<Arc<Session>> {
        self.sessions()
            .first()
            .cloned()
            .or_else(|| self.default_session())
    }

    /// Find a session by name
    pub fn session(&self, name: &str) -> Option<Arc<Session>> {
        self.sessions()
            .iter()
            .find(|session| session.name() == name)
            .cloned()
    }

    /// Snapshot of every session, active first
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.list().clone()
    }

    /// Check whether `session` is the default session
    pub fn is_default(&self, session: &Arc<Session>) -> bool {
        self.default
            .get()
            .is_some_and(|default| Arc::ptr_eq(default, session))
    }

    /// Add a session.
    ///
    /// The first session added becomes the default and gets no reader. Any
    /// later session becomes active and starts reading.
    pub fn add_session(&self, session: Arc<Session>) {
        self.signal.register(session.signal().clone());

        if self.default.set(session.clone()).is_ok() {
            tracing::debug!("Session '{}' is the default session", session.name());
            self.list().push(session);
            return;
        }

        tracing::info!("Adding session '{}'", session.name());
        self.list().insert(0, session.clone());
        session.start();
        self.frontend
            .change_active(session.name(), &session.display());
    }

    /// Remove and shut down a session.
    ///
    /// Does nothing for the default session or a session that is not
    /// registered. Returns true if the session was removed.
    pub async fn remove_session(&self, session: &Arc<Session>) -> bool {
        if self.is_default(session) {
            tracing::debug!("Refusing to remove the default session");
            return false;
        }

        let front = {
            let mut sessions = self.list();
            let Some(index) = sessions
                .iter()
                .position(|candidate| Arc::ptr_eq(candidate, session))
            else {
                return false;
            };
            sessions.remove(index);
            sessions.first().cloned()
        };

        tracing::info!("Removing session '{}'", session.name());
        self.signal.unregister(session.signal());
        session.shutdown().await;
        session.join(SHUTDOWN_TIMEOUT).await;

        if let Some(front) = front {
            self.frontend.change_active(front.name(), &front.display());
        }
        session.display().close();
        true
    }

    /// Make an existing session active.
    ///
    /// Returns false if the session is not registered.
    pub fn switch_session(&self, session: &Arc<Session>) -> bool {
        {
            let mut sessions = self.list();
            let Some(index) = sessions
                .iter()
                .position(|candidate| Arc::ptr_eq(candidate, session))
            else {
                return false;
            };
            let session = sessions.remove(index);
            sessions.insert(0, session);
        }

        tracing::debug!("Switched to session '{}'", session.name());
        self.frontend
            .change_active(session.name(), &session.display());
        true
    }

    /// Send typed text to the active session
    pub async fn route_input(&self, text: &str) -> Written {
        match self.active() {
            Some(session) => session.send(text).await,
            None => {
                tracing::warn!("No session to receive input");
                Written::NotSent
            }
        }
    }

    /// Connect to `host:port` and add the result as the active session
    ///
    /// # Errors
    ///
    /// Fails if the engine is shut down, the name is taken, or the connection
    /// cannot be established.
    pub async fn connect(&self, name: &str, host: &str, port: u16) -> EngineResult<Arc<Session>> {
        if self.signal.is_triggered() {
            return Err(EngineError::ShutDown);
        }
        let _reservation = self.reserve(name)?;

        let display = self.frontend.open_display(name);
        let session = Arc::new(Session::new(name, display.clone()));
        let connection = match ProtocolConnection::connect(
            host,
            port,
            self.options.clone(),
            session.signal().clone(),
        )
        .await
        {
            Ok(connection) => connection,
            Err(e) => {
                display.close();
                return Err(e.into());
            }
        };

        session.attach(Arc::new(connection), display);
        self.add_session(session.clone());
        Ok(session)
    }

    /// Connect using a registered profile and run its setup
    ///
    /// # Errors
    ///
    /// Fails if the profile is unknown, or as [`Engine::connect`].
    pub async fn connect_profile(&self, name: &str) -> EngineResult<Arc<Session>> {
        let profile = self
            .profiles
            .get(name)
            .ok_or_else(|| EngineError::UnknownProfile(name.to_string()))?;

        let session = self
            .connect(profile.name(), profile.host(), profile.port())
            .await?;
        profile.setup(&session).await;
        Ok(session)
    }

    /// Stop every session and wait, bounded, for their readers to finish
    pub async fn shutdown(&self) {
        if self.signal.trigger() {
            tracing::info!("Shutting down engine");
        }

        let sessions = self.sessions();
        for session in &sessions {
            session.shutdown().await;
        }

        let stopped = futures::future::join_all(
            sessions
                .iter()
                .map(|session| session.join(SHUTDOWN_TIMEOUT)),
        )
        .await;
        let stuck = stopped.iter().filter(|stopped| !**stopped).count();
        if stuck > 0 {
            tracing::warn!("{} session readers were aborted", stuck);
        }
    }

    /// Claim `name` until the returned guard drops.
    ///
    /// The name must be free both among registered sessions and among
    /// connections still in progress.
    fn reserve(&self, name: &str) -> EngineResult<NameReservation<'_>> {
        let sessions = self.list();
        let mut connecting = self.connecting();
        if sessions.iter().any(|session| session.name() == name)
            || !connecting.insert(name.to_string())
        {
            return Err(EngineError::DuplicateSession(name.to_string()));
        }
        Ok(NameReservation {
            engine: self,
            name: name.to_string(),
        })
    }

    fn list(&self) -> MutexGuard<'_, Vec<Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn connecting(&self) -> MutexGuard<'_, HashSet<String>> {
        self.connecting.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A session name held while its connection is being established
struct NameReservation<'a> {
    engine: &'a Engine,
    name: String,
}

impl Drop for NameReservation<'_> {
    fn drop(&mut self) {
        self.engine.connecting().remove(&self.name);
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .sessions()
            .iter()
            .map(|session| session.name().to_string())
            .collect();
        f.debug_struct("Engine")
            .field("sessions", &names)
            .field("profiles", &self.profiles)
            .field("shutdown", &self.signal.is_triggered())
            .finish_non_exhaustive()
    }
}
