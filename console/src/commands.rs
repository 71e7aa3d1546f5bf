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

//! Console commands
//!
//! Commands are typed with a leading `/` and consumed by a catcher on the
//! default session's output pipeline, so they never reach a remote host.

use mudlink_core::{Catch, CatchMode, Catcher, CatcherError, Engine, EngineError};
use std::sync::{Arc, Weak};
use thiserror::Error;

/// A parsed console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Connect to a configured world
    Connect { world: String },

    /// Connect to an arbitrary host
    Open { name: String, host: String, port: u16 },

    /// Make a session active
    Switch { name: String },

    /// Close a session, or the active one
    Disconnect { name: Option<String> },

    /// List sessions
    Sessions,

    /// List configured worlds
    Worlds,

    /// Leave the client
    Quit,
}

/// Command errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command '/{0}'")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("No session named '{0}'")]
    NoSession(String),

    #[error("The default session cannot be disconnected")]
    DefaultSession,

    #[error("{0}")]
    Engine(String),
}

impl From<EngineError> for CommandError {
    fn from(error: EngineError) -> Self {
        CommandError::Engine(error.to_string())
    }
}

impl Command {
    /// Parse the text after the leading `/`
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let mut words = text.split_whitespace();
        let verb = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();

        match (verb, args.as_slice()) {
            ("connect", [world]) => Ok(Command::Connect {
                world: world.to_string(),
            }),
            ("connect", [name, host, port]) => {
                let port = port
                    .parse()
                    .map_err(|_| CommandError::Usage("/connect <name> <host> <port>"))?;
                Ok(Command::Open {
                    name: name.to_string(),
                    host: host.to_string(),
                    port,
                })
            }
            ("connect", _) => Err(CommandError::Usage(
                "/connect <world> | /connect <name> <host> <port>",
            )),
            ("switch", [name]) => Ok(Command::Switch {
                name: name.to_string(),
            }),
            ("switch", _) => Err(CommandError::Usage("/switch <name>")),
            ("disconnect", []) => Ok(Command::Disconnect { name: None }),
            ("disconnect", [name]) => Ok(Command::Disconnect {
                name: Some(name.to_string()),
            }),
            ("disconnect", _) => Err(CommandError::Usage("/disconnect [name]")),
            ("sessions", []) => Ok(Command::Sessions),
            ("worlds", []) => Ok(Command::Worlds),
            ("quit", []) => Ok(Command::Quit),
            (verb, _) => Err(CommandError::Unknown(verb.to_string())),
        }
    }

    /// Run the command, returning lines to show the user
    pub async fn execute(self, engine: &Engine) -> Result<Vec<String>, CommandError> {
        match self {
            Command::Connect { world } => {
                let session = engine.connect_profile(&world).await?;
                Ok(vec![format!("Connected to {}", session.name())])
            }
            Command::Open { name, host, port } => {
                let session = engine.connect(&name, &host, port).await?;
                Ok(vec![format!("Connected to {}", session.name())])
            }
            Command::Switch { name } => {
                let session = engine
                    .session(&name)
                    .ok_or(CommandError::NoSession(name))?;
                engine.switch_session(&session);
                Ok(Vec::new())
            }
            Command::Disconnect { name } => {
                let session = match name {
                    Some(name) => engine
                        .session(&name)
                        .ok_or(CommandError::NoSession(name))?,
                    None => engine
                        .active()
                        .ok_or_else(|| CommandError::NoSession(String::new()))?,
                };
                if engine.is_default(&session) {
                    return Err(CommandError::DefaultSession);
                }
                engine.remove_session(&session).await;
                Ok(vec![format!("Disconnected from {}", session.name())])
            }
            Command::Sessions => Ok(engine
                .sessions()
                .iter()
                .enumerate()
                .map(|(index, session)| {
                    let marker = if index == 0 { "*" } else { " " };
                    let state = match session.connection() {
                        Some(connection) if session.is_connected() => connection.address(),
                        Some(_) => "disconnected".to_string(),
                        None => "local".to_string(),
                    };
                    format!("{} {} ({})", marker, session.name(), state)
                })
                .collect()),
            Command::Worlds => {
                let names = engine.profiles().names();
                if names.is_empty() {
                    Ok(vec!["No worlds configured".to_string()])
                } else {
                    Ok(names)
                }
            }
            Command::Quit => {
                engine.signal().trigger();
                Ok(vec!["Goodbye".to_string()])
            }
        }
    }
}

/// Output catcher that runs console commands
pub struct CommandCatcher {
    engine: Weak<Engine>,
}

impl CommandCatcher {
    pub fn new(engine: &Arc<Engine>) -> Self {
        Self {
            engine: Arc::downgrade(engine),
        }
    }

    /// Install the catcher on the engine's default session
    pub fn install(engine: &Arc<Engine>) -> bool {
        match engine.default_session() {
            Some(default) => default.output().add(Arc::new(Self::new(engine)), true),
            None => false,
        }
    }
}

impl Catcher for CommandCatcher {
    fn name(&self) -> &str {
        "commands"
    }

    fn mode(&self) -> CatchMode {
        CatchMode::Muffle
    }

    fn catch(&self, value: &str) -> Result<Catch, CatcherError> {
        let Some(text) = value.strip_prefix('/') else {
            return Ok(Catch::Pass);
        };
        let Some(engine) = self.engine.upgrade() else {
            return Err(CatcherError::new("engine is gone"));
        };
        let display = engine
            .default_session()
            .map(|session| session.display())
            .ok_or_else(|| CatcherError::new("no default session"))?;
        let command = match Command::parse(text) {
            Ok(command) => command,
            Err(e) => {
                display.write(&e.to_string());
                return Ok(Catch::Suppress);
            }
        };

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| CatcherError::new(format!("no runtime for '/{}': {}", text, e)))?;

        tracing::debug!("Running command {:?}", command);
        runtime.spawn(async move {
            match command.execute(&engine).await {
                Ok(lines) => {
                    for line in lines {
                        display.write(&line);
                    }
                }
                Err(e) => display.write(&e.to_string()),
            }
        });
        Ok(Catch::Suppress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mudlink_core::engine::DEFAULT_SESSION;
    use mudlink_core::{
        ConnectionOptions, Display, MemoryDisplay, MemoryFrontend, ProfileRegistry, Session,
    };
    use tokio::time::{Duration, sleep, timeout};

    fn engine() -> (Arc<Engine>, Arc<MemoryFrontend>) {
        let frontend = Arc::new(MemoryFrontend::new());
        let engine = Arc::new(Engine::new(
            frontend.clone(),
            ConnectionOptions::default(),
            ProfileRegistry::new(),
        ));
        (engine, frontend)
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            Command::parse("connect aardwolf"),
            Ok(Command::Connect {
                world: "aardwolf".to_string()
            })
        );
        assert_eq!(
            Command::parse("connect test localhost 4000"),
            Ok(Command::Open {
                name: "test".to_string(),
                host: "localhost".to_string(),
                port: 4000
            })
        );
        assert_eq!(
            Command::parse("disconnect"),
            Ok(Command::Disconnect { name: None })
        );
        assert_eq!(Command::parse("  quit  "), Ok(Command::Quit));
        assert_eq!(Command::parse("sessions"), Ok(Command::Sessions));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Command::parse("connect a b notaport"),
            Err(CommandError::Usage(_))
        ));
        assert!(matches!(Command::parse("switch"), Err(CommandError::Usage(_))));
        assert_eq!(
            Command::parse("dance wildly"),
            Err(CommandError::Unknown("dance".to_string()))
        );
    }

    #[tokio::test]
    async fn test_sessions_lists_active_first() {
        let (engine, _) = engine();
        let display: Arc<dyn Display> = Arc::new(MemoryDisplay::new());
        engine.add_session(Arc::new(Session::new("other", display)));

        let lines = Command::Sessions.execute(&engine).await.unwrap();
        assert_eq!(
            lines,
            vec![
                "* other (local)".to_string(),
                format!("  {} (local)", DEFAULT_SESSION),
            ]
        );
    }

    #[tokio::test]
    async fn test_default_session_cannot_be_disconnected() {
        let (engine, _) = engine();
        assert_eq!(
            Command::Disconnect { name: None }.execute(&engine).await,
            Err(CommandError::DefaultSession)
        );
        assert_eq!(
            Command::Switch {
                name: "nowhere".to_string()
            }
            .execute(&engine)
            .await,
            Err(CommandError::NoSession("nowhere".to_string()))
        );
    }

    #[tokio::test]
    async fn test_catcher_consumes_commands() {
        let (engine, frontend) = engine();
        assert!(CommandCatcher::install(&engine));
        let default = engine.default_session().unwrap();

        let _ = default.send("/quit").await;
        timeout(Duration::from_secs(5), engine.signal().triggered())
            .await
            .unwrap();

        let display = frontend.display(DEFAULT_SESSION).unwrap();
        timeout(Duration::from_secs(5), async {
            while !display.lines().contains(&"Goodbye".to_string()) {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert!(!display
            .lines()
            .contains(&"output ignored, not connected".to_string()));
    }

    #[tokio::test]
    async fn test_catcher_reports_bad_commands() {
        let (engine, frontend) = engine();
        CommandCatcher::install(&engine);
        let default = engine.default_session().unwrap();
        let display = frontend.display(DEFAULT_SESSION).unwrap();

        let _ = default.send("/bogus").await;
        assert_eq!(display.lines(), vec!["Unknown command '/bogus'"]);
    }
}
