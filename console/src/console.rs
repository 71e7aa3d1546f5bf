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

//! Line-oriented console frontend
//!
//! Every session shares one output sink. Lines from the active session are
//! printed as they are; lines from background sessions carry a `[name]`
//! prefix. A prompt stays open on the console until the next output: if
//! that output is the same session completing the prompt, only the missing
//! part is printed, otherwise the prompt is ended with a newline first.

use mudlink_core::engine::DEFAULT_SESSION;
use mudlink_core::{Display, EchoState, Engine, Frontend, Written};
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Shared output sink
pub type Sink = Arc<Mutex<dyn Write + Send>>;

/// Incomplete line left on the console
#[derive(Debug)]
struct OpenPrompt {
    owner: String,
    text: String,
}

type SharedPrompt = Arc<Mutex<Option<OpenPrompt>>>;

/// Display printing to the console sink
pub struct ConsoleDisplay {
    name: String,
    active: Arc<RwLock<String>>,
    prompt: SharedPrompt,
    sink: Sink,
}

impl ConsoleDisplay {
    fn is_active(&self) -> bool {
        *self.active.read().unwrap_or_else(PoisonError::into_inner) == self.name
    }

    fn emit(&self, text: &str, newline: bool) {
        let mut prompt = self.prompt.lock().unwrap_or_else(PoisonError::into_inner);
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);

        let result = match prompt.take() {
            Some(open) if open.owner == self.name && text.starts_with(&open.text) => {
                write!(sink, "{}", &text[open.text.len()..])
            }
            Some(_) => writeln!(sink).and_then(|_| self.print(&mut *sink, text)),
            None => self.print(&mut *sink, text),
        }
        .and_then(|_| if newline { writeln!(sink) } else { Ok(()) })
        .and_then(|_| sink.flush());

        if !newline {
            *prompt = Some(OpenPrompt {
                owner: self.name.clone(),
                text: text.to_string(),
            });
        }

        if let Err(e) = result {
            tracing::error!("Console write failed: {}", e);
        }
    }
}

impl ConsoleDisplay {
    fn print(&self, sink: &mut (dyn Write + Send), text: &str) -> std::io::Result<()> {
        if self.is_active() {
            write!(sink, "{}", text)
        } else {
            write!(sink, "[{}] {}", self.name, text)
        }
    }
}

impl Display for ConsoleDisplay {
    fn write(&self, text: &str) {
        self.emit(text, true);
    }

    fn prompt(&self, text: &str) {
        self.emit(text, false);
    }

    fn set_echo(&self, state: EchoState) {
        tracing::debug!("Session '{}' echo is now {:?}", self.name, state);
        if state == EchoState::Server {
            self.emit("(input is not being echoed)", true);
        }
    }

    fn close(&self) {
        self.emit("session closed", true);
    }
}

/// Frontend printing every session to one sink
pub struct ConsoleFrontend {
    active: Arc<RwLock<String>>,
    prompt: SharedPrompt,
    sink: Sink,
}

impl ConsoleFrontend {
    pub fn new(sink: Sink) -> Self {
        Self {
            active: Arc::new(RwLock::new(DEFAULT_SESSION.to_string())),
            prompt: Arc::new(Mutex::new(None)),
            sink,
        }
    }

    /// Frontend writing to standard output
    pub fn stdout() -> Self {
        Self::new(Arc::new(Mutex::new(std::io::stdout())))
    }

    /// Name of the session currently shown
    pub fn active(&self) -> String {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Frontend for ConsoleFrontend {
    fn open_display(&self, name: &str) -> Arc<dyn Display> {
        Arc::new(ConsoleDisplay {
            name: name.to_string(),
            active: self.active.clone(),
            prompt: self.prompt.clone(),
            sink: self.sink.clone(),
        })
    }

    fn change_active(&self, session_name: &str, display: &Arc<dyn Display>) {
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = session_name.to_string();
        display.write(&format!("-- now talking to {} --", session_name));
    }
}

/// Handle one line typed by the user.
///
/// Commands start with `/` and go to the default session, where the command
/// catcher picks them up. A leading `//` sends the rest of the line, with one
/// slash removed, to the active session. Anything else goes to the active
/// session unchanged.
pub async fn handle_line(engine: &Engine, line: &str) -> Written {
    if let Some(escaped) = line.strip_prefix("//") {
        return engine.route_input(&format!("/{}", escaped)).await;
    }
    if line.starts_with('/') {
        if let Some(default) = engine.default_session() {
            return default.send(line).await;
        }
    }
    engine.route_input(line).await
}
