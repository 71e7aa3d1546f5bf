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

//! Display surfaces
//!
//! The engine never renders anything itself. Each session writes to a
//! [`Display`] and the UI binding hands those out through a [`Frontend`].
//! [`MemoryDisplay`] and [`MemoryFrontend`] keep everything in memory, for
//! headless use and tests.

use crate::negotiation::EchoState;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Per-session output surface
pub trait Display: Send + Sync {
    /// Show a complete line
    fn write(&self, text: &str);

    /// Show an incomplete line, typically a prompt.
    ///
    /// The text is provisional: a later `prompt` or `write` from the same
    /// session may repeat it with more text appended once the rest of the
    /// line arrives.
    fn prompt(&self, text: &str);

    /// The remote side switched echo handling
    fn set_echo(&self, state: EchoState);

    /// The session owning this display is gone
    fn close(&self);
}

/// UI binding that owns the displays
pub trait Frontend: Send + Sync {
    /// Create the display for a new session
    fn open_display(&self, name: &str) -> Arc<dyn Display>;

    /// The active session changed
    fn change_active(&self, session_name: &str, display: &Arc<dyn Display>);
}

/// Something shown on a [`MemoryDisplay`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEvent {
    Line(String),
    Prompt(String),
    Echo(EchoState),
    Closed,
}

/// Display that records what it is shown
#[derive(Debug, Default)]
pub struct MemoryDisplay {
    events: Mutex<Vec<DisplayEvent>>,
}

impl MemoryDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything shown so far
    pub fn events(&self) -> Vec<DisplayEvent> {
        self.lock().clone()
    }

    /// Complete lines shown so far
    pub fn lines(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                DisplayEvent::Line(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    /// Check whether the display was closed
    pub fn is_closed(&self) -> bool {
        self.lock().contains(&DisplayEvent::Closed)
    }

    fn push(&self, event: DisplayEvent) {
        self.lock().push(event);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DisplayEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Display for MemoryDisplay {
    fn write(&self, text: &str) {
        self.push(DisplayEvent::Line(text.to_string()));
    }

    fn prompt(&self, text: &str) {
        self.push(DisplayEvent::Prompt(text.to_string()));
    }

    fn set_echo(&self, state: EchoState) {
        self.push(DisplayEvent::Echo(state));
    }

    fn close(&self) {
        self.push(DisplayEvent::Closed);
    }
}

/// Frontend handing out [`MemoryDisplay`]s
#[derive(Default)]
pub struct MemoryFrontend {
    displays: Mutex<HashMap<String, Arc<MemoryDisplay>>>,
    activations: Mutex<Vec<String>>,
}

impl MemoryFrontend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the display opened for `name`
    pub fn display(&self, name: &str) -> Option<Arc<MemoryDisplay>> {
        self.displays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Session names in the order they became active
    pub fn activations(&self) -> Vec<String> {
        self.activations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Frontend for MemoryFrontend {
    fn open_display(&self, name: &str) -> Arc<dyn Display> {
        let display = Arc::new(MemoryDisplay::new());
        self.displays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), display.clone());
        display
    }

    fn change_active(&self, session_name: &str, _display: &Arc<dyn Display>) {
        self.activations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(session_name.to_string());
    }
}

impl fmt::Debug for MemoryFrontend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryFrontend")
            .field("activations", &self.activations())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_display_records_events() {
        let display = MemoryDisplay::new();
        display.write("Welcome");
        display.prompt("Name: ");
        display.set_echo(EchoState::Server);
        display.close();

        assert_eq!(
            display.events(),
            vec![
                DisplayEvent::Line("Welcome".to_string()),
                DisplayEvent::Prompt("Name: ".to_string()),
                DisplayEvent::Echo(EchoState::Server),
                DisplayEvent::Closed,
            ]
        );
        assert_eq!(display.lines(), vec!["Welcome"]);
        assert!(display.is_closed());
    }

    #[test]
    fn test_memory_frontend_tracks_displays() {
        let frontend = MemoryFrontend::new();
        let display = frontend.open_display("aardwolf");
        display.write("hello");
        frontend.change_active("aardwolf", &display);

        let recorded = frontend.display("aardwolf").unwrap();
        assert_eq!(recorded.lines(), vec!["hello"]);
        assert_eq!(frontend.activations(), vec!["aardwolf"]);
        assert!(frontend.display("missing").is_none());
    }
}
