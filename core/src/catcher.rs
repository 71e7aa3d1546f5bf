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

//! Catcher pipelines
//!
//! A catcher intercepts lines travelling in one direction: text arriving from
//! the remote service, text being sent to it, or the raw incomplete tail of the
//! inbound stream. Catchers run in order. A [`CatchMode::Listen`] catcher only
//! observes; a [`CatchMode::Muffle`] catcher may replace the value or suppress
//! it, which ends the pass.
//!
//! Aliases, triggers, loggers and similar features are all built as catchers.
//! Catchers may be added and removed from any thread at any time, including
//! from inside a running catcher. Each [`CatcherPipeline::apply`] works on a
//! snapshot, so changes only take effect on the next pass.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Direction a pipeline handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Lines received from the remote service
    Input,

    /// Text typed by the user, bound for the remote service
    Output,

    /// The incomplete inbound tail, such as a prompt
    Raw,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
            Direction::Raw => write!(f, "raw"),
        }
    }
}

/// What a catcher is allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatchMode {
    /// Receives a copy; cannot alter propagation
    Listen,

    /// May replace or suppress the value
    Muffle,
}

/// Catcher verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Catch {
    /// Pass the value on unchanged
    Pass,

    /// Continue with a replacement value
    Replace(String),

    /// Stop the pass; later catchers do not see the value
    Suppress,
}

/// Failure inside a catcher
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CatcherError(pub String);

impl CatcherError {
    /// Create a new catcher error
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A catcher failure, tagged with where it happened
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Catcher '{catcher}' failed in {direction} pipeline: {source}")]
pub struct PipelineError {
    /// Name of the failing catcher
    pub catcher: String,

    /// Pipeline direction
    pub direction: Direction,

    /// The catcher's own error
    #[source]
    pub source: CatcherError,
}

/// An interceptor stage
pub trait Catcher: Send + Sync {
    /// Name used in logs and failure reports
    fn name(&self) -> &str {
        "catcher"
    }

    /// Capability of this catcher
    fn mode(&self) -> CatchMode;

    /// Remove the catcher after its first invocation
    fn is_one_shot(&self) -> bool {
        false
    }

    /// Inspect a value.
    ///
    /// # Errors
    ///
    /// A failing catcher is skipped for the rest of the pass; the failure is
    /// reported to the pipeline's caller.
    fn catch(&self, value: &str) -> Result<Catch, CatcherError>;

    /// Called once when the catcher leaves its pipeline
    fn finished(&self) {}
}

/// Outcome of [`CatcherPipeline::apply`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// The surviving value; `None` if suppressed
    pub value: Option<String>,

    /// Catchers that failed during the pass
    pub failures: Vec<PipelineError>,
}

impl Applied {
    /// Check whether a catcher suppressed the value
    pub fn is_suppressed(&self) -> bool {
        self.value.is_none()
    }
}

struct Entry {
    catcher: Arc<dyn Catcher>,

    /// Cleared when a one-shot catcher is claimed
    active: AtomicBool,
}

/// Ordered, mutable list of catchers for one direction
pub struct CatcherPipeline {
    direction: Direction,
    entries: Mutex<Vec<Arc<Entry>>>,
}

impl CatcherPipeline {
    /// Create an empty pipeline
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Get the pipeline direction
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Number of registered catchers
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Check whether the pipeline has no catchers
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Check whether `catcher` is registered
    pub fn contains(&self, catcher: &Arc<dyn Catcher>) -> bool {
        self.entries()
            .iter()
            .any(|entry| same_catcher(&entry.catcher, catcher))
    }

    /// Register a catcher at the end, or at the front when `priority` is set.
    ///
    /// Returns false if the catcher is already registered.
    pub fn add(&self, catcher: Arc<dyn Catcher>, priority: bool) -> bool {
        let mut entries = self.entries();
        if entries
            .iter()
            .any(|entry| same_catcher(&entry.catcher, &catcher))
        {
            tracing::debug!(
                "Catcher '{}' already in {} pipeline",
                catcher.name(),
                self.direction
            );
            return false;
        }

        tracing::trace!("Adding catcher '{}' to {} pipeline", catcher.name(), self.direction);
        let entry = Arc::new(Entry {
            catcher,
            active: AtomicBool::new(true),
        });
        if priority {
            entries.insert(0, entry);
        } else {
            entries.push(entry);
        }
        true
    }

    /// Remove a catcher. Removing an absent catcher does nothing.
    ///
    /// Returns true if the catcher was registered.
    pub fn remove(&self, catcher: &Arc<dyn Catcher>) -> bool {
        let removed = {
            let mut entries = self.entries();
            entries
                .iter()
                .position(|entry| same_catcher(&entry.catcher, catcher))
                .map(|index| entries.remove(index))
        };

        match removed {
            Some(entry) => {
                entry.catcher.finished();
                true
            }
            None => false,
        }
    }

    /// Remove every catcher
    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.entries());
        for entry in removed {
            entry.catcher.finished();
        }
    }

    /// Run `value` through the catchers registered when the pass starts
    pub fn apply(&self, value: impl Into<String>) -> Applied {
        let snapshot: Vec<Arc<Entry>> = self.entries().clone();
        let mut value = value.into();
        let mut failures = Vec::new();

        for entry in snapshot {
            let catcher = &entry.catcher;
            let one_shot = catcher.is_one_shot();

            if one_shot {
                // Claim it so concurrent passes invoke it at most once
                if !entry.active.swap(false, Ordering::SeqCst) {
                    continue;
                }
            } else if !entry.active.load(Ordering::SeqCst) {
                continue;
            }

            let result = catcher.catch(&value);

            if one_shot {
                self.retire(&entry);
            }

            match result {
                Ok(Catch::Pass) => {}
                Ok(verdict) if catcher.mode() == CatchMode::Listen => {
                    tracing::warn!(
                        "Listening catcher '{}' returned {:?} in {} pipeline; ignored",
                        catcher.name(),
                        verdict,
                        self.direction
                    );
                }
                Ok(Catch::Replace(replacement)) => value = replacement,
                Ok(Catch::Suppress) => {
                    tracing::trace!(
                        "Catcher '{}' suppressed value in {} pipeline",
                        catcher.name(),
                        self.direction
                    );
                    return Applied {
                        value: None,
                        failures,
                    };
                }
                Err(source) => {
                    let failure = PipelineError {
                        catcher: catcher.name().to_string(),
                        direction: self.direction,
                        source,
                    };
                    tracing::warn!("{}", failure);
                    failures.push(failure);
                }
            }
        }

        Applied {
            value: Some(value),
            failures,
        }
    }

    /// Drop a spent one-shot entry
    fn retire(&self, entry: &Arc<Entry>) {
        let removed = {
            let mut entries = self.entries();
            let before = entries.len();
            entries.retain(|candidate| !Arc::ptr_eq(candidate, entry));
            entries.len() != before
        };
        if removed {
            entry.catcher.finished();
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Arc<Entry>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CatcherPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .entries()
            .iter()
            .map(|entry| entry.catcher.name().to_string())
            .collect();
        f.debug_struct("CatcherPipeline")
            .field("direction", &self.direction)
            .field("catchers", &names)
            .finish()
    }
}

fn same_catcher(a: &Arc<dyn Catcher>, b: &Arc<dyn Catcher>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

type Handler = Box<dyn Fn(&str) -> Result<Catch, CatcherError> + Send + Sync>;
type FinishHook = Box<dyn FnOnce() + Send>;

/// Catcher backed by a closure
pub struct FnCatcher {
    name: String,
    mode: CatchMode,
    one_shot: bool,
    handler: Handler,
    on_finish: Mutex<Option<FinishHook>>,
}

impl FnCatcher {
    /// Create a catcher from a fallible closure
    pub fn new<F>(name: impl Into<String>, mode: CatchMode, handler: F) -> Self
    where
        F: Fn(&str) -> Result<Catch, CatcherError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            mode,
            one_shot: false,
            handler: Box::new(handler),
            on_finish: Mutex::new(None),
        }
    }

    /// Create an observing catcher
    pub fn listen<F>(name: impl Into<String>, observer: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self::new(name, CatchMode::Listen, move |value| {
            observer(value);
            Ok(Catch::Pass)
        })
    }

    /// Create a catcher that may replace or suppress values
    pub fn muffle<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&str) -> Catch + Send + Sync + 'static,
    {
        Self::new(name, CatchMode::Muffle, move |value| Ok(handler(value)))
    }

    /// Make the catcher remove itself after one invocation
    #[must_use]
    pub fn once(mut self) -> Self {
        self.one_shot = true;
        self
    }

    /// Run `hook` when the catcher leaves its pipeline
    #[must_use]
    pub fn on_finish<F>(self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        *self.on_finish.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
        self
    }
}

impl Catcher for FnCatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> CatchMode {
        self.mode
    }

    fn is_one_shot(&self) -> bool {
        self.one_shot
    }

    fn catch(&self, value: &str) -> Result<Catch, CatcherError> {
        (self.handler)(value)
    }

    fn finished(&self) {
        let hook = self
            .on_finish
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl fmt::Debug for FnCatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCatcher")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("one_shot", &self.one_shot)
            .finish_non_exhaustive()
    }
}
