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

//! Cooperative shutdown signalling
//!
//! A [`ShutdownSignal`] is a one-way flag. Owners register dependent signals or
//! callbacks with it; triggering cascades to each of them exactly once. Async
//! waiters observe it through [`ShutdownSignal::triggered`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// Something to trigger when a signal fires
enum Dependent {
    /// Another signal, triggered in turn
    Signal(Arc<ShutdownSignal>),

    /// A callback run once
    Callback(Box<dyn FnOnce() + Send>),
}

impl Dependent {
    fn fire(self) {
        match self {
            Dependent::Signal(signal) => {
                signal.trigger();
            }
            Dependent::Callback(callback) => callback(),
        }
    }
}

/// Thread-safe, monotonic cancellation flag
pub struct ShutdownSignal {
    /// Name used in log output
    name: String,

    /// Set once, never cleared
    triggered: AtomicBool,

    /// Wakes async waiters
    token: CancellationToken,

    /// Dependents fired on trigger
    dependents: Mutex<Vec<Dependent>>,
}

impl ShutdownSignal {
    /// Create a new, untriggered signal
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            triggered: AtomicBool::new(false),
            token: CancellationToken::new(),
            dependents: Mutex::new(Vec::new()),
        }
    }

    /// Get the signal name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check whether the signal has fired
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Fire the signal and cascade to every dependent.
    ///
    /// Returns `false` if the signal had already fired, in which case nothing
    /// happens.
    pub fn trigger(&self) -> bool {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return false;
        }

        tracing::debug!("Shutdown signal '{}' triggered", self.name);
        self.token.cancel();

        let dependents = std::mem::take(
            &mut *self
                .dependents
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for dependent in dependents {
            dependent.fire();
        }

        true
    }

    /// Register a dependent signal.
    ///
    /// If this signal already fired, the dependent is triggered immediately.
    pub fn register(&self, signal: Arc<ShutdownSignal>) {
        self.push(Dependent::Signal(signal));
    }

    /// Register a callback to run once when the signal fires
    pub fn on_trigger<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.push(Dependent::Callback(Box::new(callback)));
    }

    /// Remove a previously registered dependent signal
    pub fn unregister(&self, signal: &Arc<ShutdownSignal>) {
        self.dependents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|dependent| match dependent {
                Dependent::Signal(registered) => !Arc::ptr_eq(registered, signal),
                Dependent::Callback(_) => true,
            });
    }

    /// Wait until the signal fires
    pub async fn triggered(&self) {
        self.token.cancelled().await;
    }

    /// Get a cancellation token that is cancelled when the signal fires
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    fn push(&self, dependent: Dependent) {
        {
            let mut dependents = self
                .dependents
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !self.is_triggered() {
                dependents.push(dependent);
                return;
            }
        }
        dependent.fire();
    }
}

impl fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownSignal")
            .field("name", &self.name)
            .field("triggered", &self.is_triggered())
            .finish()
    }
}
