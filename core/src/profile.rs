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

//! Connection profiles
//!
//! A profile names a world and prepares a freshly connected session for it:
//! installing catchers, sending a login, and so on. Profiles are registered
//! on a [`ProfileRegistry`] at startup and handed to the engine.

use crate::session::Session;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Connection recipe for a world
#[async_trait]
pub trait Profile: Send + Sync {
    /// Profile name; also the name of the session it creates
    fn name(&self) -> &str;

    /// Remote host
    fn host(&self) -> &str;

    /// Remote port
    fn port(&self) -> u16;

    /// Prepare a connected session
    async fn setup(&self, _session: &Session) {}
}

/// Profiles by name
#[derive(Default, Clone)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, Arc<dyn Profile>>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a profile, returning the one it replaces
    pub fn register(&mut self, profile: Arc<dyn Profile>) -> Option<Arc<dyn Profile>> {
        tracing::debug!("Registering profile '{}'", profile.name());
        self.profiles.insert(profile.name().to_string(), profile)
    }

    /// Look up a profile
    pub fn get(&self, name: &str) -> Option<Arc<dyn Profile>> {
        self.profiles.get(name).cloned()
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl fmt::Debug for ProfileRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileRegistry")
            .field("profiles", &self.names())
            .finish()
    }
}
