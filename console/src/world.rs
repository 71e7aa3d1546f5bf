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

//! Profiles for configured worlds

use crate::config::{Configuration, WorldConfig};
use async_trait::async_trait;
use mudlink_core::{Profile, ProfileRegistry, Session, Written};
use std::sync::Arc;

/// A world from the configuration file
#[derive(Debug, Clone)]
pub struct WorldProfile {
    name: String,
    host: String,
    port: u16,
    send_on_connect: Vec<String>,
}

impl WorldProfile {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            send_on_connect: Vec::new(),
        }
    }

    /// Add a line to send once connected
    #[must_use]
    pub fn send_on_connect(mut self, line: impl Into<String>) -> Self {
        self.send_on_connect.push(line.into());
        self
    }

    /// Lines sent once connected
    pub fn login(&self) -> &[String] {
        &self.send_on_connect
    }
}

impl From<&WorldConfig> for WorldProfile {
    fn from(config: &WorldConfig) -> Self {
        Self {
            name: config.name.to_string(),
            host: config.host.to_string(),
            port: *config.port,
            send_on_connect: config
                .send_on_connect
                .iter()
                .map(|line| line.to_string())
                .collect(),
        }
    }
}

#[async_trait]
impl Profile for WorldProfile {
    fn name(&self) -> &str {
        &self.name
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }

    async fn setup(&self, session: &Session) {
        for line in &self.send_on_connect {
            if session.send(line).await == Written::NotSent {
                tracing::warn!("World '{}': login line not sent", self.name);
                break;
            }
        }
    }
}

/// Build a registry holding every configured world
pub fn registry(config: &Configuration) -> ProfileRegistry {
    let mut registry = ProfileRegistry::new();
    for world in &config.worlds {
        if registry
            .register(Arc::new(WorldProfile::from(world)))
            .is_some()
        {
            tracing::warn!("World '{}' is configured more than once", world.name.as_str());
        }
    }
    registry
}
