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

use clap::Parser;
use mudlink_core::ConnectionOptions;
use serde::{Deserialize, Serialize};
use serde_env_field::EnvField;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Arguments {
    #[arg(
        short = 'c',
        long = "config",
        help = "Path to configuration file",
        default_value = "mudlink.yaml"
    )]
    pub config_file: String,

    #[arg(
        short = 'e',
        long = "env",
        help = "Path to environment file",
        default_value = ".env"
    )]
    pub env_file: Option<String>,

    #[arg(
        long = "connect",
        help = "World to connect to on startup (repeatable)",
        value_name = "WORLD"
    )]
    pub connect: Vec<String>,
}

impl Default for Arguments {
    fn default() -> Self {
        Self {
            config_file: "mudlink.yaml".to_string(),
            env_file: Some(".env".to_string()),
            connect: Vec::new(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to open config file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub worlds: Vec<WorldConfig>,
}

impl Configuration {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        tracing::debug!("Loading configuration from file: {}", path);
        let file = std::fs::File::open(path).map_err(|source| ConfigError::Open {
            path: path.to_string(),
            source,
        })?;

        serde_yaml::from_reader(file).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// Load `path`, falling back to defaults when the file does not exist
    pub fn load_or_default(path: &str) -> Result<Self, ConfigError> {
        if std::path::Path::new(path).exists() {
            Self::load(path)
        } else {
            tracing::info!("No configuration at {}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Find a configured world
    pub fn world(&self, name: &str) -> Option<&WorldConfig> {
        self.worlds.iter().find(|world| world.name.as_str() == name)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Connect timeout in milliseconds (default: 10000)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Read timeout in milliseconds (default: 250)
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,

    /// Read buffer size in bytes (default: 4096)
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_read_timeout() -> u64 {
    250
}

fn default_read_buffer_size() -> usize {
    4096
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

impl ConnectionConfig {
    pub fn to_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            connect_timeout: Duration::from_millis(self.connect_timeout),
            read_timeout: Duration::from_millis(self.read_timeout.max(1)),
            read_buffer_size: self.read_buffer_size.max(1),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorldConfig {
    pub name: EnvField<String>,

    pub host: EnvField<String>,

    pub port: EnvField<u16>,

    /// Lines sent right after connecting, such as a login
    #[serde(default)]
    pub send_on_connect: Vec<EnvField<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_connection_config_default() {
        let options = ConnectionConfig::default().to_options();
        assert_eq!(options.connect_timeout, Duration::from_secs(10));
        assert_eq!(options.read_timeout, Duration::from_millis(250));
        assert_eq!(options.read_buffer_size, 4096);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Configuration::load_or_default("does/not/exist.yaml").unwrap();
        assert!(config.worlds.is_empty());
        assert_eq!(config.connection.read_timeout, 250);
    }

    #[test]
    fn test_missing_file_is_an_error_for_load() {
        assert!(matches!(
            Configuration::load("does/not/exist.yaml"),
            Err(ConfigError::Open { .. })
        ));
    }

    #[test]
    fn test_configuration_from_file() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(
            file,
            r#"
connection:
  connect_timeout: 5000
  read_timeout: 100
worlds:
  - name: aardwolf
    host: aardmud.org
    port: "4000"
    send_on_connect:
      - hero
      - password
  - name: local
    host: localhost
    port: "4001"
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap();
        let config = Configuration::load(path).unwrap();

        assert_eq!(config.connection.connect_timeout, 5000);
        assert_eq!(config.connection.read_timeout, 100);
        assert_eq!(config.connection.read_buffer_size, 4096);
        assert_eq!(config.worlds.len(), 2);

        let world = config.world("aardwolf").unwrap();
        assert_eq!(world.host.as_str(), "aardmud.org");
        assert_eq!(*world.port, 4000);
        let lines: Vec<&str> = world.send_on_connect.iter().map(|l| l.as_str()).collect();
        assert_eq!(lines, vec!["hero", "password"]);
        assert!(config.world("local").unwrap().send_on_connect.is_empty());
        assert!(config.world("missing").is_none());
    }

    #[test]
    fn test_configuration_env_override() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(
            file,
            r#"
worlds:
  - name: secret
    host: "${{MUDLINK_TEST_HOST:-localhost}}"
    port: "${{MUDLINK_TEST_PORT:-4000}}"
    send_on_connect:
      - "${{MUDLINK_TEST_PASSWORD}}"
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap();

        unsafe {
            std::env::set_var("MUDLINK_TEST_HOST", "mud.example.org");
            std::env::set_var("MUDLINK_TEST_PASSWORD", "hunter2");
            std::env::remove_var("MUDLINK_TEST_PORT");
        }

        let config = Configuration::load(path).unwrap();

        unsafe {
            std::env::remove_var("MUDLINK_TEST_HOST");
            std::env::remove_var("MUDLINK_TEST_PASSWORD");
        }

        let world = config.world("secret").unwrap();
        assert_eq!(world.host.as_str(), "mud.example.org");
        assert_eq!(*world.port, 4000);
        assert_eq!(world.send_on_connect[0].as_str(), "hunter2");
    }

    #[test]
    fn test_configuration_parse_error() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(file, "worlds: [unterminated").unwrap();

        let path = file.path().to_str().unwrap();
        assert!(matches!(
            Configuration::load(path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
