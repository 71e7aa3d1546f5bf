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
use mudlink_console::commands::CommandCatcher;
use mudlink_console::config::{Arguments, Configuration};
use mudlink_console::console::{ConsoleFrontend, handle_line};
use mudlink_console::world;
use mudlink_core::Engine;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Load arguments from the command line
    let arguments: Arguments = Parser::parse();

    // Initialize tracing/logging; stdout belongs to the sessions
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .init();

    // Load environment variables from .env file if specified
    if let Some(ref env_file) = arguments.env_file {
        if std::path::Path::new(env_file).exists() {
            tracing::debug!("Loading environment variables from file: {}", env_file);
            dotenv::from_filename(env_file).ok();
        }
    } else {
        tracing::debug!("Loading environment variables from default file");
        dotenv::dotenv().ok();
    }

    // Load configuration from a file with environment variable substitution
    let config = match Configuration::load_or_default(&arguments.config_file) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration load error: {}", err);
            return ExitCode::FAILURE;
        }
    };

    debug!("Configuration loaded: {:?}", config);
    info!("Starting Mudlink...");

    let engine = Arc::new(Engine::new(
        Arc::new(ConsoleFrontend::stdout()),
        config.connection.to_options(),
        world::registry(&config),
    ));
    if !CommandCatcher::install(&engine) {
        eprintln!("Unable to initialize the default session");
        return ExitCode::FAILURE;
    }

    for world in &arguments.connect {
        let _ = handle_line(&engine, &format!("/connect {}", world)).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = engine.signal().triggered() => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let _ = handle_line(&engine, line.trim_end()).await;
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Failed to read input: {}", e);
                    break;
                }
            },
        }
    }

    engine.shutdown().await;
    info!("Mudlink stopped");
    ExitCode::SUCCESS
}
