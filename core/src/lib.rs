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

//! Mudlink Core Library
//!
//! This library provides the protocol and session engine of the Mudlink client:
//! Telnet option negotiation with MCCP decompression, line reassembly, catcher
//! pipelines, and the multi-session engine that routes input and coordinates
//! shutdown.

pub mod buffer;
pub mod catcher;
pub mod connection;
pub mod display;
pub mod engine;
pub mod negotiation;
pub mod profile;
pub mod session;
pub mod shutdown;
pub mod telnet;

// Re-export commonly used types
pub use buffer::LineBuffer;
pub use catcher::{
    Applied, Catch, CatchMode, Catcher, CatcherError, CatcherPipeline, Direction, FnCatcher,
    PipelineError,
};
pub use connection::{
    ConnectionError, ConnectionOptions, ConnectionResult, ProtocolConnection, Written,
};
pub use display::{Display, DisplayEvent, Frontend, MemoryDisplay, MemoryFrontend};
pub use engine::{Engine, EngineError, EngineResult};
pub use negotiation::{CompressionPhase, EchoState, Negotiator, ProtocolViolation};
pub use profile::{Profile, ProfileRegistry};
pub use session::Session;
pub use shutdown::ShutdownSignal;
