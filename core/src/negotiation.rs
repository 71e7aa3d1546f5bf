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

//! Telnet option negotiation
//!
//! Each supported option is handled by a [`Negotiator`]. A connection offers
//! every decoded control event to all of its negotiators, which read and update
//! the shared [`NegotiationContext`] and queue replies. Supporting another
//! option means adding another negotiator; the dispatch loop stays the same.
//!
//! Two negotiators ship with the client:
//!
//! - [`EchoNegotiator`] tracks whether the server echoes typed input.
//! - [`CompressionNegotiator`] runs the MCCP v2 handshake.

use crate::telnet::{TelnetCommand, TelnetEvent, TelnetOption, build_negotiation};
use thiserror::Error;

/// Who is responsible for echoing typed input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EchoState {
    /// The client echoes locally
    #[default]
    Client,

    /// The server echoes, so the client stays quiet (password prompts)
    Server,
}

/// Progress of the MCCP v2 handshake.
///
/// Phases are ordered. Within one handshake the phase only moves forward;
/// the single way back is the end of the compressed stream, which resets it
/// to [`CompressionPhase::Inactive`] so the server can offer compression again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum CompressionPhase {
    /// No compression negotiated
    #[default]
    Inactive,

    /// Server sent `WILL COMPRESS2`, replies are queued
    Offered,

    /// Our `DO COMPRESS2` went out
    OptionConfirmed,

    /// Server began a subnegotiation
    StreamDetected,

    /// Inbound bytes are compressed
    Active,
}

/// Malformed or unexpected negotiation input.
///
/// Violations are logged and otherwise ignored; they never close a connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Protocol violation on option {option}: {reason}")]
pub struct ProtocolViolation {
    /// Option byte the violation concerns
    pub option: u8,

    /// What was wrong
    pub reason: String,
}

impl ProtocolViolation {
    /// Create a new violation
    pub fn new(option: u8, reason: impl Into<String>) -> Self {
        Self {
            option,
            reason: reason.into(),
        }
    }
}

/// Negotiation state shared by the negotiators of one connection
#[derive(Debug, Default)]
pub struct NegotiationContext {
    echo: EchoState,
    compression: CompressionPhase,
    replies: Vec<u8>,
    start_compression: bool,
}

impl NegotiationContext {
    /// Create a context with echo on the client and compression inactive
    pub fn new() -> Self {
        Self::default()
    }

    /// Current echo state
    pub fn echo(&self) -> EchoState {
        self.echo
    }

    /// Set the echo state; returns true if it changed
    pub fn set_echo(&mut self, echo: EchoState) -> bool {
        let changed = self.echo != echo;
        self.echo = echo;
        changed
    }

    /// Current compression phase
    pub fn compression(&self) -> CompressionPhase {
        self.compression
    }

    /// Move the compression handshake to `phase`.
    ///
    /// Returns false and leaves the phase alone when `phase` is not ahead of
    /// the current one.
    pub fn advance_compression(&mut self, phase: CompressionPhase) -> bool {
        if phase <= self.compression {
            return false;
        }
        tracing::debug!("Compression phase {:?} -> {:?}", self.compression, phase);
        self.compression = phase;
        if phase == CompressionPhase::Active {
            self.start_compression = true;
        }
        true
    }

    /// Queue an `IAC <command> <option>` reply
    pub fn reply(&mut self, command: TelnetCommand, option: u8) {
        self.replies
            .extend_from_slice(&build_negotiation(command, option));
    }

    /// Check whether replies are waiting to be written
    pub fn has_replies(&self) -> bool {
        !self.replies.is_empty()
    }

    /// Take the queued replies
    pub fn take_replies(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.replies)
    }

    /// Take the request to install the decompressor, if one was made
    pub(crate) fn take_compression_start(&mut self) -> bool {
        std::mem::take(&mut self.start_compression)
    }

    /// The compressed stream ended; a new handshake may follow
    pub(crate) fn end_compression(&mut self) {
        tracing::debug!("Compression stream ended, phase reset");
        self.compression = CompressionPhase::Inactive;
        self.start_compression = false;
    }
}

/// Handler for one or more Telnet options.
pub trait Negotiator: Send {
    /// Name used in log output
    fn name(&self) -> &'static str;

    /// Handle a control event.
    ///
    /// Returns `Ok(true)` if the event concerned this negotiator.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolViolation`] for input this negotiator recognizes but
    /// cannot accept. The state must be left unchanged in that case.
    fn handle(
        &mut self,
        event: &TelnetEvent,
        context: &mut NegotiationContext,
    ) -> Result<bool, ProtocolViolation>;

    /// Called after queued replies reached the transport
    fn replies_sent(&mut self, _context: &mut NegotiationContext) {}
}

/// The negotiators every connection starts with
pub fn default_negotiators() -> Vec<Box<dyn Negotiator>> {
    vec![
        Box::new(EchoNegotiator) as Box<dyn Negotiator>,
        Box::new(CompressionNegotiator),
    ]
}

/// Tracks the ECHO option
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoNegotiator;

impl Negotiator for EchoNegotiator {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn handle(
        &mut self,
        event: &TelnetEvent,
        context: &mut NegotiationContext,
    ) -> Result<bool, ProtocolViolation> {
        let echo = TelnetOption::Echo.to_byte();
        match *event {
            TelnetEvent::Negotiate {
                command: TelnetCommand::WILL,
                option,
            } if option == echo => {
                context.set_echo(EchoState::Server);
                context.reply(TelnetCommand::DO, echo);
                Ok(true)
            }
            TelnetEvent::Negotiate {
                command: TelnetCommand::WONT,
                option,
            } if option == echo => {
                context.set_echo(EchoState::Client);
                context.reply(TelnetCommand::DONT, echo);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Runs the MCCP v2 handshake
#[derive(Debug, Default, Clone, Copy)]
pub struct CompressionNegotiator;

impl Negotiator for CompressionNegotiator {
    fn name(&self) -> &'static str {
        "compression"
    }

    fn handle(
        &mut self,
        event: &TelnetEvent,
        context: &mut NegotiationContext,
    ) -> Result<bool, ProtocolViolation> {
        let compress = TelnetOption::Compress.to_byte();
        let compress2 = TelnetOption::Compress2.to_byte();

        match event {
            TelnetEvent::Negotiate {
                command: TelnetCommand::WILL,
                option,
            } if *option == compress2 => {
                if context.advance_compression(CompressionPhase::Offered) {
                    context.reply(TelnetCommand::DO, compress2);
                    context.reply(TelnetCommand::DONT, compress);
                } else {
                    tracing::debug!("Repeated compression offer ignored");
                }
                Ok(true)
            }
            TelnetEvent::Negotiate {
                command: TelnetCommand::WILL,
                option,
            } if *option == compress => {
                context.reply(TelnetCommand::DONT, compress);
                Ok(true)
            }
            TelnetEvent::SubnegotiationBegin { .. }
                if context.compression() == CompressionPhase::OptionConfirmed =>
            {
                context.advance_compression(CompressionPhase::StreamDetected);
                Ok(false)
            }
            TelnetEvent::SubnegotiationEnd { option, data }
                if context.compression() == CompressionPhase::StreamDetected =>
            {
                if *option == compress2 && data.is_empty() {
                    context.advance_compression(CompressionPhase::Active);
                    Ok(true)
                } else {
                    Err(ProtocolViolation::new(
                        *option,
                        format!(
                            "expected compression start, got {} payload bytes",
                            data.len()
                        ),
                    ))
                }
            }
            TelnetEvent::SubnegotiationEnd { option, .. } if *option == compress2 => Err(
                ProtocolViolation::new(*option, "compression start before negotiation"),
            ),
            _ => Ok(false),
        }
    }

    fn replies_sent(&mut self, context: &mut NegotiationContext) {
        if context.compression() == CompressionPhase::Offered {
            context.advance_compression(CompressionPhase::OptionConfirmed);
        }
    }
}
