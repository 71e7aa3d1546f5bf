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

//! Telnet protocol constants and stream parsing
//!
//! This module defines telnet protocol commands and options, the IAC escaping
//! rule for outbound data, and [`TelnetParser`], a byte-level state machine that
//! separates in-band control sequences from data. The parser keeps its state
//! between calls, so sequences split across reads decode correctly.

use std::borrow::Cow;

/// Telnet command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TelnetCommand {
    /// Interpret As Command
    IAC = 255,
    /// Don't do option
    DONT = 254,
    /// Do option
    DO = 253,
    /// Won't do option
    WONT = 252,
    /// Will do option
    WILL = 251,
    /// Subnegotiation begin
    SB = 250,
    /// Go ahead
    GA = 249,
    /// Erase line
    EL = 248,
    /// Erase character
    EC = 247,
    /// Are you there
    AYT = 246,
    /// Abort output
    AO = 245,
    /// Interrupt process
    IP = 244,
    /// Break
    BRK = 243,
    /// Data mark
    DM = 242,
    /// No operation
    NOP = 241,
    /// Subnegotiation end
    SE = 240,
    /// End of record
    EOR = 239,
}

impl TelnetCommand {
    /// Convert byte to telnet command
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            255 => Some(Self::IAC),
            254 => Some(Self::DONT),
            253 => Some(Self::DO),
            252 => Some(Self::WONT),
            251 => Some(Self::WILL),
            250 => Some(Self::SB),
            249 => Some(Self::GA),
            248 => Some(Self::EL),
            247 => Some(Self::EC),
            246 => Some(Self::AYT),
            245 => Some(Self::AO),
            244 => Some(Self::IP),
            243 => Some(Self::BRK),
            242 => Some(Self::DM),
            241 => Some(Self::NOP),
            240 => Some(Self::SE),
            239 => Some(Self::EOR),
            _ => None,
        }
    }

    /// Convert command to byte
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Check whether the command takes an option byte
    pub fn is_negotiation(self) -> bool {
        matches!(self, Self::WILL | Self::WONT | Self::DO | Self::DONT)
    }
}

/// Telnet option codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TelnetOption {
    /// Binary transmission
    Binary = 0,
    /// Echo
    Echo = 1,
    /// Suppress go ahead
    SuppressGoAhead = 3,
    /// Terminal type
    TerminalType = 24,
    /// End of record
    EndOfRecord = 25,
    /// Negotiate about window size (NAWS)
    NAWS = 31,
    /// Linemode
    Linemode = 34,
    /// MSDP (MUD Server Data Protocol)
    MSDP = 69,
    /// MCCP1, the legacy compression option
    Compress = 85,
    /// MCCP2 (MUD Client Compression Protocol v2)
    Compress2 = 86,
    /// GMCP (Generic MUD Communication Protocol)
    GMCP = 201,
}

impl TelnetOption {
    /// Convert byte to telnet option
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Binary),
            1 => Some(Self::Echo),
            3 => Some(Self::SuppressGoAhead),
            24 => Some(Self::TerminalType),
            25 => Some(Self::EndOfRecord),
            31 => Some(Self::NAWS),
            34 => Some(Self::Linemode),
            69 => Some(Self::MSDP),
            85 => Some(Self::Compress),
            86 => Some(Self::Compress2),
            201 => Some(Self::GMCP),
            _ => None,
        }
    }

    /// Convert option to byte
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Build a telnet negotiation sequence
pub fn build_negotiation(command: TelnetCommand, option: u8) -> [u8; 3] {
    [TelnetCommand::IAC.to_byte(), command.to_byte(), option]
}

/// Build a telnet subnegotiation sequence
pub fn build_subnegotiation(option: u8, data: &[u8]) -> Vec<u8> {
    let mut result = vec![
        TelnetCommand::IAC.to_byte(),
        TelnetCommand::SB.to_byte(),
        option,
    ];
    result.extend_from_slice(&escape_iac(data));
    result.push(TelnetCommand::IAC.to_byte());
    result.push(TelnetCommand::SE.to_byte());
    result
}

/// Double every IAC byte so the peer reads it as data.
///
/// Borrows the input unchanged when it holds no IAC.
pub fn escape_iac(data: &[u8]) -> Cow<'_, [u8]> {
    let iac = TelnetCommand::IAC.to_byte();
    if !data.contains(&iac) {
        return Cow::Borrowed(data);
    }

    let mut escaped = Vec::with_capacity(data.len() + 8);
    for &byte in data {
        escaped.push(byte);
        if byte == iac {
            escaped.push(byte);
        }
    }
    Cow::Owned(escaped)
}

/// Decoded element of the inbound stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelnetEvent {
    /// Plain data with IAC escapes resolved
    Data(Vec<u8>),

    /// Two byte command such as GA or NOP
    Command(TelnetCommand),

    /// WILL/WONT/DO/DONT with its option byte
    Negotiate { command: TelnetCommand, option: u8 },

    /// `IAC SB <option>` seen, payload follows
    SubnegotiationBegin { option: u8 },

    /// `IAC SE` closing a subnegotiation
    SubnegotiationEnd { option: u8, data: Vec<u8> },
}

/// Result of one [`TelnetParser::feed`] call
#[derive(Debug, Default)]
pub struct Parsed {
    /// Number of input bytes consumed
    pub consumed: usize,

    /// Events decoded from the consumed bytes
    pub events: Vec<TelnetEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Data,
    Iac,
    Negotiate(TelnetCommand),
    SbOption,
    SbData,
    SbIac,
}

/// Byte-stream Telnet parser
#[derive(Debug)]
pub struct TelnetParser {
    state: State,
    data: Vec<u8>,
    sb_option: u8,
    sb_data: Vec<u8>,
}

impl Default for TelnetParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TelnetParser {
    /// Create a parser in the data state
    pub fn new() -> Self {
        Self {
            state: State::Data,
            data: Vec::new(),
            sb_option: 0,
            sb_data: Vec::new(),
        }
    }

    /// Check whether the parser is inside a control sequence
    pub fn in_sequence(&self) -> bool {
        self.state != State::Data
    }

    /// Decode bytes until the input runs out or a subnegotiation ends.
    ///
    /// Stopping after `IAC SE` lets the caller change how the remaining bytes
    /// are interpreted (compression starts right after the MCCP handshake).
    /// Callers loop until everything is consumed.
    pub fn feed(&mut self, bytes: &[u8]) -> Parsed {
        let mut events = Vec::new();
        let mut consumed = 0;

        for &byte in bytes {
            consumed += 1;
            if self.step(byte, &mut events) {
                break;
            }
        }

        self.flush_data(&mut events);
        Parsed { consumed, events }
    }

    fn flush_data(&mut self, events: &mut Vec<TelnetEvent>) {
        if !self.data.is_empty() {
            events.push(TelnetEvent::Data(std::mem::take(&mut self.data)));
        }
    }

    /// Advance by one byte; returns true when a subnegotiation just ended
    fn step(&mut self, byte: u8, events: &mut Vec<TelnetEvent>) -> bool {
        let iac = TelnetCommand::IAC.to_byte();
        match self.state {
            State::Data => {
                if byte == iac {
                    self.state = State::Iac;
                } else {
                    self.data.push(byte);
                }
            }
            State::Iac => {
                self.state = State::Data;
                match TelnetCommand::from_byte(byte) {
                    Some(TelnetCommand::IAC) => self.data.push(iac),
                    Some(TelnetCommand::SB) => self.state = State::SbOption,
                    Some(command) if command.is_negotiation() => {
                        self.state = State::Negotiate(command);
                    }
                    Some(command) => {
                        self.flush_data(events);
                        events.push(TelnetEvent::Command(command));
                    }
                    None => tracing::debug!("Ignoring unknown telnet command byte {}", byte),
                }
            }
            State::Negotiate(command) => {
                self.flush_data(events);
                events.push(TelnetEvent::Negotiate {
                    command,
                    option: byte,
                });
                self.state = State::Data;
            }
            State::SbOption => {
                self.flush_data(events);
                self.sb_option = byte;
                self.sb_data.clear();
                events.push(TelnetEvent::SubnegotiationBegin { option: byte });
                self.state = State::SbData;
            }
            State::SbData => {
                if byte == iac {
                    self.state = State::SbIac;
                } else {
                    self.sb_data.push(byte);
                }
            }
            State::SbIac => {
                if byte == TelnetCommand::SE.to_byte() {
                    events.push(TelnetEvent::SubnegotiationEnd {
                        option: self.sb_option,
                        data: std::mem::take(&mut self.sb_data),
                    });
                    self.state = State::Data;
                    return true;
                } else if byte == iac {
                    self.sb_data.push(iac);
                    self.state = State::SbData;
                } else {
                    tracing::warn!(
                        "Malformed subnegotiation for option {}: IAC {} inside payload",
                        self.sb_option,
                        byte
                    );
                    self.sb_data.clear();
                    self.state = State::Data;
                }
            }
        }
        false
    }
}
