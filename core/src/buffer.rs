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

//! Line reassembly for the inbound byte stream
//!
//! Remote services deliver text in arbitrary chunks. [`LineBuffer`] joins those
//! chunks, splits them on line terminators, and keeps the incomplete tail
//! around as the pending prompt text.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::collections::vec_deque::Drain;

const CR: u8 = b'\r';
const LF: u8 = b'\n';

/// Incremental splitter turning a byte stream into complete lines.
///
/// Recognized terminators are `"\r\n"`, `"\n\r"`, `"\n"` and a bare `"\r"`.
/// A two byte pair always counts as a single terminator, even when the two
/// bytes arrive in separate chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    /// Bytes of the current incomplete line
    buffer: Vec<u8>,

    /// Completed lines not yet handed out
    lines: VecDeque<String>,

    /// Second half of a terminator pair to drop if it arrives next
    swallow: Option<u8>,
}

impl LineBuffer {
    /// Create an empty line buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk of received bytes.
    ///
    /// Returns the complete lines formed by the retained tail plus `chunk`, in
    /// arrival order and with terminators stripped. Whatever follows the last
    /// terminator becomes the new pending tail.
    pub fn add(&mut self, chunk: &[u8]) -> Drain<'_, String> {
        for &byte in chunk {
            if let Some(expected) = self.swallow.take() {
                if byte == expected {
                    continue;
                }
            }

            match byte {
                CR | LF => {
                    let line = std::mem::take(&mut self.buffer);
                    self.lines.push_back(String::from_utf8_lossy(&line).into_owned());
                    self.swallow = Some(if byte == CR { LF } else { CR });
                }
                _ => self.buffer.push(byte),
            }
        }

        self.lines.drain(..)
    }

    /// The incomplete tail following the last terminator.
    ///
    /// A multi-byte character cut off at the end of the last chunk is left out
    /// until the rest of it arrives.
    pub fn pending(&self) -> Cow<'_, str> {
        match std::str::from_utf8(&self.buffer) {
            Ok(text) => Cow::Borrowed(text),
            Err(err) if err.error_len().is_none() => {
                String::from_utf8_lossy(&self.buffer[..err.valid_up_to()])
            }
            Err(_) => String::from_utf8_lossy(&self.buffer),
        }
    }

    /// Raw bytes of the incomplete tail
    pub fn pending_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Check whether an incomplete tail is being held
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Discard all buffered state
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.lines.clear();
        self.swallow = None;
    }
}
