// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The three bounded buffers every session owns (§4.2, §3, §8-1): raw
//! terminal bytes, ANSI-stripped text, and parsed messages. Each wraps
//! [`crate::bounded::BoundedBuffer`] with the exact caps from the data
//! model. Also feeds the session's virtual [`Screen`](super::screen::Screen)
//! so §4.3(b)'s "last screen" idleness signal has an actual rendered
//! terminal to check rather than a raw line stream.

use crate::bounded::BoundedBuffer;
use crate::parsers::structured_message::ParsedMessage;

use super::screen::Screen;

const TERMINAL_CAP: usize = 5 * 1024 * 1024;
const TERMINAL_TRIM_TO: usize = 4 * 1024 * 1024;
const TEXT_CAP: usize = 2 * 1024 * 1024;
const TEXT_TRIM_TO: usize = 1536 * 1024;
const MESSAGES_CAP: usize = 1000;
const MESSAGES_TRIM_TO: usize = 800;

pub struct SessionBuffers {
    pub terminal: BoundedBuffer<u8>,
    pub text: BoundedBuffer<u8>,
    pub messages: BoundedBuffer<ParsedMessage>,
    screen: Screen,
}

impl Default for SessionBuffers {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuffers {
    pub fn new() -> Self {
        Self {
            terminal: BoundedBuffer::new(TERMINAL_CAP, TERMINAL_TRIM_TO),
            text: BoundedBuffer::new(TEXT_CAP, TEXT_TRIM_TO),
            messages: BoundedBuffer::new(MESSAGES_CAP, MESSAGES_TRIM_TO),
            screen: Screen::new(),
        }
    }

    /// Feed a raw chunk: append to the terminal buffer verbatim, the
    /// ANSI-stripped form to the text buffer, and the bytes themselves to
    /// the virtual screen.
    pub fn ingest_raw(&mut self, chunk: &[u8]) {
        self.terminal.extend_bytes(chunk);
        let stripped = strip_ansi(chunk);
        self.text.extend_bytes(&stripped);
        self.screen.feed(chunk);
    }

    /// The assistant's terminal as it is actually rendered right now,
    /// cursor movement and overwrites included.
    pub fn screen_lines(&self) -> Vec<String> {
        self.screen.lines()
    }

    pub fn push_message(&mut self, message: ParsedMessage) {
        self.messages.push(message);
    }

    pub fn get_terminal_buffer(&self) -> Vec<u8> {
        self.terminal.snapshot_bytes()
    }

    pub fn get_text_output(&self) -> Vec<u8> {
        self.text.snapshot_bytes()
    }

    pub fn get_messages(&self) -> Vec<ParsedMessage> {
        self.messages.snapshot()
    }
}

/// Strip ANSI/VT100 escape sequences (CSI and OSC forms) from a byte chunk.
fn strip_ansi(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut chars = input.iter().copied().peekable();
    while let Some(byte) = chars.next() {
        if byte != 0x1b {
            out.push(byte);
            continue;
        }
        match chars.peek() {
            Some(b'[') => {
                chars.next();
                for next in chars.by_ref() {
                    if (0x40..=0x7e).contains(&next) {
                        break;
                    }
                }
            }
            Some(b']') => {
                chars.next();
                for next in chars.by_ref() {
                    if next == 0x07 {
                        break;
                    }
                }
            }
            _ => {
                chars.next();
            }
        }
    }
    out
}

#[cfg(test)]
#[path = "buffers_tests.rs"]
mod tests;
