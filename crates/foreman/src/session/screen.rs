// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A real terminal emulator (§4.3(b)) backing the "ready marker present in
//! the last screen" idleness signal. Line-regex matching over an
//! ANSI-stripped byte stream cannot tell a spinner's redraw from new
//! output, and cannot see a carriage-return overwrite for what it is; an
//! actual VT100 screen can, because it interprets cursor movement the way
//! the real terminal the assistant is drawing to would.

const DEFAULT_COLS: u16 = 80;
const DEFAULT_ROWS: u16 = 24;

/// Incrementally-fed virtual terminal over one pane's raw byte stream.
pub struct Screen {
    vt: avt::Vt,
    /// Buffer for incomplete UTF-8 trailing bytes between `feed()` calls,
    /// since raw pty reads can split a multi-byte character across chunks.
    utf8_buf: [u8; 3],
    utf8_buf_len: u8,
}

/// Returns the number of trailing bytes in `data` that form an incomplete
/// UTF-8 sequence (0 if the tail is already complete or pure ASCII).
fn incomplete_utf8_tail_len(data: &[u8]) -> usize {
    let len = data.len();
    for i in 1..=len.min(3) {
        let byte = data[len - i];
        if byte < 0x80 {
            return 0;
        }
        if byte >= 0xC0 {
            let expected = if byte < 0xE0 {
                2
            } else if byte < 0xF0 {
                3
            } else {
                4
            };
            return if i < expected { i } else { 0 };
        }
    }
    0
}

impl Screen {
    pub fn new() -> Self {
        Self::with_size(DEFAULT_COLS, DEFAULT_ROWS)
    }

    pub fn with_size(cols: u16, rows: u16) -> Self {
        Self { vt: avt::Vt::new(cols as usize, rows as usize), utf8_buf: [0; 3], utf8_buf_len: 0 }
    }

    pub fn resize(&mut self, cols: u16, rows: u16) {
        let _ = self.vt.resize(cols as usize, rows as usize);
    }

    /// Feed raw pty bytes into the virtual terminal.
    pub fn feed(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let buf_len = self.utf8_buf_len as usize;
        let owned: Vec<u8>;
        let input = if buf_len == 0 {
            data
        } else {
            owned = [&self.utf8_buf[..buf_len], data].concat();
            self.utf8_buf_len = 0;
            &owned
        };

        let tail = incomplete_utf8_tail_len(input);
        let (to_feed, to_buffer) = input.split_at(input.len() - tail);
        if !to_buffer.is_empty() {
            self.utf8_buf[..to_buffer.len()].copy_from_slice(to_buffer);
            self.utf8_buf_len = to_buffer.len() as u8;
        }

        if !to_feed.is_empty() {
            let s = String::from_utf8_lossy(to_feed);
            let _ = self.vt.feed_str(&s);
        }
    }

    /// The current screen's rendered lines, top to bottom. Unlike the raw
    /// byte stream, this reflects cursor movement and carriage-return
    /// overwrites, so it is what the assistant's terminal would actually
    /// be showing at this instant.
    pub fn lines(&self) -> Vec<String> {
        self.vt.view().map(|line| line.text()).collect()
    }
}

impl Default for Screen {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "screen_tests.rs"]
mod tests;
