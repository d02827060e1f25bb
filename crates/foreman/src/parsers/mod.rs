// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure, line-oriented transformers over the session's ANSI-stripped
//! terminal stream. Every parser here is a pure function of its own state
//! plus one line of input; none of them can fail the stream — malformed
//! input is always silently skipped (§7 propagation policy).

pub mod background_tool;
pub mod completion_phrase;
pub mod idle_signals;
pub mod status_block;
pub mod structured_message;
pub mod todo_line;

use once_cell_lite::ansi_re;

use background_tool::{BackgroundToolDetector, BackgroundToolEvent};
use completion_phrase::CompletionPhraseDetector;
use idle_signals::{IdleSignal, IdleSignalDetector};
use status_block::{StatusBlock, StatusBlockParser};
use structured_message::{ParsedMessage, StructuredMessageParser};
use todo_line::{TodoLineDetector, TodoUpsert};

/// One event emitted while feeding a line through the pipeline.
#[derive(Debug, Clone)]
pub enum ParserEvent {
    Message(ParsedMessage),
    Idle(IdleSignal),
    CompletionDetected(String),
    StatusBlock(StatusBlock),
    TodoUpsert(TodoUpsert),
    Tool(BackgroundToolEvent),
}

/// Tunables threaded through to the individual parsers.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub completion_phrase: String,
    pub background_tool_cap: usize,
    pub completed_tool_ttl: std::time::Duration,
    pub suggestion_tool_ttl: std::time::Duration,
    pub log_path_tool_ttl: std::time::Duration,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            completion_phrase: "RALPH_DONE".to_owned(),
            background_tool_cap: 20,
            completed_tool_ttl: std::time::Duration::from_secs(2),
            suggestion_tool_ttl: std::time::Duration::from_secs(30),
            log_path_tool_ttl: std::time::Duration::from_secs(60),
        }
    }
}

/// Orchestrates every parser over an append-only byte stream.
///
/// Input arrives in arbitrary chunks; the pipeline only evaluates complete
/// lines so a chunk boundary falling mid-line or mid-status-block never
/// changes the events produced (§8 boundary behaviours).
pub struct ParserPipeline {
    config: ParserConfig,
    carry: Vec<u8>,
    structured: StructuredMessageParser,
    idle: IdleSignalDetector,
    completion: CompletionPhraseDetector,
    status_block: StatusBlockParser,
    todo: TodoLineDetector,
    tool: BackgroundToolDetector,
}

impl ParserPipeline {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            completion: CompletionPhraseDetector::new(config.completion_phrase.clone()),
            tool: BackgroundToolDetector::new(
                config.background_tool_cap,
                config.completed_tool_ttl,
                config.suggestion_tool_ttl,
                config.log_path_tool_ttl,
            ),
            config,
            carry: Vec::new(),
            structured: StructuredMessageParser,
            idle: IdleSignalDetector::new(),
            status_block: StatusBlockParser::new(),
            todo: TodoLineDetector::new(),
        }
    }

    /// Feed a chunk of raw (not yet ANSI-stripped) terminal bytes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ParserEvent> {
        self.carry.extend_from_slice(chunk);
        let mut events = Vec::new();
        self.idle.note_activity();
        while let Some(pos) = self.carry.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.carry.drain(..=pos).collect();
            let raw_line = String::from_utf8_lossy(&line_bytes);
            let trimmed = raw_line.trim_end_matches(['\r', '\n']);
            let stripped = strip_ansi(trimmed);
            self.process_line(&stripped, &mut events);
        }
        events
    }

    /// Process whatever partial line remains without a trailing newline.
    /// Used when the session stops so the last line is not lost.
    pub fn flush(&mut self) -> Vec<ParserEvent> {
        if self.carry.is_empty() {
            return Vec::new();
        }
        let raw_line = String::from_utf8_lossy(&self.carry);
        let stripped = strip_ansi(&raw_line);
        self.carry.clear();
        let mut events = Vec::new();
        self.process_line(&stripped, &mut events);
        events
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<ParserEvent>) {
        if let Some(message) = self.structured.parse_line(line) {
            events.push(ParserEvent::Message(message));
        }
        for signal in self.idle.observe_line(line) {
            events.push(ParserEvent::Idle(signal));
        }
        if let Some(phrase) = self.completion.observe_line(line) {
            events.push(ParserEvent::CompletionDetected(phrase));
        }
        if let Some(block) = self.status_block.observe_line(line) {
            events.push(ParserEvent::StatusBlock(block));
        }
        if let Some(upsert) = self.todo.observe_line(line) {
            events.push(ParserEvent::TodoUpsert(upsert));
        }
        if let Some(tool_event) = self.tool.observe_line(line) {
            events.push(ParserEvent::Tool(tool_event));
        }
        if let Some(tool_event) = self.tool.tools_update_due(std::time::Duration::from_millis(50)) {
            events.push(ParserEvent::Tool(tool_event));
        }
    }

    /// Drop background tools that have aged past their TTL; call on a
    /// timer from the owning session.
    pub fn expire_tools(&mut self) -> Vec<BackgroundToolEvent> {
        self.tool.expire()
    }

    /// Whether the only idleness candidate currently satisfied is the
    /// spinner-absent fallback signal (d), given a quiet window.
    pub fn note_no_spinner_since(&mut self, quiet: std::time::Duration) -> bool {
        matches!(self.idle.candidate(quiet), Some(IdleSignal::SpinnerAbsent))
    }

    /// Feed the session's current rendered screen (§4.3(b)) so the ready-
    /// marker signal is checked against what the terminal actually shows
    /// rather than the raw line stream.
    pub fn observe_screen(&mut self, screen_lines: &[String]) {
        self.idle.observe_screen(screen_lines);
    }

    /// The strongest idleness candidate currently satisfied, if any.
    pub fn idle_candidate(&self, quiet: std::time::Duration) -> Option<IdleSignal> {
        self.idle.candidate(quiet)
    }
}

/// Strip ANSI CSI/OSC escape sequences from a single already-complete line.
pub fn strip_ansi(line: &str) -> String {
    ansi_re().replace_all(line, "").into_owned()
}

mod once_cell_lite {
    use std::sync::OnceLock;

    static ANSI_RE: OnceLock<regex::Regex> = OnceLock::new();

    pub fn ansi_re() -> &'static regex::Regex {
        ANSI_RE.get_or_init(|| {
            regex::Regex::new(r"\x1b(\[[0-9;?]*[a-zA-Z]|\][^\x07]*\x07|[()][0-9A-Za-z])")
                .expect("static ANSI regex is valid")
        })
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
