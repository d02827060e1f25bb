// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Four independent, cumulative idleness signals (§4.3). Any one is a
//! candidate; the respawn controller alone decides whether a candidate is
//! confirmed, via its completion-confirm timer (§4.5).

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;

/// One of the four signals that can make a session a candidate for idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleSignal {
    /// (a) A literal prompt glyph at line start, confirmed by later quiet.
    PromptGlyph,
    /// (b) A definitive "ready" marker was present in the last screen.
    ReadyMarker,
    /// (c) The `Worked for ...` completion banner.
    WorkedBanner,
    /// (d) No spinner glyph seen for the configured quiet window.
    SpinnerAbsent,
}

fn prompt_glyph_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(>|❯|\$)\s*$").expect("static regex is valid"))
}

fn ready_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bready\b.*\?\s*$").expect("static regex is valid"))
}

fn worked_banner_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Worked for .*(s|m)").expect("static regex is valid"))
}

fn spinner_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[✻✶✢·⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏]").expect("static regex is valid"))
}

/// Tracks the running state needed to confirm each of the four signals.
pub struct IdleSignalDetector {
    last_output_at: Instant,
    last_prompt_glyph_at: Option<Instant>,
    last_spinner_at: Option<Instant>,
    ready_marker_seen: bool,
    worked_banner_seen: bool,
}

impl IdleSignalDetector {
    pub fn new() -> Self {
        Self {
            last_output_at: Instant::now(),
            last_prompt_glyph_at: None,
            last_spinner_at: None,
            ready_marker_seen: false,
            worked_banner_seen: false,
        }
    }

    /// Record that bytes just arrived, resetting the quiet clock.
    pub fn note_activity(&mut self) {
        self.last_output_at = Instant::now();
    }

    /// Inspect one ANSI-stripped line, updating internal state. Returns
    /// the subset of definitive (non-time-gated) signals this line itself
    /// satisfies: `WorkedBanner` fires immediately; `PromptGlyph` and
    /// `SpinnerAbsent` only become true once the quiet window has since
    /// elapsed (checked via [`candidate`]). `ReadyMarker` is not decided
    /// here — see [`observe_screen`](Self::observe_screen).
    pub fn observe_line(&mut self, line: &str) -> Vec<IdleSignal> {
        let mut fired = Vec::new();
        if worked_banner_re().is_match(line) {
            self.worked_banner_seen = true;
            fired.push(IdleSignal::WorkedBanner);
        }
        if prompt_glyph_re().is_match(line) {
            self.last_prompt_glyph_at = Some(Instant::now());
        }
        if spinner_re().is_match(line) {
            self.last_spinner_at = Some(Instant::now());
        }
        fired
    }

    /// Check the assistant's actual rendered terminal (§4.3(b)) for a
    /// definitive ready marker. Unlike [`observe_line`](Self::observe_line),
    /// this looks at the current screen's lines — cursor movement and
    /// carriage-return overwrites already resolved — rather than the raw
    /// arrival order of bytes, so a spinner or status-line redraw cannot
    /// leave a stale fragment behind for the regex to match.
    pub fn observe_screen(&mut self, screen_lines: &[String]) -> Option<IdleSignal> {
        if screen_lines.iter().any(|line| ready_marker_re().is_match(line)) {
            self.ready_marker_seen = true;
            return Some(IdleSignal::ReadyMarker);
        }
        None
    }

    /// Clear the per-cycle definitive signals at the start of a new
    /// respawn cycle so a stale banner from a prior cycle cannot
    /// immediately re-trigger idleness.
    pub fn reset_cycle(&mut self) {
        self.ready_marker_seen = false;
        self.worked_banner_seen = false;
    }

    fn quiet_elapsed(&self, quiet: Duration) -> bool {
        self.last_output_at.elapsed() >= quiet
    }

    /// First candidate signal currently satisfied, if any, given the
    /// configured quiet window.
    pub fn candidate(&self, quiet: Duration) -> Option<IdleSignal> {
        if !self.quiet_elapsed(quiet) {
            return None;
        }
        if self.worked_banner_seen {
            return Some(IdleSignal::WorkedBanner);
        }
        if self.ready_marker_seen {
            return Some(IdleSignal::ReadyMarker);
        }
        if self
            .last_prompt_glyph_at
            .is_some_and(|t| t.elapsed() >= quiet)
        {
            return Some(IdleSignal::PromptGlyph);
        }
        let spinner_absent = match self.last_spinner_at {
            None => true,
            Some(t) => t.elapsed() >= quiet,
        };
        if spinner_absent {
            return Some(IdleSignal::SpinnerAbsent);
        }
        None
    }
}

impl Default for IdleSignalDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "idle_signals_tests.rs"]
mod tests;
