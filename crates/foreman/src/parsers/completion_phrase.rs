// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Detects `<promise>PHRASE</promise>` occurrences (§4.3, §6). The first
//! occurrence is a stored intent; a second occurrence on a later line is a
//! completion. Matching is case-sensitive on the literal phrase.

pub struct CompletionPhraseDetector {
    needle: String,
    intent_stored: bool,
}

impl CompletionPhraseDetector {
    pub fn new(phrase: impl Into<String>) -> Self {
        Self { needle: format!("<promise>{}</promise>", phrase.into()), intent_stored: false }
    }

    /// Feed one line. Returns `Some(phrase)` only on the second occurrence
    /// (the completion), never on the first (the stored intent).
    pub fn observe_line(&mut self, line: &str) -> Option<String> {
        if !line.contains(self.needle.as_str()) {
            return None;
        }
        if !self.intent_stored {
            self.intent_stored = true;
            return None;
        }
        Some(self.phrase().to_owned())
    }

    /// Whether the first (intent) occurrence has been seen.
    pub fn intent_stored(&self) -> bool {
        self.intent_stored
    }

    fn phrase(&self) -> &str {
        self.needle
            .strip_prefix("<promise>")
            .and_then(|s| s.strip_suffix("</promise>"))
            .unwrap_or(&self.needle)
    }

    /// Re-arm for a new loop iteration (used by `start-loop`/`reset`).
    pub fn reset(&mut self) {
        self.intent_stored = false;
    }
}

#[cfg(test)]
#[path = "completion_phrase_tests.rs"]
mod tests;
