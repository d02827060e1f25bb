// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Todo-line detector (§4.3, §4.4). Recognizes five independent line
//! formats a running assistant might emit to report on an item in its own
//! plan, tried in the order below, plus the native tool-call form.
//! Adjacent identical lines are suppressed so a redrawn status line does
//! not produce a flood of duplicate upserts.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Done,
    Skipped,
}

/// A single upsert against the running plan, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoUpsert {
    pub id: String,
    pub text: String,
    pub status: TodoStatus,
    pub priority: Option<String>,
}

fn checkbox_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[-*]\s*\[([ xX~-])\]\s*(.+)$").expect("static regex is valid"))
}

fn parens_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\((pending|in-progress|done|skipped)\)\s*(.+)$")
            .expect("static regex is valid")
    })
}

fn indicator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(TODO|DOING|DONE|SKIPPED):\s*(.+)$").expect("static regex is valid")
    })
}

fn tool_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)"todo"\s*:\s*\{[^}]*"text"\s*:\s*"([^"]+)"[^}]*"status"\s*:\s*"([^"]+)"(?:[^}]*"id"\s*:\s*"([^"]+)")?"#)
            .expect("static regex is valid")
    })
}

fn checkmark_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[✓✔]\s*(.+)$").expect("static regex is valid"))
}

fn stable_id(text: &str) -> String {
    let mut hasher = DefaultHasher::new();
    text.trim().to_ascii_lowercase().hash(&mut hasher);
    format!("todo-{:016x}", hasher.finish())
}

fn status_from_checkbox_marker(marker: &str) -> TodoStatus {
    match marker {
        "x" | "X" => TodoStatus::Done,
        "~" => TodoStatus::InProgress,
        "-" => TodoStatus::Skipped,
        _ => TodoStatus::Pending,
    }
}

fn status_from_word(word: &str) -> TodoStatus {
    match word.to_ascii_lowercase().as_str() {
        "done" => TodoStatus::Done,
        "in-progress" | "doing" => TodoStatus::InProgress,
        "skipped" => TodoStatus::Skipped,
        _ => TodoStatus::Pending,
    }
}

pub struct TodoLineDetector {
    last_line: Option<String>,
}

impl TodoLineDetector {
    pub fn new() -> Self {
        Self { last_line: None }
    }

    pub fn observe_line(&mut self, line: &str) -> Option<TodoUpsert> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        if self.last_line.as_deref() == Some(trimmed) {
            return None;
        }
        self.last_line = Some(trimmed.to_owned());

        let upsert = Self::classify(trimmed)?;
        Some(upsert)
    }

    fn classify(line: &str) -> Option<TodoUpsert> {
        if let Some(caps) = tool_call_re().captures(line) {
            let text = caps.get(1)?.as_str().to_owned();
            let status = status_from_word(caps.get(2)?.as_str());
            let id = caps
                .get(3)
                .map(|m| m.as_str().to_owned())
                .unwrap_or_else(|| stable_id(&text));
            return Some(TodoUpsert { id, text, status, priority: None });
        }
        if let Some(caps) = checkbox_re().captures(line) {
            let text = caps.get(2)?.as_str().trim().to_owned();
            let status = status_from_checkbox_marker(caps.get(1)?.as_str());
            return Some(TodoUpsert { id: stable_id(&text), text, status, priority: None });
        }
        if let Some(caps) = parens_re().captures(line) {
            let status = status_from_word(caps.get(1)?.as_str());
            let text = caps.get(2)?.as_str().trim().to_owned();
            return Some(TodoUpsert { id: stable_id(&text), text, status, priority: None });
        }
        if let Some(caps) = indicator_re().captures(line) {
            let status = status_from_word(caps.get(1)?.as_str());
            let text = caps.get(2)?.as_str().trim().to_owned();
            return Some(TodoUpsert { id: stable_id(&text), text, status, priority: None });
        }
        if let Some(caps) = checkmark_re().captures(line) {
            let text = caps.get(1)?.as_str().trim().to_owned();
            return Some(TodoUpsert { id: stable_id(&text), text, status: TodoStatus::Done, priority: None });
        }
        None
    }
}

impl Default for TodoLineDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "todo_line_tests.rs"]
mod tests;
