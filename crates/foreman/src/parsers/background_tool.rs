// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background-tool tracker (§4.3, §9). A line of the form `● Bash(CMD)`
//! opens a tool; a later line containing `✓ Bash` or `✗ Bash` closes the
//! most recently opened one. Lines that merely describe such a command in
//! prose, or mention a bare log path, get short-lived fallback records
//! instead of a real start/end pair.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Running,
    Completed,
    Expired,
}

/// Which TTL family governs a tool's removal once it has no explicit end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolKind {
    /// Opened by `● Bash(...)`, closed by a matching `✓`/`✗ Bash` line.
    Explicit,
    /// A file-viewing command described in prose, never actually invoked.
    Suggestion,
    /// A bare mention of a log-like path with no command context at all.
    LogPath,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundTool {
    pub id: String,
    pub command: String,
    pub paths: Vec<String>,
    pub status: ToolStatus,
    pub timeout_secs: Option<u64>,
    #[serde(skip)]
    started_at: Option<Instant>,
    #[serde(skip)]
    settled_at: Option<Instant>,
}

#[derive(Debug, Clone)]
pub enum BackgroundToolEvent {
    ToolStart(BackgroundTool),
    ToolEnd { id: String },
    ToolsUpdate(Vec<BackgroundTool>),
}

fn open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"●\s*Bash\(([^)]*)\)(?:\s*\(timeout:\s*(\d+)s?\))?").expect("static regex is valid")
    })
}

fn close_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[✓✗]\s*Bash").expect("static regex is valid"))
}

fn path_viewing_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(tail|cat|head|less|grep|watch|multitail)\b.*\s(-f\b|--follow\b|\S+\.(log|txt|out)\b)")
            .expect("static regex is valid")
    })
}

fn bare_log_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|\s)(\S*\.(?:log|txt|out)|\S*/log/\S*)(?:\s|$|[,.:])").expect("static regex is valid")
    })
}

fn extract_paths(command: &str) -> Vec<String> {
    let mut paths = Vec::new();
    for token in command.split_whitespace().skip(1) {
        if token.starts_with('-') {
            continue;
        }
        paths.push(normalize_path(token));
    }
    paths
}

/// Looser variant for prose lines (text-command fallbacks): only tokens
/// that look like a path (contain a `/` or a dotted extension) qualify.
fn extract_path_like_tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter(|token| token.contains('/') || token.contains('.'))
        .map(|token| token.trim_matches(|c: char| ".,:;".contains(c)))
        .filter(|token| !token.is_empty())
        .map(normalize_path)
        .collect()
}

fn normalize_path(raw: &str) -> String {
    let expanded = if let Some(rest) = raw.strip_prefix('~') {
        let home = std::env::var("HOME").unwrap_or_default();
        format!("{home}{rest}")
    } else {
        raw.to_owned()
    };
    let path = Path::new(&expanded);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join(path)
    };
    collapse_components(&absolute)
}

fn collapse_components(path: &Path) -> String {
    let mut out: Vec<std::path::Component> = Vec::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                if matches!(out.last(), Some(std::path::Component::Normal(_))) {
                    out.pop();
                } else {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out.iter().collect::<PathBuf>().to_string_lossy().into_owned()
}

/// Two paths are treated as the same underlying file when one is a bare
/// filename (or shallow relative path) and the other is an absolute path
/// ending in the same filename — a common typo/shorthand pattern.
fn paths_equivalent(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let a_name = Path::new(a).file_name();
    let b_name = Path::new(b).file_name();
    a_name.is_some() && a_name == b_name
}

pub struct BackgroundToolDetector {
    tools: VecDeque<BackgroundTool>,
    open_stack: Vec<String>,
    next_id: u64,
    cap: usize,
    completed_ttl: Duration,
    suggestion_ttl: Duration,
    log_path_ttl: Duration,
    dirty: bool,
    last_update_emitted: Option<Instant>,
    kinds: std::collections::HashMap<String, ToolKind>,
    tracked_paths: std::collections::HashSet<String>,
}

impl BackgroundToolDetector {
    pub fn new(cap: usize, completed_ttl: Duration, suggestion_ttl: Duration, log_path_ttl: Duration) -> Self {
        Self {
            tools: VecDeque::new(),
            open_stack: Vec::new(),
            next_id: 0,
            cap,
            completed_ttl,
            suggestion_ttl,
            log_path_ttl,
            dirty: false,
            last_update_emitted: None,
            kinds: std::collections::HashMap::new(),
            tracked_paths: std::collections::HashSet::new(),
        }
    }

    pub fn observe_line(&mut self, line: &str) -> Option<BackgroundToolEvent> {
        if close_re().is_match(line) {
            return self.close_most_recent();
        }
        if let Some(caps) = open_re().captures(line) {
            let command = caps.get(1).map(|m| m.as_str().to_owned()).unwrap_or_default();
            let timeout_secs = caps.get(2).and_then(|m| m.as_str().parse().ok());
            return Some(self.start(command, ToolKind::Explicit, timeout_secs));
        }
        if path_viewing_re().is_match(line) {
            return Some(self.start(line.to_owned(), ToolKind::Suggestion, None));
        }
        if let Some(caps) = bare_log_path_re().captures(line) {
            let raw_path = caps.get(1)?.as_str().to_owned();
            return Some(self.start(raw_path, ToolKind::LogPath, None));
        }
        None
    }

    fn start(&mut self, command: String, kind: ToolKind, timeout_secs: Option<u64>) -> BackgroundToolEvent {
        let mut paths: Vec<String> = match kind {
            ToolKind::Explicit => extract_paths(&command),
            ToolKind::LogPath => vec![normalize_path(&command)],
            ToolKind::Suggestion => extract_path_like_tokens(&command),
        };
        for existing_path in &self.tracked_paths {
            if let Some(p) = paths.iter_mut().find(|p| paths_equivalent(p, existing_path)) {
                *p = existing_path.clone();
            }
        }
        // A path already tracked by any parser is never re-added (§4.3 cross-pattern dedup).
        paths.retain(|p| !self.tracked_paths.contains(p) || kind == ToolKind::Explicit);
        for path in &paths {
            self.tracked_paths.insert(path.clone());
        }

        self.next_id += 1;
        let id = format!("tool-{}", self.next_id);
        let tool = BackgroundTool {
            id: id.clone(),
            command,
            paths,
            status: ToolStatus::Running,
            timeout_secs,
            started_at: Some(Instant::now()),
            settled_at: None,
        };
        self.kinds.insert(id.clone(), kind);
        if kind == ToolKind::Explicit {
            self.open_stack.push(id.clone());
        }
        if self.tools.len() >= self.cap {
            if let Some(evicted) = self.tools.pop_front() {
                self.kinds.remove(&evicted.id);
                self.open_stack.retain(|i| i != &evicted.id);
            }
        }
        self.tools.push_back(tool.clone());
        self.dirty = true;
        BackgroundToolEvent::ToolStart(tool)
    }

    /// Closes the most recently opened still-running explicit tool (LIFO).
    fn close_most_recent(&mut self) -> Option<BackgroundToolEvent> {
        let id = self.open_stack.pop()?;
        let tool = self.tools.iter_mut().find(|t| t.id == id)?;
        tool.status = ToolStatus::Completed;
        tool.settled_at = Some(Instant::now());
        self.dirty = true;
        Some(BackgroundToolEvent::ToolEnd { id })
    }

    /// Remove tools whose TTL (by kind) has elapsed, returning `ToolEnd`
    /// for each one removed.
    pub fn expire(&mut self) -> Vec<BackgroundToolEvent> {
        let mut expired = Vec::new();
        let now = Instant::now();
        let completed_ttl = self.completed_ttl;
        let suggestion_ttl = self.suggestion_ttl;
        let log_path_ttl = self.log_path_ttl;
        let kinds = &self.kinds;
        self.tools.retain(|tool| {
            let kind = kinds.get(&tool.id).copied().unwrap_or(ToolKind::Suggestion);
            let keep = match (tool.status, kind) {
                (ToolStatus::Completed, _) => {
                    tool.settled_at.is_none_or(|t| now.duration_since(t) < completed_ttl)
                }
                (ToolStatus::Running, ToolKind::Suggestion) => {
                    tool.started_at.is_none_or(|t| now.duration_since(t) < suggestion_ttl)
                }
                (ToolStatus::Running, ToolKind::LogPath) => {
                    tool.started_at.is_none_or(|t| now.duration_since(t) < log_path_ttl)
                }
                (ToolStatus::Running, ToolKind::Explicit) => true,
                (ToolStatus::Expired, _) => false,
            };
            if !keep {
                expired.push(BackgroundToolEvent::ToolEnd { id: tool.id.clone() });
            }
            keep
        });
        for event in &expired {
            if let BackgroundToolEvent::ToolEnd { id } = event {
                self.kinds.remove(id);
                self.open_stack.retain(|i| i != id);
            }
        }
        if !expired.is_empty() {
            self.dirty = true;
        }
        expired
    }

    /// Emit a debounced `ToolsUpdate` snapshot if the state has changed
    /// since the last emission and the debounce window has elapsed.
    pub fn tools_update_due(&mut self, debounce: Duration) -> Option<BackgroundToolEvent> {
        if !self.dirty {
            return None;
        }
        let now = Instant::now();
        if self.last_update_emitted.is_some_and(|t| now.duration_since(t) < debounce) {
            return None;
        }
        self.dirty = false;
        self.last_update_emitted = Some(now);
        Some(BackgroundToolEvent::ToolsUpdate(self.tools.iter().cloned().collect()))
    }

    pub fn active_count(&self) -> usize {
        self.tools.len()
    }
}

#[cfg(test)]
#[path = "background_tool_tests.rs"]
mod tests;
