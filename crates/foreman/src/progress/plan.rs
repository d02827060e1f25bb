// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Versioned task plan (§4.4). Every mutation that changes todo identity
//! or priority snapshots the plan first, under an incrementing version
//! number; history is bounded so long-running sessions do not grow it
//! without end.

use std::collections::VecDeque;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::parsers::todo_line::TodoStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    P0,
    P1,
    P2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub text: String,
    pub status: TodoStatus,
    pub priority: Priority,
    pub attempt_counter: u32,
    pub verification_criterion: Option<String>,
    pub dependency_ids: Vec<String>,
    pub version: u64,
}

/// A partial update to an existing [`TodoItem`]; `None` fields are left
/// unchanged.
#[derive(Debug, Clone, Default)]
pub struct TodoPatch {
    pub text: Option<String>,
    pub status: Option<TodoStatus>,
    pub priority: Option<Priority>,
    pub verification_criterion: Option<String>,
    pub dependency_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub version: u64,
    pub timestamp_ms: u64,
    pub item_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointReview {
    pub completed_count: usize,
    pub total_count: usize,
    pub failed_tasks: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone)]
struct Snapshot {
    version: u64,
    timestamp_ms: u64,
    items: Vec<TodoItem>,
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn checkbox_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-\s*\[([ xX~-])\]\s*(.+)$").expect("static regex is valid"))
}

pub struct Plan {
    items: Vec<TodoItem>,
    version: u64,
    history: VecDeque<Snapshot>,
    history_cap: usize,
    next_id: u64,
}

impl Plan {
    pub fn new(history_cap: usize) -> Self {
        Self { items: Vec::new(), version: 0, history: VecDeque::new(), history_cap: history_cap.max(1), next_id: 0 }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn items(&self) -> &[TodoItem] {
        &self.items
    }

    fn snapshot(&mut self) {
        self.version += 1;
        let snapshot = Snapshot { version: self.version, timestamp_ms: now_ms(), items: self.items.clone() };
        self.history.push_back(snapshot);
        while self.history.len() > self.history_cap {
            self.history.pop_front();
        }
    }

    fn fresh_id(&mut self) -> String {
        self.next_id += 1;
        format!("todo-{}", self.next_id)
    }

    pub fn add_todo(&mut self, text: impl Into<String>, priority: Priority, insert_after: Option<&str>) -> String {
        self.snapshot();
        let id = self.fresh_id();
        let item = TodoItem {
            id: id.clone(),
            text: text.into(),
            status: TodoStatus::Pending,
            priority,
            attempt_counter: 0,
            verification_criterion: None,
            dependency_ids: Vec::new(),
            version: self.version,
        };
        match insert_after.and_then(|after| self.items.iter().position(|t| t.id == after)) {
            Some(index) => self.items.insert(index + 1, item),
            None => self.items.push(item),
        }
        id
    }

    pub fn update_todo(&mut self, id: &str, patch: TodoPatch) -> Result<(), AppError> {
        if !self.items.iter().any(|t| t.id == id) {
            return Err(AppError::not_found(format!("no todo with id {id}")));
        }
        let identity_changed = patch.text.is_some() || patch.priority.is_some();
        if identity_changed {
            self.snapshot();
        }
        let version = self.version;
        let item = self.items.iter_mut().find(|t| t.id == id).expect("checked above");
        if let Some(text) = patch.text {
            item.text = text;
        }
        if let Some(status) = patch.status {
            if status == TodoStatus::InProgress {
                item.attempt_counter += 1;
            }
            item.status = status;
        }
        if let Some(priority) = patch.priority {
            item.priority = priority;
        }
        if let Some(criterion) = patch.verification_criterion {
            item.verification_criterion = Some(criterion);
        }
        if let Some(deps) = patch.dependency_ids {
            item.dependency_ids = deps;
        }
        if identity_changed {
            item.version = version;
        }
        Ok(())
    }

    pub fn rollback(&mut self, version: u64) -> Result<(), AppError> {
        let snapshot = self
            .history
            .iter()
            .find(|s| s.version == version)
            .ok_or_else(|| AppError::not_found(format!("no plan snapshot at version {version}")))?;
        self.items = snapshot.items.clone();
        self.version = snapshot.version;
        Ok(())
    }

    pub fn get_history(&self) -> Vec<HistoryEntry> {
        self.history
            .iter()
            .map(|s| HistoryEntry { version: s.version, timestamp_ms: s.timestamp_ms, item_count: s.items.len() })
            .collect()
    }

    pub fn generate_checkpoint_review(&self) -> CheckpointReview {
        let completed_count = self.items.iter().filter(|t| t.status == TodoStatus::Done).count();
        let failed_tasks: Vec<String> = self
            .items
            .iter()
            .filter(|t| t.status != TodoStatus::Done && t.attempt_counter >= 3)
            .map(|t| t.text.clone())
            .collect();
        let mut recommendations = Vec::new();
        if !failed_tasks.is_empty() {
            recommendations.push(format!("{} task(s) have been retried 3+ times without completing", failed_tasks.len()));
        }
        if self.items.iter().any(|t| t.status == TodoStatus::Pending && !t.dependency_ids.is_empty()) {
            recommendations.push("some pending tasks still have unresolved dependencies".to_owned());
        }
        CheckpointReview { completed_count, total_count: self.items.len(), failed_tasks, recommendations }
    }

    /// Parse a canonical plan file into a fresh [`Plan`] with no history.
    pub fn import_plan(markdown: &str, history_cap: usize) -> Self {
        let mut plan = Self::new(history_cap);
        let mut current_priority = Priority::P1;
        let mut in_completed = false;
        for raw_line in markdown.lines() {
            let line = raw_line.trim();
            if let Some(section) = line.strip_prefix("## ") {
                in_completed = section.starts_with("Completed");
                if section.contains("(P0)") {
                    current_priority = Priority::P0;
                } else if section.contains("(P1)") {
                    current_priority = Priority::P1;
                } else if section.contains("(P2)") {
                    current_priority = Priority::P2;
                }
                continue;
            }
            let Some(caps) = checkbox_line_re().captures(line) else { continue };
            let marker = caps.get(1).map(|m| m.as_str()).unwrap_or(" ");
            let text = caps.get(2).map(|m| m.as_str().trim().to_owned()).unwrap_or_default();
            let status = if in_completed {
                TodoStatus::Done
            } else {
                match marker {
                    "x" | "X" => TodoStatus::Done,
                    "~" => TodoStatus::InProgress,
                    "-" => TodoStatus::Skipped,
                    _ => TodoStatus::Pending,
                }
            };
            plan.next_id += 1;
            let id = format!("todo-{}", plan.next_id);
            plan.items.push(TodoItem {
                id,
                text,
                status,
                priority: current_priority,
                attempt_counter: 0,
                verification_criterion: None,
                dependency_ids: Vec::new(),
                version: 0,
            });
        }
        plan
    }

    /// Render the plan back to the canonical markdown format.
    pub fn export_plan(&self) -> String {
        let mut out = String::new();
        let sections = [
            (Priority::P0, "## Critical Path (P0)"),
            (Priority::P1, "## Standard (P1)"),
            (Priority::P2, "## Nice-to-Have (P2)"),
        ];
        for (priority, header) in sections {
            out.push_str(header);
            out.push('\n');
            for item in self.items.iter().filter(|t| t.priority == priority && t.status != TodoStatus::Done) {
                out.push_str(&render_line(item));
                out.push('\n');
            }
            out.push('\n');
        }
        out.push_str("## Completed\n");
        for item in self.items.iter().filter(|t| t.status == TodoStatus::Done) {
            out.push_str(&render_line(item));
            out.push('\n');
        }
        out
    }
}

fn render_line(item: &TodoItem) -> String {
    let marker = match item.status {
        TodoStatus::Pending => " ",
        TodoStatus::InProgress => "~",
        TodoStatus::Done => "x",
        TodoStatus::Skipped => "-",
    };
    format!("- [{marker}] {}", item.text)
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
