// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-band status-block parser (§4.3, §6). Delimited by
//! `---RALPH_STATUS---` / `---END_RALPH_STATUS---`, `KEY: VALUE` lines in
//! between. Partial blocks are tolerated: missing optional fields take
//! their default, missing required fields discard the whole block.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const START_SENTINEL: &str = "---RALPH_STATUS---";
pub const END_SENTINEL: &str = "---END_RALPH_STATUS---";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverallStatus {
    InProgress,
    Complete,
    Blocked,
}

impl OverallStatus {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "IN_PROGRESS" | "IN-PROGRESS" => Some(Self::InProgress),
            "COMPLETE" => Some(Self::Complete),
            "BLOCKED" => Some(Self::Blocked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestsStatus {
    Passing,
    Failing,
    NotRun,
}

impl TestsStatus {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PASSING" => Some(Self::Passing),
            "FAILING" => Some(Self::Failing),
            "NOT_RUN" | "NOT-RUN" => Some(Self::NotRun),
            _ => None,
        }
    }
}

/// One parsed in-band status frame. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusBlock {
    pub overall_status: OverallStatus,
    pub tasks_completed_this_cycle: u32,
    pub files_modified_this_cycle: u32,
    pub tests_status: TestsStatus,
    pub work_type: String,
    pub exit_signal: bool,
    pub recommendation: Option<String>,
}

impl StatusBlock {
    /// Whether this cycle counts as "progress" for the circuit breaker.
    pub fn made_progress(&self) -> bool {
        self.files_modified_this_cycle > 0 || self.tasks_completed_this_cycle > 0
    }
}

/// Accumulates `KEY: VALUE` lines between the sentinel pair.
pub struct StatusBlockParser {
    fields: Option<HashMap<String, String>>,
}

impl StatusBlockParser {
    pub fn new() -> Self {
        Self { fields: None }
    }

    pub fn observe_line(&mut self, line: &str) -> Option<StatusBlock> {
        let trimmed = line.trim();
        if trimmed == START_SENTINEL {
            self.fields = Some(HashMap::new());
            return None;
        }
        if trimmed == END_SENTINEL {
            let fields = self.fields.take()?;
            return Self::build(&fields);
        }
        if let Some(ref mut fields) = self.fields {
            if let Some((key, value)) = trimmed.split_once(':') {
                fields.insert(key.trim().to_ascii_uppercase(), value.trim().to_owned());
            }
        }
        None
    }

    fn build(fields: &HashMap<String, String>) -> Option<StatusBlock> {
        let overall_status = fields.get("STATUS").and_then(|s| OverallStatus::parse(s))?;
        let tasks_completed_this_cycle =
            fields.get("TASKS_COMPLETED_THIS_LOOP").and_then(|s| s.trim().parse().ok())?;
        let files_modified_this_cycle =
            fields.get("FILES_MODIFIED").and_then(|s| s.trim().parse().ok())?;
        let tests_status = fields
            .get("TESTS_STATUS")
            .and_then(|s| TestsStatus::parse(s))
            .unwrap_or(TestsStatus::NotRun);
        let work_type = fields.get("WORK_TYPE").cloned().unwrap_or_default();
        let exit_signal = fields
            .get("EXIT_SIGNAL")
            .map(|s| s.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let recommendation = fields.get("RECOMMENDATION").cloned();
        Some(StatusBlock {
            overall_status,
            tasks_completed_this_cycle,
            files_modified_this_cycle,
            tests_status,
            work_type,
            exit_signal,
            recommendation,
        })
    }
}

impl Default for StatusBlockParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "status_block_tests.rs"]
mod tests;
