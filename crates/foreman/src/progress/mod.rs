// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress tracker (§4.4): consumes in-band status blocks and todo
//! lines, drives a versioned [`plan::Plan`] and a [`circuit_breaker::CircuitBreaker`],
//! and decides when the dual-condition exit gate is satisfied. Disabled
//! by default; auto-enables itself once the output looks like it is
//! following the plan/status-block convention, unless that has been
//! explicitly turned off.

pub mod circuit_breaker;
pub mod plan;

use crate::error::AppError;
use crate::parsers::completion_phrase::CompletionPhraseDetector;
use crate::parsers::status_block::{OverallStatus, StatusBlock, StatusBlockParser};
use crate::parsers::todo_line::{TodoLineDetector, TodoUpsert};
use circuit_breaker::{BreakerTransition, CircuitBreaker};
use plan::{CheckpointReview, HistoryEntry, Plan, Priority, TodoItem, TodoPatch};

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Enabled,
    TodoUpsert(TodoUpsert),
    StatusBlock(StatusBlock),
    CircuitBreakerUpdate(BreakerTransition),
    CompletionDetected(String),
}

pub struct ProgressTracker {
    enabled: bool,
    auto_enable_disabled: bool,
    status_block: StatusBlockParser,
    todo: TodoLineDetector,
    completion: Option<CompletionPhraseDetector>,
    plan: Plan,
    breaker: CircuitBreaker,
    cycle_index: u64,
    last_status_block: Option<StatusBlock>,
    last_status_block_cycle: Option<u64>,
    completion_signalled: bool,
    /// The cycle index at which the completion phrase's first (intent)
    /// occurrence was seen, so the exit gate can require the qualifying
    /// status block to have been parsed strictly after it (§8 invariant 6)
    /// rather than accepting a stale block left over from an earlier cycle.
    intent_stored_at_cycle: Option<u64>,
    history_cap: usize,
}

impl ProgressTracker {
    pub fn new(history_cap: usize) -> Self {
        Self {
            enabled: false,
            auto_enable_disabled: false,
            status_block: StatusBlockParser::new(),
            todo: TodoLineDetector::new(),
            completion: None,
            plan: Plan::new(history_cap),
            breaker: CircuitBreaker::new(),
            cycle_index: 0,
            last_status_block: None,
            last_status_block_cycle: None,
            completion_signalled: false,
            intent_stored_at_cycle: None,
            history_cap,
        }
    }

    pub fn disable_auto_enable(&mut self) {
        self.auto_enable_disabled = true;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Arm the tracker for a given completion phrase, starting a new loop.
    pub fn start_loop(&mut self, phrase: impl Into<String>) {
        self.completion = Some(CompletionPhraseDetector::new(phrase));
        self.completion_signalled = false;
        self.enabled = true;
    }

    /// `reset(full)`: partial clears per-cycle counters only, full clears
    /// everything including plan history.
    pub fn reset(&mut self, full: bool) {
        self.cycle_index = 0;
        self.completion_signalled = false;
        self.last_status_block = None;
        self.last_status_block_cycle = None;
        self.intent_stored_at_cycle = None;
        self.breaker.reset();
        if let Some(detector) = self.completion.as_mut() {
            detector.reset();
        }
        if full {
            self.plan = Plan::new(self.history_cap);
            self.completion = None;
            self.enabled = false;
            self.auto_enable_disabled = false;
        }
    }

    pub fn observe_line(&mut self, line: &str) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        if !self.enabled {
            if self.auto_enable_disabled || !looks_like_plan_output(line) {
                return events;
            }
            self.enabled = true;
            events.push(ProgressEvent::Enabled);
        }

        if let Some(upsert) = self.todo.observe_line(line) {
            events.push(ProgressEvent::TodoUpsert(upsert));
        }
        if let Some(block) = self.status_block.observe_line(line) {
            self.cycle_index += 1;
            if let Some(transition) = self.breaker.observe_status_block(&block, self.cycle_index) {
                events.push(ProgressEvent::CircuitBreakerUpdate(transition));
            }
            self.last_status_block = Some(block.clone());
            self.last_status_block_cycle = Some(self.cycle_index);
            events.push(ProgressEvent::StatusBlock(block));
        }
        if let Some(detector) = self.completion.as_mut() {
            let intent_already_stored = detector.intent_stored();
            if let Some(phrase) = detector.observe_line(line) {
                self.completion_signalled = true;
                events.push(ProgressEvent::CompletionDetected(phrase));
            } else if !intent_already_stored && detector.intent_stored() {
                self.intent_stored_at_cycle = Some(self.cycle_index);
            }
        }
        events
    }

    /// Dual-condition exit gate (§4.4): both the completion phrase and a
    /// complete-with-exit-signal status block are required, and the
    /// qualifying status block must have been parsed strictly after the
    /// phrase's first (intent) occurrence (§8 invariant 6) — a block left
    /// over from an earlier cycle cannot satisfy the gate.
    pub fn is_complete(&self) -> bool {
        let status_block_is_fresh = match (self.intent_stored_at_cycle, self.last_status_block_cycle) {
            (Some(intent_cycle), Some(block_cycle)) => block_cycle > intent_cycle,
            _ => false,
        };
        self.completion_signalled
            && status_block_is_fresh
            && self
                .last_status_block
                .as_ref()
                .is_some_and(|block| block.overall_status == OverallStatus::Complete && block.exit_signal)
    }

    pub fn is_circuit_open(&self) -> bool {
        self.breaker.is_open()
    }

    pub fn reset_circuit_breaker(&mut self) {
        self.breaker.reset();
    }

    pub fn update_todo(&mut self, id: &str, patch: TodoPatch) -> Result<(), AppError> {
        self.plan.update_todo(id, patch)
    }

    pub fn add_todo(&mut self, text: impl Into<String>, priority: Priority, insert_after: Option<&str>) -> String {
        self.plan.add_todo(text, priority, insert_after)
    }

    pub fn rollback(&mut self, version: u64) -> Result<(), AppError> {
        self.plan.rollback(version)
    }

    pub fn generate_checkpoint_review(&self) -> CheckpointReview {
        self.plan.generate_checkpoint_review()
    }

    pub fn import_plan(&mut self, markdown: &str) {
        self.plan = Plan::import_plan(markdown, self.history_cap);
    }

    pub fn export_plan(&self) -> String {
        self.plan.export_plan()
    }

    pub fn get_history(&self) -> Vec<HistoryEntry> {
        self.plan.get_history()
    }

    pub fn todos(&self) -> &[TodoItem] {
        self.plan.items()
    }
}

fn looks_like_plan_output(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("- [") && trimmed.contains(']')
        || trimmed == crate::parsers::status_block::START_SENTINEL
        || trimmed.contains("<promise>")
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
