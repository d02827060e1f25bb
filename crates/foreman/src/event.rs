// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed event bus shared by every session and fanned out by the
//! supervisor. Mirrors the external contract in §6: each event serializes
//! to `{type, session_id?, data}` with a colon-namespaced type string.

use serde::Serialize;

use crate::parsers::background_tool::BackgroundTool;
use crate::parsers::status_block::StatusBlock;
use crate::parsers::structured_message::ParsedMessage;
use crate::progress::circuit_breaker::{BreakerState, BreakerTransition};
use crate::progress::plan::TodoItem;
use crate::respawn::RespawnState;

/// Per-session lifecycle and output events (`session:*`).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SessionEvent {
    Output { offset: u64, len: usize },
    Message { message: ParsedMessage },
    Completion { text: String, cost: f64 },
    Idle,
    Working,
    AutoClear,
    Exit { code: Option<i32>, signal: Option<i32> },
}

impl SessionEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Output { .. } => "session:output",
            Self::Message { .. } => "session:message",
            Self::Completion { .. } => "session:completion",
            Self::Idle => "session:idle",
            Self::Working => "session:working",
            Self::AutoClear => "session:autoClear",
            Self::Exit { .. } => "session:exit",
        }
    }
}

/// Respawn-controller state-machine events (`respawn:*`).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RespawnEvent {
    Transition { from: RespawnState, to: RespawnState, cause: String },
    Blocked { reason: String },
}

impl RespawnEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Transition { .. } => "respawn:transition",
            Self::Blocked { .. } => "respawn:blocked",
        }
    }
}

/// Progress-tracker events (`plan:*`).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PlanEvent {
    Enabled,
    TodoUpsert { item: TodoItem },
    StatusBlock { block: StatusBlock },
    CircuitBreakerUpdate { state: BreakerState, transition: BreakerTransition },
    Rollback { version: u64 },
    CompletionDetected { phrase: String },
}

impl PlanEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Enabled => "plan:enabled",
            Self::TodoUpsert { .. } => "plan:todoUpsert",
            Self::StatusBlock { .. } => "plan:statusBlock",
            Self::CircuitBreakerUpdate { .. } => "plan:circuitBreakerUpdate",
            Self::Rollback { .. } => "plan:rollback",
            Self::CompletionDetected { .. } => "plan:completionDetected",
        }
    }
}

/// Background-tool tracker events (`tool:*`).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ToolEvent {
    Start { tool: BackgroundTool },
    End { id: String },
    ToolsUpdate { tools: Vec<BackgroundTool> },
}

impl ToolEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "tool:start",
            Self::End { .. } => "tool:end",
            Self::ToolsUpdate { .. } => "tool:toolsUpdate",
        }
    }
}

/// Scheduled-run driver events (`scheduled:*`).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ScheduledEvent {
    Started,
    IterationCompleted { cost: f64 },
    Completed,
    Failed { reason: String },
    Stopped,
}

impl ScheduledEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Started => "scheduled:started",
            Self::IterationCompleted { .. } => "scheduled:iterationCompleted",
            Self::Completed => "scheduled:completed",
            Self::Failed { .. } => "scheduled:failed",
            Self::Stopped => "scheduled:stopped",
        }
    }
}

/// The union of every event family the supervisor fans out.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Event {
    Session(SessionEvent),
    Respawn(RespawnEvent),
    Plan(PlanEvent),
    Tool(ToolEvent),
    Scheduled(ScheduledEvent),
}

impl Event {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Session(e) => e.type_name(),
            Self::Respawn(e) => e.type_name(),
            Self::Plan(e) => e.type_name(),
            Self::Tool(e) => e.type_name(),
            Self::Scheduled(e) => e.type_name(),
        }
    }

    /// Whether this event is safe to drop under backpressure (§5). Only
    /// terminal-batch output and the routine `working` heartbeat qualify;
    /// completion, exit, and state-machine transitions are never dropped.
    pub fn is_low_value(&self) -> bool {
        matches!(self, Self::Session(SessionEvent::Output { .. } | SessionEvent::Working))
    }

    pub fn to_envelope(&self, session_id: Option<String>) -> EventEnvelope {
        EventEnvelope {
            event_type: self.type_name().to_owned(),
            session_id,
            data: serde_json::to_value(self).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Wire shape delivered to external collaborators: `{type, session_id?, data}`.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub data: serde_json::Value,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
